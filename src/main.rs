//! ChemFlow - equipment data analytics
//!
//! A CLI tool that ingests CSV files of chemical equipment readings,
//! keeps a bounded history of summarized datasets per owner and renders
//! reports for stored datasets.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (bad config, unreadable history, unknown dataset,
//!       or any file of an upload failed)

mod cli;
mod config;
mod error;
mod ingest;
mod models;
mod report;
mod scanner;
mod store;

use anyhow::{Context, Result};
use cli::{Args, Command, OutputFormat};
use config::{Config, DEFAULT_CONFIG_FILE};
use ingest::{IngestOutcome, Ingestor};
use models::{Dataset, DatasetId, OwnerScope};
use report::{ReportAssembler, RenderOptions};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use store::{FsBlobStore, JsonDirBackend, RetentionStore};
use tracing::{debug, error, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle init-config early (no logging needed)
    if matches!(args.command, Command::InitConfig) {
        return handle_init_config();
    }

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&args, &config);

    info!("ChemFlow v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    debug!("Configuration: {:?}", config);

    match run(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle init-config: generate a default .chemflow.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to customize the data directory, history size, and more.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args, config: &Config) {
    let level = if config.general.verbose && !args.quiet {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Load configuration from file or use defaults, then apply CLI overrides.
fn load_config(args: &Args) -> Result<Config> {
    let mut config = match args.config {
        // Try explicit config path
        Some(ref config_path) => Config::load(config_path)?,
        // Try default location
        None => Config::load_default()?.unwrap_or_default(),
    };

    config.merge_with_args(args);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Open the persistent retention store under the configured data directory.
fn open_store(config: &Config) -> Result<Arc<RetentionStore>> {
    let backend = JsonDirBackend::new(config.history_dir());
    let blobs = FsBlobStore::new(config.blob_dir());

    let store = RetentionStore::open(
        Box::new(backend),
        Arc::new(blobs),
        config.retention.max_history,
    )
    .with_context(|| {
        format!(
            "Failed to open dataset history in {}",
            config.general.data_dir.display()
        )
    })?;

    Ok(Arc::new(store))
}

/// Owner scope named on the command line, or the configured default.
fn owner_scope(owner: Option<&str>, config: &Config) -> OwnerScope {
    OwnerScope::new(owner.unwrap_or(&config.general.default_owner))
}

/// Dispatch the parsed subcommand. Returns the exit code.
async fn run(args: Args, config: Config) -> Result<i32> {
    match args.command {
        Command::Upload {
            ref paths,
            ref owner,
            ref json,
        } => {
            let scope = owner_scope(owner.as_deref(), &config);
            handle_upload(&config, &scope, paths, json.as_deref(), args.quiet).await
        }
        Command::History { ref owner } => {
            let scope = owner_scope(owner.as_deref(), &config);
            handle_history(&config, &scope)
        }
        Command::Report {
            id,
            ref owner,
            format,
            ref output,
            ..
        } => {
            let scope = owner_scope(owner.as_deref(), &config);
            handle_report(&config, &scope, id, format, output.as_deref())
        }
        Command::InitConfig => handle_init_config().map(|_| 0),
    }
}

/// Per-file entry of the JSON upload result.
#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum UploadResult<'a> {
    Stored { file: PathBuf, dataset: &'a Dataset },
    Failed { file: PathBuf, error: String },
}

impl<'a> From<&'a IngestOutcome> for UploadResult<'a> {
    fn from(outcome: &'a IngestOutcome) -> Self {
        match outcome.result {
            Ok(ref dataset) => UploadResult::Stored {
                file: outcome.path.clone(),
                dataset,
            },
            Err(ref e) => UploadResult::Failed {
                file: outcome.path.clone(),
                error: e.to_string(),
            },
        }
    }
}

/// Ingest the given files and directories.
async fn handle_upload(
    config: &Config,
    scope: &OwnerScope,
    paths: &[PathBuf],
    json_output: Option<&Path>,
    quiet: bool,
) -> Result<i32> {
    let start_time = Instant::now();

    let scan_config = scanner::ScanConfig::from(&config.scanner);
    let scan = scanner::CsvScanner::new(scan_config).resolve(paths);

    if scan.is_empty() {
        println!("   No CSV files found.");
        return Ok(1);
    }
    for file in &scan.files {
        debug!("Selected {} ({} bytes)", file.path.display(), file.size);
    }

    let mut outcomes: Vec<IngestOutcome> = scan
        .rejected
        .into_iter()
        .map(|rejected| IngestOutcome::rejected(rejected.path, rejected.error))
        .collect();

    let store = open_store(config)?;

    if !scan.files.is_empty() {
        println!(
            "📥 Uploading {} file(s) to the history of '{}'...",
            scan.files.len(),
            scope
        );

        let ingestor = Arc::new(Ingestor::new(
            Arc::clone(&store),
            config.retention.keep_raw_files,
        ));

        let progress = (!quiet).then(|| ingest::progress_bar(scan.files.len() as u64));
        let ingested = ingestor
            .ingest_files(
                scope,
                scan.files.into_iter().map(|f| f.path).collect(),
                config.general.concurrency,
                progress,
            )
            .await;
        outcomes.extend(ingested);
    }

    let mut failed = 0;
    for outcome in &outcomes {
        match outcome.result {
            Ok(ref dataset) => {
                println!(
                    "   ✅ {} → dataset {} ({} records)",
                    outcome.path.display(),
                    dataset.id,
                    dataset.record_count
                );
                println!(
                    "      avg flowrate {:.*} | avg pressure {:.*} | avg temperature {:.*}",
                    config.report.decimals,
                    dataset.summary.flowrate.avg,
                    config.report.decimals,
                    dataset.summary.pressure.avg,
                    config.report.decimals,
                    dataset.summary.temperature.avg
                );
            }
            Err(ref e) => {
                failed += 1;
                println!("   ❌ {}: {}", outcome.path.display(), e);
            }
        }
    }

    if let Some(path) = json_output {
        let results: Vec<UploadResult<'_>> = outcomes.iter().map(UploadResult::from).collect();
        let content = serde_json::to_string_pretty(&results)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write upload results to {}", path.display()))?;
        println!("   Results saved to: {}", path.display());
    }

    let stored = outcomes.len() - failed;
    println!("\n📊 Upload Summary:");
    println!("   Stored: {} | Failed: {}", stored, failed);
    println!(
        "   History keeps the {} most recent datasets",
        store.max_history()
    );
    println!(
        "   Duration: {:.1}s",
        start_time.elapsed().as_secs_f64()
    );

    if failed > 0 {
        eprintln!("\n⛔ {} file(s) could not be ingested.", failed);
        return Ok(1);
    }

    println!("\n✅ Upload complete!");
    Ok(0)
}

/// List the stored datasets of `scope`, newest first.
fn handle_history(config: &Config, scope: &OwnerScope) -> Result<i32> {
    let store = open_store(config)?;
    let datasets = store.list(scope)?;

    let label = if scope.is_anonymous() {
        "shared history".to_string()
    } else {
        format!("history of '{}'", scope)
    };

    if datasets.is_empty() {
        println!("📭 No datasets in the {}.", label);
        return Ok(0);
    }

    println!(
        "📚 {} of {} datasets in the {}:\n",
        datasets.len(),
        store.max_history(),
        label
    );
    print!(
        "{}",
        report::generate_history_table(&datasets, config.report.decimals)
    );
    Ok(0)
}

/// Render the report of one stored dataset.
fn handle_report(
    config: &Config,
    scope: &OwnerScope,
    id: DatasetId,
    format: OutputFormat,
    output: Option<&Path>,
) -> Result<i32> {
    let store = open_store(config)?;
    let dataset = store.get(scope, id)?;

    let model = ReportAssembler::new(config.report.sample_size).assemble(&dataset)?;
    let options = RenderOptions {
        decimals: config.report.decimals,
        include_sample: config.report.include_sample,
    };

    let rendered = match format {
        OutputFormat::Json => report::generate_json_report(&model)?,
        OutputFormat::Markdown => report::generate_markdown_report(&model, &options),
    };

    match output {
        Some(path) => {
            std::fs::write(path, &rendered)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            println!("✅ Report saved to: {}", path.display());
        }
        None => print!("{}", rendered),
    }

    Ok(0)
}
