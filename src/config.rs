//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.chemflow.toml` files.

use crate::cli::{Args, Command};
use crate::models::OwnerScope;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".chemflow.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// History retention settings.
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Input scanner settings.
    #[serde(default)]
    pub scanner: ScannerConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory holding the dataset history and raw files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Number of files ingested concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Owner used when a command does not name one.
    #[serde(default = "default_owner")]
    pub default_owner: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            verbose: false,
            concurrency: default_concurrency(),
            default_owner: default_owner(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".chemflow")
}

fn default_concurrency() -> usize {
    4
}

fn default_owner() -> String {
    "anonymous".to_string()
}

/// History retention settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Datasets kept per owner before the oldest is evicted.
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// Keep a copy of every uploaded file next to its dataset.
    #[serde(default = "default_true")]
    pub keep_raw_files: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            keep_raw_files: true,
        }
    }
}

fn default_max_history() -> usize {
    crate::store::DEFAULT_MAX_HISTORY
}

/// Input scanner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Maximum files ingested per upload.
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Maximum file size in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Directory names skipped while scanning.
    #[serde(default = "default_excludes")]
    pub excludes: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            max_file_size: default_max_file_size(),
            excludes: default_excludes(),
        }
    }
}

fn default_max_files() -> usize {
    100
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024 // 10MB
}

fn default_excludes() -> Vec<String> {
    vec!["target", "node_modules", "__pycache__", "venv"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Number of equipment records shown in a report.
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,

    /// Decimal places for measurement values.
    #[serde(default = "default_decimals")]
    pub decimals: usize,

    /// Include the equipment records table.
    #[serde(default = "default_true")]
    pub include_sample: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            sample_size: default_sample_size(),
            decimals: default_decimals(),
            include_sample: true,
        }
    }
}

fn default_sample_size() -> usize {
    crate::report::DEFAULT_SAMPLE_SIZE
}

fn default_decimals() -> usize {
    2
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// Only values given on the command line override the file.
    pub fn merge_with_args(&mut self, args: &Args) {
        if let Some(ref data_dir) = args.data_dir {
            self.general.data_dir = data_dir.clone();
        }
        if let Some(max_history) = args.max_history {
            self.retention.max_history = max_history;
        }
        if let Some(concurrency) = args.concurrency {
            self.general.concurrency = concurrency;
        }

        if let Command::Report {
            sample_size: Some(sample_size),
            ..
        } = args.command
        {
            self.report.sample_size = sample_size;
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Reject settings the application cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.retention.max_history == 0 {
            bail!("retention.max_history must be at least 1");
        }
        if self.general.concurrency == 0 {
            bail!("general.concurrency must be at least 1");
        }
        if self.report.decimals > 10 {
            bail!("report.decimals must be at most 10");
        }
        if self.general.default_owner.trim().len() > OwnerScope::MAX_LEN {
            bail!(
                "general.default_owner must be at most {} bytes",
                OwnerScope::MAX_LEN
            );
        }
        Ok(())
    }

    /// Directory holding the persisted history documents.
    pub fn history_dir(&self) -> PathBuf {
        self.general.data_dir.join("history")
    }

    /// Directory holding kept raw upload files.
    pub fn blob_dir(&self) -> PathBuf {
        self.general.data_dir.join("blobs")
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.data_dir, PathBuf::from(".chemflow"));
        assert_eq!(config.general.default_owner, "anonymous");
        assert_eq!(config.retention.max_history, 5);
        assert!(config.retention.keep_raw_files);
        assert_eq!(config.scanner.max_files, 100);
        assert_eq!(config.report.sample_size, 20);
        assert_eq!(config.report.decimals, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
data_dir = "/var/lib/chemflow"
verbose = true

[retention]
max_history = 10
keep_raw_files = false

[report]
decimals = 3
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.data_dir, PathBuf::from("/var/lib/chemflow"));
        assert!(config.general.verbose);
        assert_eq!(config.general.concurrency, 4);
        assert_eq!(config.retention.max_history, 10);
        assert!(!config.retention.keep_raw_files);
        assert_eq!(config.report.decimals, 3);
        assert_eq!(config.report.sample_size, 20);
        assert_eq!(config.history_dir(), PathBuf::from("/var/lib/chemflow/history"));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.retention.max_history = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.general.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.report.decimals = 11;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.general.default_owner = "o".repeat(OwnerScope::MAX_LEN + 1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_merge_with_args() {
        let args = Args::parse_from([
            "chemflow",
            "--max-history",
            "3",
            "--data-dir",
            "/tmp/flow",
            "report",
            "7",
            "--sample-size",
            "5",
        ]);

        let mut config = Config::default();
        config.merge_with_args(&args);

        assert_eq!(config.retention.max_history, 3);
        assert_eq!(config.general.data_dir, PathBuf::from("/tmp/flow"));
        assert_eq!(config.general.concurrency, 4);
        assert_eq!(config.report.sample_size, 5);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "[retention]\nmax_history = 2\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.retention.max_history, 2);

        std::fs::write(&path, "[retention\n").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[retention]"));
        assert!(toml_str.contains("[scanner]"));
        assert!(toml_str.contains("[report]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.retention.max_history, 5);
    }
}
