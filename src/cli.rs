//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::OwnerScope;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ChemFlow - equipment data analytics from the command line
///
/// Upload CSV files of chemical equipment readings, keep a bounded history
/// of summarized datasets per owner, and render reports for any of them.
///
/// Examples:
///   chemflow upload plant_a.csv
///   chemflow upload ./exports --owner alice
///   chemflow history --owner alice
///   chemflow report 12 --format json --output report.json
///   chemflow init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    ///
    /// If not specified, looks for .chemflow.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding dataset history and raw files
    #[arg(long, value_name = "DIR", env = "CHEMFLOW_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Datasets kept per owner before the oldest is evicted
    #[arg(long, value_name = "COUNT", global = true)]
    pub max_history: Option<usize>,

    /// Number of files ingested concurrently
    #[arg(long, value_name = "NUM", global = true)]
    pub concurrency: Option<usize>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Ingest CSV files or directories of CSV files
    Upload {
        /// CSV files or directories to ingest
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,

        /// Owner whose history receives the datasets
        #[arg(long, value_name = "NAME")]
        owner: Option<String>,

        /// Also write the ingest results as JSON to this file
        #[arg(long, value_name = "FILE")]
        json: Option<PathBuf>,
    },

    /// List stored datasets, newest first
    History {
        /// Owner whose history is listed
        #[arg(long, value_name = "NAME")]
        owner: Option<String>,
    },

    /// Render the report of a stored dataset
    Report {
        /// Dataset id, as shown by `history`
        id: u64,

        /// Owner the dataset belongs to
        #[arg(long, value_name = "NAME")]
        owner: Option<String>,

        /// Output format (markdown, json)
        #[arg(long, default_value = "markdown", value_name = "FORMAT")]
        format: OutputFormat,

        /// Write the report to this file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Number of equipment records included in the report
        #[arg(long, value_name = "COUNT")]
        sample_size: Option<usize>,
    },

    /// Generate a default .chemflow.toml configuration file
    InitConfig,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.max_history == Some(0) {
            return Err("Max history must be at least 1".to_string());
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if let Command::Upload { ref owner, .. }
        | Command::History { ref owner }
        | Command::Report { ref owner, .. } = self.command
        {
            if let Some(name) = owner {
                if name.trim().is_empty() {
                    return Err("Owner name must not be empty".to_string());
                }
                if name.trim().len() > OwnerScope::MAX_LEN {
                    return Err(format!(
                        "Owner name must be at most {} bytes",
                        OwnerScope::MAX_LEN
                    ));
                }
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_parse_upload() {
        let args = parse(&["chemflow", "upload", "a.csv", "dir", "--owner", "alice"]);
        match args.command {
            Command::Upload { paths, owner, json } => {
                assert_eq!(paths, vec![PathBuf::from("a.csv"), PathBuf::from("dir")]);
                assert_eq!(owner.as_deref(), Some("alice"));
                assert!(json.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_upload_requires_a_path() {
        assert!(Args::try_parse_from(["chemflow", "upload"]).is_err());
    }

    #[test]
    fn test_parse_report_with_global_flags() {
        let args = parse(&[
            "chemflow", "report", "12", "--format", "json", "--max-history", "3", "-v",
        ]);
        assert_eq!(args.max_history, Some(3));
        assert!(args.verbose);
        match args.command {
            Command::Report { id, format, .. } => {
                assert_eq!(id, 12);
                assert_eq!(format, OutputFormat::Json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_validation_conflicting_options() {
        let args = parse(&["chemflow", "history", "-v", "-q"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        assert!(parse(&["chemflow", "--max-history", "0", "history"])
            .validate()
            .is_err());
        assert!(parse(&["chemflow", "--concurrency", "0", "upload", "a.csv"])
            .validate()
            .is_err());
        assert!(parse(&["chemflow", "history", "--owner", " "])
            .validate()
            .is_err());
        assert!(parse(&["chemflow", "init-config"]).validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_long_owner() {
        let long = "o".repeat(OwnerScope::MAX_LEN + 1);
        assert!(parse(&["chemflow", "upload", "a.csv", "--owner", &long])
            .validate()
            .is_err());

        let fits = "o".repeat(OwnerScope::MAX_LEN);
        assert!(parse(&["chemflow", "history", "--owner", &fits])
            .validate()
            .is_ok());
    }

    #[test]
    fn test_log_level() {
        let mut args = parse(&["chemflow", "history"]);
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
