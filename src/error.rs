//! Error types for ingestion, the retention store and report assembly.
//!
//! Every variant carries structured fields so callers can build a precise
//! message without parsing strings.

use crate::models::{DatasetId, OwnerScope};
use std::path::PathBuf;
use thiserror::Error;

/// Failures while turning raw input into a summarized dataset.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Malformed input: {message}")]
    MalformedInput { message: String },

    #[error("Missing required columns: {}", missing_columns.join(", "))]
    Schema { missing_columns: Vec<String> },

    #[error("No valid data found ({rows_seen} rows read, none usable)")]
    EmptyResult { rows_seen: usize },

    #[error("File must be CSV format: {}", path.display())]
    UnsupportedFile { path: PathBuf },

    #[error("File too large: {} is {size} bytes, limit is {limit}", path.display())]
    FileTooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<csv::Error> for IngestError {
    fn from(err: csv::Error) -> Self {
        IngestError::MalformedInput {
            message: err.to_string(),
        }
    }
}

/// Failures of the retention store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Dataset {id} not found for owner '{scope}'")]
    NotFound { scope: OwnerScope, id: DatasetId },

    #[error("History store unavailable: {message}")]
    Unavailable { message: String },
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Unavailable {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Unavailable {
            message: format!("Corrupt history document: {}", err),
        }
    }
}

/// Failures while assembling a report from a stored dataset.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Inconsistent summary: {reason}")]
    InconsistentSummary { reason: String },
}

/// Failures of a single upload, from reading the file to storing the dataset.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Ingestion worker failed: {message}")]
    Worker { message: String },
}
