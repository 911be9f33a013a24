//! Upload ingestion.
//!
//! Turns raw CSV bytes into a summarized dataset and stores it in the
//! retention store. Multiple files are ingested concurrently on the blocking
//! thread pool; each file succeeds or fails on its own.

pub mod parser;
pub mod stats;

pub use parser::{parse, RawTable};
pub use stats::summarize;

use crate::error::{IngestError, PipelineError};
use crate::models::{Dataset, NewDataset, OwnerScope};
use crate::store::RetentionStore;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Parse and summarize raw CSV bytes into a dataset ready to be stored.
pub fn build_dataset(source_name: &str, bytes: &[u8]) -> Result<NewDataset, IngestError> {
    let table = RawTable::from_csv_reader(bytes)?;
    debug!(
        "{}: {} rows, columns [{}]",
        source_name,
        table.row_count(),
        table.headers().join(", ")
    );

    let records = parse(&table)?;
    let summary = summarize(&records)?;

    Ok(NewDataset {
        source_name: source_name.to_string(),
        created_at: None,
        summary,
        records,
        raw_file: None,
    })
}

/// Result of ingesting one file.
#[derive(Debug)]
pub struct IngestOutcome {
    pub path: PathBuf,
    pub result: Result<Dataset, PipelineError>,
}

impl IngestOutcome {
    /// Failed outcome for a file rejected before ingestion.
    pub fn rejected(path: PathBuf, error: IngestError) -> Self {
        Self {
            path,
            result: Err(error.into()),
        }
    }
}

/// Ingests uploads into a retention store.
pub struct Ingestor {
    store: Arc<RetentionStore>,
    keep_raw_files: bool,
}

impl Ingestor {
    pub fn new(store: Arc<RetentionStore>, keep_raw_files: bool) -> Self {
        Self {
            store,
            keep_raw_files,
        }
    }

    /// Ingest an upload already held in memory.
    ///
    /// The raw bytes are kept in blob storage when enabled. If the dataset
    /// cannot be stored, the kept copy is released again.
    pub fn ingest_bytes(
        &self,
        scope: &OwnerScope,
        source_name: &str,
        bytes: &[u8],
    ) -> Result<Dataset, PipelineError> {
        let mut draft = build_dataset(source_name, bytes)?;

        let blobs = self.store.blobs();
        if self.keep_raw_files {
            draft.raw_file = Some(blobs.store(source_name, bytes)?);
        }
        let raw_file = draft.raw_file.clone();

        match self.store.insert(scope, draft) {
            Ok(dataset) => Ok(dataset),
            Err(e) => {
                if let Some(path) = raw_file {
                    blobs.release(&path);
                }
                Err(e.into())
            }
        }
    }

    /// Read and ingest a single file.
    pub fn ingest_file(&self, scope: &OwnerScope, path: &Path) -> Result<Dataset, PipelineError> {
        let bytes = std::fs::read(path).map_err(|source| IngestError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let source_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        self.ingest_bytes(scope, &source_name, &bytes)
    }

    /// Ingest several files with at most `concurrency` in flight.
    ///
    /// Outcomes are returned in input order.
    pub async fn ingest_files(
        self: &Arc<Self>,
        scope: &OwnerScope,
        files: Vec<PathBuf>,
        concurrency: usize,
        progress: Option<ProgressBar>,
    ) -> Vec<IngestOutcome> {
        let total = files.len();
        info!(
            "Ingesting {} files for '{}' ({} at a time)",
            total, scope, concurrency
        );

        let mut outcomes: Vec<(usize, IngestOutcome)> = stream::iter(files.into_iter().enumerate())
            .map(|(index, path)| {
                let ingestor = Arc::clone(self);
                let scope = scope.clone();
                async move {
                    let worker_path = path.clone();
                    let result = tokio::task::spawn_blocking(move || {
                        ingestor.ingest_file(&scope, &worker_path)
                    })
                    .await
                    .unwrap_or_else(|e| {
                        Err(PipelineError::Worker {
                            message: e.to_string(),
                        })
                    });

                    if let Err(ref e) = result {
                        warn!("Failed to ingest {}: {}", path.display(), e);
                    }
                    (index, IngestOutcome { path, result })
                }
            })
            .buffer_unordered(concurrency.max(1))
            .inspect(|_| {
                if let Some(ref pb) = progress {
                    pb.inc(1);
                }
            })
            .collect()
            .await;

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        outcomes.sort_by_key(|(index, _)| *index);
        outcomes.into_iter().map(|(_, outcome)| outcome).collect()
    }
}

/// Progress bar for a batch of `len` files.
pub fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb
}
