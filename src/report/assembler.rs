//! Presentation-neutral report model.
//!
//! The assembler turns a stored dataset into tables and chart series. It
//! never recomputes statistics: every number comes verbatim from the stored
//! summary or records, and renderers only format them.

use crate::error::ReportError;
use crate::models::{Dataset, DatasetId, EquipmentRecord, Parameter, TypeCount};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Records shown in the report's record table by default.
pub const DEFAULT_SAMPLE_SIZE: usize = 20;

/// Series names of the grouped min/avg/max comparison, in value order.
pub const COMPARISON_LEGEND: [&str; 3] = ["Minimum", "Average", "Maximum"];

/// Dataset information block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportInfo {
    pub dataset_id: DatasetId,
    pub source_name: String,
    pub created_at: DateTime<Utc>,
    pub record_count: usize,
}

/// One row of the statistics table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsRow {
    pub parameter: Parameter,
    pub min: f64,
    pub avg: f64,
    pub max: f64,
}

/// One parameter group of the min/avg/max comparison chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonGroup {
    pub parameter: Parameter,
    /// Values in [`COMPARISON_LEGEND`] order.
    pub values: [f64; 3],
}

/// Leading records of a dataset, for display only.
///
/// This is the first rows in stored order, not a statistical sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordSample {
    pub records: Vec<EquipmentRecord>,
    /// Number of records in the whole dataset.
    pub total_records: usize,
}

impl RecordSample {
    /// Whether the dataset holds more records than the sample shows.
    pub fn is_truncated(&self) -> bool {
        self.records.len() < self.total_records
    }
}

/// Everything a renderer needs to draw a dataset report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportModel {
    pub info: ReportInfo,
    pub stats_table: Vec<StatsRow>,
    pub type_series: Vec<TypeCount>,
    pub comparison_series: Vec<ComparisonGroup>,
    pub record_sample: RecordSample,
}

/// Builds report models from stored datasets.
#[derive(Debug, Clone, Copy)]
pub struct ReportAssembler {
    sample_size: usize,
}

impl Default for ReportAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_SIZE)
    }
}

impl ReportAssembler {
    pub fn new(sample_size: usize) -> Self {
        Self { sample_size }
    }

    /// Assemble the report model of `dataset`.
    pub fn assemble(&self, dataset: &Dataset) -> Result<ReportModel, ReportError> {
        check_consistency(dataset)?;
        let summary = &dataset.summary;

        let stats_table = Parameter::ALL
            .iter()
            .map(|&parameter| {
                let stats = summary.stats(parameter);
                StatsRow {
                    parameter,
                    min: stats.min,
                    avg: stats.avg,
                    max: stats.max,
                }
            })
            .collect();

        let comparison_series = Parameter::ALL
            .iter()
            .map(|&parameter| {
                let stats = summary.stats(parameter);
                ComparisonGroup {
                    parameter,
                    values: [stats.min, stats.avg, stats.max],
                }
            })
            .collect();

        let sample_len = self.sample_size.min(dataset.records.len());

        Ok(ReportModel {
            info: ReportInfo {
                dataset_id: dataset.id,
                source_name: dataset.source_name.clone(),
                created_at: dataset.created_at,
                record_count: dataset.record_count,
            },
            stats_table,
            type_series: summary.type_distribution.iter().cloned().collect(),
            comparison_series,
            record_sample: RecordSample {
                records: dataset.records[..sample_len].to_vec(),
                total_records: dataset.record_count,
            },
        })
    }
}

/// Reject summaries that valid pipeline output can never produce.
fn check_consistency(dataset: &Dataset) -> Result<(), ReportError> {
    let summary = &dataset.summary;
    let inconsistent = |reason: String| Err(ReportError::InconsistentSummary { reason });

    if summary.count > 0 && summary.type_distribution.is_empty() {
        return inconsistent(format!(
            "type distribution is empty but count is {}",
            summary.count
        ));
    }

    let total = summary.type_distribution.total();
    if total != summary.count {
        return inconsistent(format!(
            "type distribution totals {} but count is {}",
            total, summary.count
        ));
    }

    if dataset.record_count != summary.count {
        return inconsistent(format!(
            "dataset holds {} records but summary counts {}",
            dataset.record_count, summary.count
        ));
    }

    Ok(())
}
