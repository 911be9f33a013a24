//! Markdown and JSON rendering of report models.
//!
//! Rendering is presentation only: numbers are formatted to a fixed number
//! of decimals here, never recomputed.

use crate::models::{Dataset, TypeCount};
use crate::report::assembler::{
    ComparisonGroup, RecordSample, ReportInfo, ReportModel, StatsRow, COMPARISON_LEGEND,
};
use anyhow::Result;
use chrono::Utc;

/// Longest equipment name shown in the records table.
const MAX_NAME_CHARS: usize = 25;

/// Formatting options for rendered reports.
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    /// Decimal places for measurement values.
    pub decimals: usize,
    /// Include the equipment records table.
    pub include_sample: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            decimals: 2,
            include_sample: true,
        }
    }
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(model: &ReportModel, options: &RenderOptions) -> String {
    let mut output = String::new();

    output.push_str("# ChemFlow Analytics Report\n\n");
    output.push_str(&generate_info_section(&model.info));
    output.push_str(&generate_stats_section(&model.stats_table, options.decimals));
    output.push_str(&generate_type_section(&model.type_series));
    output.push_str(&generate_comparison_section(
        &model.comparison_series,
        options.decimals,
    ));

    if options.include_sample {
        output.push_str(&generate_records_section(&model.record_sample, options.decimals));
    }

    output.push_str(&generate_footer());

    output
}

/// Generate the dataset information section.
fn generate_info_section(info: &ReportInfo) -> String {
    let mut section = String::new();

    section.push_str("## Dataset Information\n\n");
    section.push_str("| | |\n");
    section.push_str("|:---|:---|\n");
    section.push_str(&format!("| **Dataset ID** | {} |\n", info.dataset_id));
    section.push_str(&format!("| **Filename** | {} |\n", info.source_name));
    section.push_str(&format!(
        "| **Upload Date** | {} |\n",
        info.created_at.format("%B %d, %Y at %H:%M:%S UTC")
    ));
    section.push_str(&format!("| **Total Records** | {} |\n", info.record_count));
    section.push('\n');

    section
}

/// Generate the summary statistics table.
fn generate_stats_section(rows: &[StatsRow], decimals: usize) -> String {
    let mut section = String::new();

    section.push_str("## Summary Statistics\n\n");
    section.push_str("| Parameter | Minimum | Average | Maximum |\n");
    section.push_str("|:---|---:|---:|---:|\n");

    for row in rows {
        section.push_str(&format!(
            "| {} | {:.*} | {:.*} | {:.*} |\n",
            row.parameter, decimals, row.min, decimals, row.avg, decimals, row.max
        ));
    }
    section.push('\n');

    section
}

/// Generate the equipment type distribution table.
fn generate_type_section(series: &[TypeCount]) -> String {
    let mut section = String::new();

    section.push_str("## Equipment Type Distribution\n\n");

    let total: usize = series.iter().map(|t| t.count).sum();
    if total == 0 {
        section.push_str("No equipment types recorded.\n\n");
        return section;
    }

    section.push_str("| Type | Count | Share |\n");
    section.push_str("|:---|:---:|---:|\n");
    for entry in series {
        let share = entry.count as f64 / total as f64 * 100.0;
        section.push_str(&format!(
            "| {} | {} | {:.1}% |\n",
            entry.label, entry.count, share
        ));
    }
    section.push('\n');

    section
}

/// Generate the grouped min/avg/max comparison table.
fn generate_comparison_section(groups: &[ComparisonGroup], decimals: usize) -> String {
    let mut section = String::new();

    section.push_str("## Parameter Comparison\n\n");
    section.push_str("| Series |");
    for group in groups {
        section.push_str(&format!(" {} |", group.parameter));
    }
    section.push('\n');
    section.push_str("|:---|");
    for _ in groups {
        section.push_str("---:|");
    }
    section.push('\n');

    for (index, name) in COMPARISON_LEGEND.iter().enumerate() {
        section.push_str(&format!("| {} |", name));
        for group in groups {
            section.push_str(&format!(" {:.*} |", decimals, group.values[index]));
        }
        section.push('\n');
    }
    section.push('\n');

    section
}

/// Generate the equipment records table.
fn generate_records_section(sample: &RecordSample, decimals: usize) -> String {
    let mut section = String::new();

    section.push_str("## Equipment Records\n\n");
    if sample.is_truncated() {
        section.push_str(&format!(
            "*Showing the first {} of {} records.*\n\n",
            sample.records.len(),
            sample.total_records
        ));
    }

    section.push_str("| Name | Type | Flowrate | Pressure | Temperature |\n");
    section.push_str("|:---|:---|---:|---:|---:|\n");
    for record in &sample.records {
        section.push_str(&format!(
            "| {} | {} | {:.*} | {:.*} | {:.*} |\n",
            truncate_chars(&record.name, MAX_NAME_CHARS),
            record.equipment_type,
            decimals,
            record.flowrate,
            decimals,
            record.pressure,
            decimals,
            record.temperature
        ));
    }
    section.push('\n');

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Generated by ChemFlow Analytics | {}*\n",
        Utc::now().format("%B %d, %Y")
    ));

    footer
}

/// Generate a JSON report.
pub fn generate_json_report(model: &ReportModel) -> Result<String> {
    serde_json::to_string_pretty(model).map_err(Into::into)
}

/// Generate a plain-text history table, newest first.
pub fn generate_history_table(datasets: &[Dataset], decimals: usize) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "{:>6}  {:<28}  {:<16}  {:>7}  {:>10}  {:>10}\n",
        "ID", "Filename", "Date", "Count", "Avg Flow", "Avg Press"
    ));

    for dataset in datasets {
        output.push_str(&format!(
            "{:>6}  {:<28}  {:<16}  {:>7}  {:>10.*}  {:>10.*}\n",
            dataset.id,
            truncate_chars(&dataset.source_name, 28),
            dataset.created_at.format("%Y-%m-%d %H:%M").to_string(),
            dataset.record_count,
            decimals,
            dataset.summary.flowrate.avg,
            decimals,
            dataset.summary.pressure.avg
        ));
    }

    output
}

/// First `max` characters of `text`.
fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
