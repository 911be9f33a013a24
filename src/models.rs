//! Data models for equipment datasets.
//!
//! This module contains the core data structures shared by the ingestion
//! pipeline, the retention store and the report assembler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Identifier assigned to a dataset by the retention store.
pub type DatasetId = u64;

/// Identity that a history and its datasets belong to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerScope(String);

impl OwnerScope {
    /// Name used for datasets uploaded without an owner.
    pub const ANONYMOUS: &'static str = "anonymous";

    /// Longest owner name kept, in bytes. Longer names are cut at a
    /// character boundary.
    pub const MAX_LEN: usize = 100;

    /// Creates a scope for the given owner name. Blank names map to the anonymous scope.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let mut trimmed = name.trim();
        if trimmed.len() > Self::MAX_LEN {
            let mut end = Self::MAX_LEN;
            while !trimmed.is_char_boundary(end) {
                end -= 1;
            }
            trimmed = trimmed[..end].trim_end();
        }

        if trimmed.is_empty() {
            Self::anonymous()
        } else {
            Self(trimmed.to_string())
        }
    }

    /// The shared scope for uploads without an owner.
    pub fn anonymous() -> Self {
        Self(Self::ANONYMOUS.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_anonymous(&self) -> bool {
        self.0 == Self::ANONYMOUS
    }
}

impl Default for OwnerScope {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl fmt::Display for OwnerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The three numeric measurement columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parameter {
    Flowrate,
    Pressure,
    Temperature,
}

impl Parameter {
    /// All parameters in report order.
    pub const ALL: [Parameter; 3] = [
        Parameter::Flowrate,
        Parameter::Pressure,
        Parameter::Temperature,
    ];

    /// Human-readable label, identical to the CSV column name.
    pub fn label(&self) -> &'static str {
        match self {
            Parameter::Flowrate => "Flowrate",
            Parameter::Pressure => "Pressure",
            Parameter::Temperature => "Temperature",
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One measurement row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentRecord {
    /// Equipment name (non-empty).
    pub name: String,
    /// Equipment type, used as the categorical label.
    #[serde(rename = "type")]
    pub equipment_type: String,
    pub flowrate: f64,
    pub pressure: f64,
    pub temperature: f64,
}

impl EquipmentRecord {
    /// Returns the value of the given numeric parameter.
    pub fn value(&self, parameter: Parameter) -> f64 {
        match parameter {
            Parameter::Flowrate => self.flowrate,
            Parameter::Pressure => self.pressure,
            Parameter::Temperature => self.temperature,
        }
    }
}

/// Minimum, mean and maximum of one numeric parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
}

/// Occurrence count of a single equipment type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCount {
    pub label: String,
    pub count: usize,
}

/// Count of records per equipment type, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeDistribution(Vec<TypeCount>);

impl TypeDistribution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one more occurrence of `label`. Labels compare by exact string equality.
    pub fn record(&mut self, label: &str) {
        match self.0.iter_mut().find(|entry| entry.label == label) {
            Some(entry) => entry.count += 1,
            None => self.0.push(TypeCount {
                label: label.to_string(),
                count: 1,
            }),
        }
    }

    /// Returns the count for `label`, if it was seen.
    #[cfg(test)]
    pub fn get(&self, label: &str) -> Option<usize> {
        self.0
            .iter()
            .find(|entry| entry.label == label)
            .map(|entry| entry.count)
    }

    /// Sum of all counts.
    pub fn total(&self) -> usize {
        self.0.iter().map(|entry| entry.count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeCount> {
        self.0.iter()
    }
}

impl FromIterator<(String, usize)> for TypeDistribution {
    fn from_iter<I: IntoIterator<Item = (String, usize)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(label, count)| TypeCount { label, count })
                .collect(),
        )
    }
}

/// Aggregate statistics of a cleaned record set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Number of records summarized.
    pub count: usize,
    pub flowrate: FieldStats,
    pub pressure: FieldStats,
    pub temperature: FieldStats,
    /// Records per equipment type.
    pub type_distribution: TypeDistribution,
}

impl Summary {
    /// Returns the statistics of the given parameter.
    pub fn stats(&self, parameter: Parameter) -> FieldStats {
        match parameter {
            Parameter::Flowrate => self.flowrate,
            Parameter::Pressure => self.pressure,
            Parameter::Temperature => self.temperature,
        }
    }
}

/// A dataset produced by the ingestion pipeline that has not been stored yet.
#[derive(Debug, Clone)]
pub struct NewDataset {
    pub source_name: String,
    /// Creation time; the store fills in the current time when absent.
    pub created_at: Option<DateTime<Utc>>,
    pub summary: Summary,
    pub records: Vec<EquipmentRecord>,
    /// Stored copy of the raw input, released when the dataset is evicted.
    pub raw_file: Option<PathBuf>,
}

/// One stored ingestion result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: DatasetId,
    pub owner: OwnerScope,
    /// Original filename, for display only.
    pub source_name: String,
    pub created_at: DateTime<Utc>,
    pub record_count: usize,
    pub summary: Summary,
    /// Cleaned records in input order.
    pub records: Vec<EquipmentRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_file: Option<PathBuf>,
}

impl Dataset {
    /// Builds a stored dataset from a draft.
    pub fn from_new(
        id: DatasetId,
        created_at: DateTime<Utc>,
        owner: OwnerScope,
        new: NewDataset,
    ) -> Self {
        Self {
            id,
            owner,
            source_name: new.source_name,
            created_at,
            record_count: new.records.len(),
            summary: new.summary,
            records: new.records,
            raw_file: new.raw_file,
        }
    }

    /// Key that orders datasets by recency. The id breaks timestamp ties.
    pub fn recency_key(&self) -> (DateTime<Utc>, DatasetId) {
        (self.created_at, self.id)
    }
}
