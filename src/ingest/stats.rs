//! Summary statistics over cleaned equipment records.

use crate::error::IngestError;
use crate::models::{EquipmentRecord, FieldStats, Parameter, Summary, TypeDistribution};

/// Compute the summary of a non-empty record set.
pub fn summarize(records: &[EquipmentRecord]) -> Result<Summary, IngestError> {
    if records.is_empty() {
        return Err(IngestError::EmptyResult { rows_seen: 0 });
    }

    Ok(Summary {
        count: records.len(),
        flowrate: field_stats(records, Parameter::Flowrate),
        pressure: field_stats(records, Parameter::Pressure),
        temperature: field_stats(records, Parameter::Temperature),
        type_distribution: type_distribution(records),
    })
}

/// Min, mean and max of one parameter. `records` must be non-empty.
fn field_stats(records: &[EquipmentRecord], parameter: Parameter) -> FieldStats {
    let first = records[0].value(parameter);
    let mut min = first;
    let mut max = first;
    let mut sum = 0.0;

    for record in records {
        let value = record.value(parameter);
        sum += value;
        if value < min {
            min = value;
        }
        if value > max {
            max = value;
        }
    }

    // Rounding in the mean can land a hair outside the observed range.
    let avg = (sum / records.len() as f64).clamp(min, max);

    FieldStats { min, avg, max }
}

/// Count records per equipment type, in first-seen order.
pub fn type_distribution(records: &[EquipmentRecord]) -> TypeDistribution {
    let mut distribution = TypeDistribution::new();
    for record in records {
        distribution.record(&record.equipment_type);
    }
    distribution
}
