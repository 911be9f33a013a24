//! Tabular input parsing and row cleaning.
//!
//! Raw input is first tokenized into a [`RawTable`] of named columns, then
//! the required-column contract is checked and every row that is missing a
//! field or carries an unparseable number is dropped.

use crate::error::IngestError;
use crate::models::EquipmentRecord;
use std::io::Read;
use tracing::debug;

/// Column holding the equipment name.
pub const NAME_COLUMN: &str = "Equipment Name";
/// Column holding the equipment type.
pub const TYPE_COLUMN: &str = "Type";
pub const FLOWRATE_COLUMN: &str = "Flowrate";
pub const PRESSURE_COLUMN: &str = "Pressure";
pub const TEMPERATURE_COLUMN: &str = "Temperature";

/// Required columns, exact names, in the order they are reported when missing.
pub const REQUIRED_COLUMNS: [&str; 5] = [
    NAME_COLUMN,
    TYPE_COLUMN,
    FLOWRATE_COLUMN,
    PRESSURE_COLUMN,
    TEMPERATURE_COLUMN,
];

/// Cell contents treated as missing values.
const NULL_TOKENS: &[&str] = &["NA", "N/A", "NaN", "nan", "null", "NULL", "None"];

/// A table with named columns and rows of optional cells.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    /// Creates a table from already tokenized headers and rows.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { headers, rows }
    }

    /// Tokenizes comma-separated input with a header row.
    ///
    /// Rows shorter than the header are padded with missing cells; rows
    /// longer than the header make the whole input malformed.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, IngestError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader.headers()?.iter().map(String::from).collect();
        if headers.is_empty() {
            return Err(IngestError::MalformedInput {
                message: "No columns to parse from file".to_string(),
            });
        }

        let mut rows = Vec::new();
        for (index, record) in csv_reader.records().enumerate() {
            let record = record?;
            if record.len() > headers.len() {
                let line = record
                    .position()
                    .map(|p| p.line())
                    .unwrap_or(index as u64 + 2);
                return Err(IngestError::MalformedInput {
                    message: format!(
                        "Expected {} fields in line {}, saw {}",
                        headers.len(),
                        line,
                        record.len()
                    ),
                });
            }

            let mut row: Vec<Option<String>> = record.iter().map(|f| Some(f.to_string())).collect();
            row.resize(headers.len(), None);
            rows.push(row);
        }

        Ok(Self::new(headers, rows))
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Position of the first column named `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

/// Positions of the required columns in a particular table.
struct ColumnIndices {
    name: usize,
    equipment_type: usize,
    flowrate: usize,
    pressure: usize,
    temperature: usize,
}

impl ColumnIndices {
    fn resolve(table: &RawTable) -> Result<Self, IngestError> {
        let missing_columns: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|column| table.column_index(column).is_none())
            .map(|column| column.to_string())
            .collect();

        if !missing_columns.is_empty() {
            return Err(IngestError::Schema { missing_columns });
        }

        let index = |column: &str| table.column_index(column).unwrap_or_default();
        Ok(Self {
            name: index(NAME_COLUMN),
            equipment_type: index(TYPE_COLUMN),
            flowrate: index(FLOWRATE_COLUMN),
            pressure: index(PRESSURE_COLUMN),
            temperature: index(TEMPERATURE_COLUMN),
        })
    }
}

/// Parse a raw table into cleaned equipment records, preserving row order.
pub fn parse(table: &RawTable) -> Result<Vec<EquipmentRecord>, IngestError> {
    let columns = ColumnIndices::resolve(table)?;

    let records: Vec<EquipmentRecord> = table
        .rows
        .iter()
        .filter_map(|row| clean_row(row, &columns))
        .collect();

    let dropped = table.row_count() - records.len();
    if dropped > 0 {
        debug!("Dropped {} of {} rows during cleaning", dropped, table.row_count());
    }

    if records.is_empty() {
        return Err(IngestError::EmptyResult {
            rows_seen: table.row_count(),
        });
    }

    Ok(records)
}

/// Build a record from a row, or `None` if any required field is unusable.
fn clean_row(row: &[Option<String>], columns: &ColumnIndices) -> Option<EquipmentRecord> {
    Some(EquipmentRecord {
        name: text_cell(row, columns.name)?.to_string(),
        equipment_type: text_cell(row, columns.equipment_type)?.to_string(),
        flowrate: numeric_cell(row, columns.flowrate)?,
        pressure: numeric_cell(row, columns.pressure)?,
        temperature: numeric_cell(row, columns.temperature)?,
    })
}

/// Trimmed cell contents, `None` for absent, blank or null cells.
fn text_cell(row: &[Option<String>], index: usize) -> Option<&str> {
    let value = row.get(index)?.as_deref()?.trim();
    if value.is_empty() || NULL_TOKENS.contains(&value) {
        None
    } else {
        Some(value)
    }
}

fn numeric_cell(row: &[Option<String>], index: usize) -> Option<f64> {
    text_cell(row, index)?
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Equipment Name,Type,Flowrate,Pressure,Temperature\n";

    fn parse_str(input: &str) -> Result<Vec<EquipmentRecord>, IngestError> {
        parse(&RawTable::from_csv_reader(input.as_bytes())?)
    }

    #[test]
    fn test_parse_valid_rows() {
        let input = format!("{}Pump1,Pump,10.0,5.0,300.0\nValve1,Valve,20,7,310\n", HEADER);
        let records = parse_str(&input).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "Pump1");
        assert_eq!(records[0].equipment_type, "Pump");
        assert_eq!(records[1].flowrate, 20.0);
        assert_eq!(records[1].temperature, 310.0);
    }

    #[test]
    fn test_column_order_and_extra_columns_are_free() {
        let input = "Temperature,Notes,Type,Pressure,Equipment Name,Flowrate\n\
                     300,fine,Pump,5,Pump1,10\n";
        let records = parse_str(input).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Pump1");
        assert_eq!(records[0].flowrate, 10.0);
        assert_eq!(records[0].pressure, 5.0);
        assert_eq!(records[0].temperature, 300.0);
    }

    #[test]
    fn test_schema_error_lists_every_missing_column() {
        let subsets: [&[&str]; 4] = [
            &["Type"],
            &["Flowrate", "Temperature"],
            &["Equipment Name", "Type", "Pressure"],
            &REQUIRED_COLUMNS,
        ];

        for missing in subsets {
            let headers: Vec<String> = REQUIRED_COLUMNS
                .iter()
                .filter(|c| !missing.contains(*c))
                .map(|c| c.to_string())
                .chain(std::iter::once("Other".to_string()))
                .collect();
            let table = RawTable::new(headers, vec![]);

            match parse(&table) {
                Err(IngestError::Schema { missing_columns }) => {
                    assert_eq!(missing_columns, missing.to_vec());
                }
                other => panic!("expected schema error, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_header_names_are_exact() {
        let input = "equipment name,Type,Flowrate,Pressure,Temperature\nP,Pump,1,2,3\n";
        match parse_str(input) {
            Err(IngestError::Schema { missing_columns }) => {
                assert_eq!(missing_columns, vec!["Equipment Name".to_string()]);
            }
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_rows_are_dropped() {
        let input = format!(
            "{}Pump1,Pump,10,5,300\n\
             ,Pump,10,5,300\n\
             Pump2,,10,5,300\n\
             Pump3,Pump,abc,5,300\n\
             Pump4,Pump,10,NaN,300\n\
             Pump5,Pump,10,5,inf\n\
             Pump6,Pump,10,5\n\
             Pump7,Pump,N/A,5,300\n\
             null,Pump,10,5,300\n\
             Pump8,NULL,10,5,300\n\
             Pump9,Pump,None,5,300\n\
             Pump10,Pump,10,5,nan\n\
             None,Valve,1,2,3\n\
             Valve1,Valve,-4.5,-1,0\n",
            HEADER
        );
        let records = parse_str(&input).unwrap();

        let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Pump1", "Valve1"]);
        assert_eq!(records[1].pressure, -1.0);
    }

    #[test]
    fn test_duplicate_header_first_wins() {
        let input = "Equipment Name,Type,Flowrate,Flowrate,Pressure,Temperature\n\
                     P1,Pump,10,99,5,300\n\
                     P2,Pump,abc,20,5,300\n\
                     P3,Valve,30,,6,310\n";
        let records = parse_str(input).unwrap();

        let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["P1", "P3"]);
        assert_eq!(records[0].flowrate, 10.0);
        assert_eq!(records[0].pressure, 5.0);
        assert_eq!(records[1].flowrate, 30.0);
    }

    #[test]
    fn test_cells_are_trimmed() {
        let input = format!("{}  Pump1 , Pump , 10 ,5, 300\n", HEADER);
        let records = parse_str(&input).unwrap();
        assert_eq!(records[0].name, "Pump1");
        assert_eq!(records[0].equipment_type, "Pump");
        assert_eq!(records[0].flowrate, 10.0);
    }

    #[test]
    fn test_all_rows_invalid_is_empty_result() {
        let input = format!("{}Pump1,Pump,x,5,300\n,Valve,1,2,3\n", HEADER);
        match parse_str(&input) {
            Err(IngestError::EmptyResult { rows_seen }) => assert_eq!(rows_seen, 2),
            other => panic!("expected empty result, got {:?}", other),
        }
    }

    #[test]
    fn test_header_only_is_empty_result() {
        assert!(matches!(
            parse_str(HEADER),
            Err(IngestError::EmptyResult { rows_seen: 0 })
        ));
    }

    #[test]
    fn test_empty_input_is_malformed() {
        assert!(matches!(
            parse_str(""),
            Err(IngestError::MalformedInput { .. })
        ));
    }

    #[test]
    fn test_overlong_row_is_malformed() {
        let input = format!("{}Pump1,Pump,10,5,300,extra\n", HEADER);
        match parse_str(&input) {
            Err(IngestError::MalformedInput { message }) => {
                assert!(message.contains("Expected 5 fields"));
            }
            other => panic!("expected malformed input, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        let mut bytes = HEADER.as_bytes().to_vec();
        bytes.extend_from_slice(b"Pump\xff,Pump,1,2,3\n");
        assert!(matches!(
            RawTable::from_csv_reader(bytes.as_slice()),
            Err(IngestError::MalformedInput { .. })
        ));
    }
}
