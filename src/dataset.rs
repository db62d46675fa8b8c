//! Fully materialized data table with per-column inferred types.
//!
//! Rows are kept as decoded text; typed JSON values are produced on demand so
//! the key column can always be compared through its raw string form.

use std::{collections::HashMap, io::Read, path::Path};

use anyhow::{Context, Result, anyhow};
use encoding_rs::Encoding;
use log::debug;
use serde_json::Value;

use crate::io_utils;

/// Cell texts treated as missing values.
const NA_VALUES: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "NULL", "null", "None", "<NA>", "#N/A",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    String,
}

#[derive(Debug, Clone)]
struct TypeCandidate {
    possible_integer: bool,
    possible_float: bool,
    possible_boolean: bool,
}

impl TypeCandidate {
    fn new() -> Self {
        Self {
            possible_integer: true,
            possible_float: true,
            possible_boolean: true,
        }
    }

    fn observe(&mut self, value: &str) {
        if self.possible_boolean && parse_boolean(value).is_none() {
            self.possible_boolean = false;
        }
        if self.possible_integer && value.parse::<i64>().is_err() {
            self.possible_integer = false;
        }
        if self.possible_float && !value.parse::<f64>().is_ok_and(f64::is_finite) {
            self.possible_float = false;
        }
    }

    fn decide(&self, observed: bool) -> ColumnType {
        if !observed {
            ColumnType::String
        } else if self.possible_boolean {
            ColumnType::Boolean
        } else if self.possible_integer {
            ColumnType::Integer
        } else if self.possible_float {
            ColumnType::Float
        } else {
            ColumnType::String
        }
    }
}

fn parse_boolean(value: &str) -> Option<bool> {
    match value {
        "True" | "true" | "TRUE" => Some(true),
        "False" | "false" | "FALSE" => Some(false),
        _ => None,
    }
}

pub fn is_na(value: &str) -> bool {
    NA_VALUES.contains(&value)
}

#[derive(Debug, Clone)]
pub struct DataTable {
    headers: Vec<String>,
    types: Vec<ColumnType>,
    rows: Vec<Vec<String>>,
}

impl DataTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        for (idx, row) in rows.iter().enumerate() {
            if row.len() != headers.len() {
                return Err(anyhow!(
                    "Row {} has {} field(s) but the header declares {}",
                    idx + 2,
                    row.len(),
                    headers.len()
                ));
            }
        }
        let mut candidates = vec![TypeCandidate::new(); headers.len()];
        let mut observed = vec![false; headers.len()];
        for row in &rows {
            for (idx, cell) in row.iter().enumerate() {
                if is_na(cell) {
                    continue;
                }
                observed[idx] = true;
                candidates[idx].observe(cell);
            }
        }
        let types = candidates
            .iter()
            .zip(observed)
            .map(|(candidate, seen)| candidate.decide(seen))
            .collect::<Vec<_>>();
        debug!("Inferred column types: {:?}", headers.iter().zip(&types).collect::<Vec<_>>());
        Ok(Self {
            headers,
            types,
            rows,
        })
    }

    pub fn load(path: &Path, delimiter: u8, encoding: &'static Encoding) -> Result<Self> {
        let reader = io_utils::open_csv_reader_from_path(path, delimiter, true)?;
        Self::from_csv_reader(reader, encoding).with_context(|| format!("Reading data table {path:?}"))
    }

    pub fn from_reader<R: Read>(
        reader: R,
        delimiter: u8,
        encoding: &'static Encoding,
    ) -> Result<Self> {
        Self::from_csv_reader(io_utils::open_csv_reader(reader, delimiter, true), encoding)
    }

    fn from_csv_reader<R: Read>(
        mut reader: csv::Reader<R>,
        encoding: &'static Encoding,
    ) -> Result<Self> {
        let headers = io_utils::reader_headers(&mut reader, encoding)?;
        let mut rows = Vec::new();
        for (row_idx, record) in reader.byte_records().enumerate() {
            let record = record.with_context(|| format!("Reading row {}", row_idx + 2))?;
            rows.push(io_utils::decode_record(&record, encoding)?);
        }
        Self::new(headers, rows)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| anyhow!("Column '{name}' not found in data table"))
    }

    pub fn column_type(&self, column: usize) -> ColumnType {
        self.types[column]
    }

    pub fn raw(&self, row: usize, column: usize) -> &str {
        self.rows[row][column].as_str()
    }

    /// Typed JSON value of a cell; missing markers become null.
    pub fn value(&self, row: usize, column: usize) -> Value {
        let raw = self.raw(row, column);
        if is_na(raw) {
            return Value::Null;
        }
        match self.types[column] {
            ColumnType::Integer => raw.parse::<i64>().map(Value::from).unwrap_or(Value::Null),
            ColumnType::Float => raw.parse::<f64>().map(Value::from).unwrap_or(Value::Null),
            ColumnType::Boolean => parse_boolean(raw).map(Value::Bool).unwrap_or(Value::Null),
            ColumnType::String => Value::String(raw.to_string()),
        }
    }

    /// Maps each key text in `column` to the first row carrying it.
    pub fn key_index(&self, column: usize) -> HashMap<&str, usize> {
        let mut index = HashMap::new();
        for (row_idx, row) in self.rows.iter().enumerate() {
            let key = row[column].as_str();
            if key.is_empty() {
                continue;
            }
            index.entry(key).or_insert(row_idx);
        }
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::UTF_8;
    use serde_json::json;

    fn sample() -> DataTable {
        let tsv = "group_value\tgroup_size\tmatched_size\tratio\tflag\tlabel\n\
                   42\t10\t2\t0.2\tTrue\tfirst\n\
                   43\t\t3\tNaN\tfalse\tsecond\n\
                   42\t99\t99\t1.5\tTRUE\tthird\n";
        DataTable::from_reader(tsv.as_bytes(), b'\t', UTF_8).expect("table")
    }

    #[test]
    fn infers_column_types_across_all_rows() {
        let table = sample();
        assert_eq!(table.column_type(0), ColumnType::Integer);
        assert_eq!(table.column_type(1), ColumnType::Integer);
        assert_eq!(table.column_type(3), ColumnType::Float);
        assert_eq!(table.column_type(4), ColumnType::Boolean);
        assert_eq!(table.column_type(5), ColumnType::String);
    }

    #[test]
    fn missing_cells_become_null() {
        let table = sample();
        assert_eq!(table.value(1, 1), Value::Null);
        assert_eq!(table.value(1, 3), Value::Null);
        assert_eq!(table.value(0, 3), json!(0.2));
        assert_eq!(table.value(0, 4), json!(true));
    }

    #[test]
    fn key_index_keeps_first_row_per_key() {
        let table = sample();
        let index = table.key_index(0);
        assert_eq!(index.get("42"), Some(&0));
        assert_eq!(index.get("43"), Some(&1));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn require_column_reports_absent_names() {
        let table = sample();
        assert_eq!(table.require_column("label").unwrap(), 5);
        let err = table.require_column("nope").unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = DataTable::new(
            vec!["a".to_string(), "b".to_string()],
            vec![vec!["1".to_string()]],
        )
        .unwrap_err();
        assert!(err.to_string().contains("Row 2"));
    }
}
