//! File ingest: CSV/XLSX uploads into report sets.

mod delimited;
mod encryption;
mod workbook;

pub use delimited::*;
pub use encryption::*;
pub use workbook::*;

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::{DataFormat, Dtype};
use crate::enrich::TextCleaner;
use crate::models::{
    columns, is_enrichment_column, parse_bool, parse_datetime, parse_list, ReportRecord, ReportSet,
    Value,
};

/// Minimum Jaro-Winkler similarity for a "did you mean" hint.
const HINT_THRESHOLD: f64 = 0.9;

/// Ingest errors.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Filetype not supported for {0}, supported filetypes: .xlsx, .csv")]
    UnsupportedFileType(String),

    #[error("{file} is missing required columns {missing:?}{}", hint_suffix(.hints))]
    MissingColumns {
        file: String,
        missing: Vec<String>,
        hints: Vec<(String, String)>,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Workbook(String),

    #[error("Decryption failed for {file}: {reason}")]
    Decryption { file: String, reason: String },

    #[error("Invalid {dtype:?} value {value:?} in column {column}, row {row}")]
    InvalidValue {
        column: String,
        row: usize,
        dtype: Dtype,
        value: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type IngestResult<T> = Result<T, IngestError>;

fn hint_suffix(hints: &[(String, String)]) -> String {
    if hints.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = hints
        .iter()
        .map(|(missing, found)| format!("{:?} for {:?}", found, missing))
        .collect();
    format!(" (did you mean {}?)", parts.join(", "))
}

/// Supported upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Csv,
    Xlsx,
}

/// Identify an upload by its extension.
pub fn identify_filetype(name: &str) -> IngestResult<FileType> {
    let lower = name.to_lowercase();
    if lower.ends_with(".csv") {
        Ok(FileType::Csv)
    } else if lower.ends_with(".xlsx") {
        Ok(FileType::Xlsx)
    } else {
        Err(IngestError::UnsupportedFileType(name.to_string()))
    }
}

/// An uploaded file: its name and raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Read a file from disk, keeping its file name.
    pub fn from_path<P: AsRef<std::path::Path>>(path: P) -> IngestResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { name, bytes })
    }
}

/// Untyped cells as read from a file, before schema coercion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Parse every uploaded file into a report set.
pub fn read_file_input(files: &[UploadedFile], format: &DataFormat) -> IngestResult<Vec<ReportSet>> {
    files
        .iter()
        .map(|file| {
            let raw = match identify_filetype(&file.name)? {
                FileType::Csv => read_csv(&file.bytes)?,
                FileType::Xlsx => read_xlsx(&file.bytes)?,
            };
            info!(file = %file.name, rows = raw.rows.len(), "read upload");
            process_ris(&file.name, raw, format)
        })
        .collect()
}

/// Parse uploads and concatenate them in upload order.
pub fn load_reports(files: &[UploadedFile], format: &DataFormat) -> IngestResult<ReportSet> {
    Ok(ReportSet::concat(read_file_input(files, format)?))
}

/// Check the required columns, coerce cells to the schema types and clean
/// the narratives.
pub fn process_ris(file: &str, raw: RawTable, format: &DataFormat) -> IngestResult<ReportSet> {
    check_required_columns(file, &raw.headers, &format.required_columns())?;

    let cleaner = TextCleaner::new();
    let mut records = Vec::with_capacity(raw.rows.len());
    for (row_idx, row) in raw.rows.into_iter().enumerate() {
        let mut fields = BTreeMap::new();
        for (header, cell) in raw.headers.iter().zip(row) {
            let value = coerce(cell, format.dtype(header), header, row_idx)?;
            let value = match value {
                Value::Text(s) if header == columns::NARRATIVE => Value::Text(cleaner.clean(&s)),
                other => other,
            };
            fields.insert(header.clone(), value);
        }
        records.push(ReportRecord::from_fields(fields));
    }

    // Enrichment columns are lifted out of the source columns.
    let columns: Vec<String> = raw
        .headers
        .into_iter()
        .filter(|h| !is_enrichment_column(h))
        .collect();
    Ok(ReportSet::new(columns, records))
}

/// Fail with every missing column and close-spelling hints.
pub fn check_required_columns(file: &str, headers: &[String], required: &[String]) -> IngestResult<()> {
    let missing: Vec<String> = required
        .iter()
        .filter(|r| !headers.contains(r))
        .cloned()
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    let hints = missing
        .iter()
        .filter_map(|m| {
            headers
                .iter()
                .map(|h| (h, strsim::jaro_winkler(&m.to_lowercase(), &h.to_lowercase())))
                .filter(|(_, score)| *score >= HINT_THRESHOLD)
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(h, _)| (m.clone(), h.clone()))
        })
        .collect();

    Err(IngestError::MissingColumns {
        file: file.to_string(),
        missing,
        hints,
    })
}

/// Coerce one cell to its schema type; columns outside the schema are
/// type-inferred from text.
fn coerce(cell: Value, dtype: Option<Dtype>, column: &str, row: usize) -> IngestResult<Value> {
    if cell.is_null() {
        return Ok(Value::Null);
    }
    let invalid = |dtype: Dtype, cell: &Value| IngestError::InvalidValue {
        column: column.to_string(),
        row,
        dtype,
        value: cell.to_string(),
    };

    let Some(dtype) = dtype else {
        return Ok(match cell {
            Value::Text(s) => infer_text(s),
            other => other,
        });
    };

    match (dtype, cell) {
        (Dtype::String, Value::Text(s)) => Ok(Value::Text(s)),
        (Dtype::String, other) => Ok(Value::Text(other.to_string())),
        (Dtype::Date, Value::Date(d)) => Ok(Value::Date(d)),
        (Dtype::Date, Value::Text(s)) => match parse_datetime(&s, true) {
            Some(d) => Ok(Value::Date(d)),
            None => {
                warn!(column, row, value = %s, "unparseable date left empty");
                Ok(Value::Null)
            }
        },
        (Dtype::Integer, Value::Int(i)) => Ok(Value::Int(i)),
        (Dtype::Integer, Value::Float(f)) if f.fract() == 0.0 => Ok(Value::Int(f as i64)),
        (Dtype::Integer, Value::Text(s)) => {
            let t = s.trim();
            t.parse::<i64>()
                .ok()
                .or_else(|| {
                    t.parse::<f64>()
                        .ok()
                        .filter(|f| f.fract() == 0.0)
                        .map(|f| f as i64)
                })
                .map(Value::Int)
                .ok_or_else(|| invalid(dtype, &Value::Text(s.clone())))
        }
        (Dtype::Float, Value::Float(f)) => Ok(Value::Float(f)),
        (Dtype::Float, Value::Int(i)) => Ok(Value::Float(i as f64)),
        (Dtype::Float, Value::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| invalid(dtype, &Value::Text(s.clone()))),
        (Dtype::Boolean, Value::Bool(b)) => Ok(Value::Bool(b)),
        (Dtype::Boolean, Value::Int(i)) => Ok(Value::Bool(i != 0)),
        (Dtype::Boolean, Value::Text(s)) => parse_bool(&s)
            .map(Value::Bool)
            .ok_or_else(|| invalid(dtype, &Value::Text(s.clone()))),
        (Dtype::List, Value::List(items)) => Ok(Value::List(items)),
        (Dtype::List, Value::Text(s)) => Ok(Value::List(parse_list(&s))),
        (dtype, other) => Err(invalid(dtype, &other)),
    }
}

/// Type of a free-text cell in a column the schema does not describe.
fn infer_text(s: String) -> Value {
    let t = s.trim();
    if let Ok(i) = t.parse::<i64>() {
        return Value::Int(i);
    }
    if let Ok(f) = t.parse::<f64>() {
        if f.is_finite() {
            return Value::Float(f);
        }
    }
    match t {
        "True" | "true" | "TRUE" => Value::Bool(true),
        "False" | "false" | "FALSE" => Value::Bool(false),
        _ => Value::Text(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identify_filetype() {
        assert_eq!(identify_filetype("export.csv").unwrap(), FileType::Csv);
        assert_eq!(identify_filetype("Export.XLSX").unwrap(), FileType::Xlsx);
        assert!(matches!(
            identify_filetype("export.xls"),
            Err(IngestError::UnsupportedFileType(_))
        ));
    }

    #[test]
    fn test_missing_columns_with_hint() {
        let headers = vec!["MRN".to_string(), "Narative".to_string()];
        let required = vec!["MRN".to_string(), "Narrative".to_string(), "Age".to_string()];
        let err = check_required_columns("a.csv", &headers, &required).unwrap_err();
        match &err {
            IngestError::MissingColumns { missing, hints, .. } => {
                assert_eq!(missing, &vec!["Narrative".to_string(), "Age".to_string()]);
                assert_eq!(hints, &vec![("Narrative".to_string(), "Narative".to_string())]);
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(err.to_string().contains("did you mean"));
    }

    #[test]
    fn test_coerce_by_dtype() {
        assert_eq!(
            coerce(Value::from("42"), Some(Dtype::Integer), "Age", 0).unwrap(),
            Value::Int(42)
        );
        assert_eq!(
            coerce(Value::Float(42.0), Some(Dtype::Integer), "Age", 0).unwrap(),
            Value::Int(42)
        );
        assert_eq!(
            coerce(Value::Float(12345.0), Some(Dtype::String), "MRN", 0).unwrap(),
            Value::from("12345")
        );
        assert_eq!(
            coerce(Value::from("yes"), Some(Dtype::Boolean), "flag", 0).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(coerce(Value::from(""), Some(Dtype::Integer), "Age", 0).unwrap(), Value::Null);
        assert!(matches!(
            coerce(Value::from("old"), Some(Dtype::Integer), "Age", 3),
            Err(IngestError::InvalidValue { row: 3, .. })
        ));
    }

    #[test]
    fn test_coerce_unknown_column_infers() {
        assert_eq!(coerce(Value::from("7"), None, "x", 0).unwrap(), Value::Int(7));
        assert_eq!(coerce(Value::from("0.5"), None, "x", 0).unwrap(), Value::Float(0.5));
        assert_eq!(coerce(Value::from("False"), None, "x", 0).unwrap(), Value::Bool(false));
        assert_eq!(coerce(Value::from("abc"), None, "x", 0).unwrap(), Value::from("abc"));
    }
}
