//! XLSX reader.

use std::io::Cursor;

use calamine::{open_workbook_from_rs, Data, Reader, Xlsx, XlsxError};

use super::{IngestError, IngestResult, RawTable};
use crate::models::{parse_datetime, Value};

/// Read the first worksheet of an XLSX workbook. The first row holds the
/// column names.
pub fn read_xlsx(bytes: &[u8]) -> IngestResult<RawTable> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))
        .map_err(|e: XlsxError| IngestError::Workbook(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| IngestError::Workbook("workbook has no worksheets".into()))?
        .map_err(|e| IngestError::Workbook(e.to_string()))?;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header_row) => header_row
            .iter()
            .map(|cell| cell_value(cell).to_string().trim().to_string())
            .collect(),
        None => return Ok(RawTable::default()),
    };

    let rows = rows
        .map(|row| {
            let mut cells: Vec<Value> = row.iter().map(cell_value).collect();
            cells.resize(headers.len(), Value::Null);
            cells
        })
        .collect();
    Ok(RawTable { headers, rows })
}

/// Map a spreadsheet cell onto a [`Value`].
pub fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty | Data::Error(_) => Value::Null,
        Data::String(s) if s.is_empty() => Value::Null,
        Data::String(s) => Value::Text(s.clone()),
        Data::Int(i) => Value::Int(*i),
        Data::Float(f) => Value::Float(*f),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => dt.as_datetime().map(Value::Date).unwrap_or(Value::Null),
        Data::DateTimeIso(s) => parse_datetime(s, true)
            .map(Value::Date)
            .unwrap_or_else(|| Value::Text(s.clone())),
        Data::DurationIso(s) => Value::Text(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_value() {
        assert_eq!(cell_value(&Data::Empty), Value::Null);
        assert_eq!(cell_value(&Data::String("x".into())), Value::from("x"));
        assert_eq!(cell_value(&Data::String(String::new())), Value::Null);
        assert_eq!(cell_value(&Data::Float(1.5)), Value::Float(1.5));
        assert_eq!(cell_value(&Data::Bool(true)), Value::Bool(true));
        assert!(matches!(
            cell_value(&Data::DateTimeIso("2020-01-02T03:04:05".into())),
            Value::Date(_)
        ));
    }

    #[test]
    fn test_read_xlsx_rejects_garbage() {
        assert!(matches!(
            read_xlsx(b"definitely not a zip"),
            Err(IngestError::Workbook(_))
        ));
    }
}
