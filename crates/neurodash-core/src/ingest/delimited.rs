//! CSV reader.

use csv::ReaderBuilder;

use super::{IngestResult, RawTable};
use crate::models::Value;

/// Read a CSV export. Empty cells become nulls; everything else stays text
/// until schema coercion.
pub fn read_csv(bytes: &[u8]) -> IngestResult<RawTable> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(bytes);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|cell| {
                    if cell.is_empty() {
                        Value::Null
                    } else {
                        Value::Text(cell.to_string())
                    }
                })
                .collect(),
        );
    }
    Ok(RawTable { headers, rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_csv_quoted_multiline() {
        let data = b"MRN,Narrative, Age \nA1,\"Line one\nLine two\",42\nA2,,\n";
        let table = read_csv(data).unwrap();
        assert_eq!(table.headers, vec!["MRN", "Narrative", "Age"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][1], Value::from("Line one\nLine two"));
        assert_eq!(table.rows[1][1], Value::Null);
    }

    #[test]
    fn test_read_csv_ragged_rows_fail() {
        let data = b"a,b\n1,2,3\n";
        assert!(read_csv(data).is_err());
    }
}
