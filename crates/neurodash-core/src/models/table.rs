//! Aggregate tables in split orientation.

use serde::Serialize;

use super::value::Value;

/// Derived counts/statistics keyed by an index, serialised as
/// `{columns, index, data}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub index: Vec<String>,
    pub data: Vec<Vec<Value>>,
}

impl Table {
    /// Create an empty table with the given columns.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            index: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Append a row. Short rows are padded with nulls.
    pub fn push_row(&mut self, index: impl Into<String>, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Null);
        self.index.push(index.into());
        self.data.push(row);
    }

    pub fn n_rows(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn column_position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn row_position(&self, index: &str) -> Option<usize> {
        self.index.iter().position(|i| i == index)
    }

    /// Cell by row index label and column name.
    pub fn cell(&self, index: &str, column: &str) -> Option<&Value> {
        let row = self.row_position(index)?;
        let col = self.column_position(column)?;
        self.data.get(row).and_then(|r| r.get(col))
    }

    /// Values of one column, top to bottom.
    pub fn column(&self, column: &str) -> Option<Vec<&Value>> {
        let col = self.column_position(column)?;
        Some(self.data.iter().filter_map(|r| r.get(col)).collect())
    }

    /// Sub-table of a contiguous column range.
    pub fn slice_columns(&self, range: std::ops::Range<usize>) -> Table {
        let end = range.end.min(self.columns.len());
        let start = range.start.min(end);
        Table {
            columns: self.columns[start..end].to_vec(),
            index: self.index.clone(),
            data: self.data.iter().map(|r| r[start..end].to_vec()).collect(),
        }
    }

    /// Split into tables of at most `width` columns each.
    pub fn chunk_columns(&self, width: usize) -> Vec<Table> {
        let width = width.max(1);
        (0..self.columns.len())
            .step_by(width)
            .map(|start| self.slice_columns(start..start + width))
            .collect()
    }

    /// Swap rows and columns.
    pub fn transpose(&self) -> Table {
        let mut out = Table::new(self.index.clone());
        for (c, name) in self.columns.iter().enumerate() {
            let row = self
                .data
                .iter()
                .map(|r| r.get(c).cloned().unwrap_or(Value::Null))
                .collect();
            out.push_row(name.clone(), row);
        }
        out
    }

    /// Cell text for display: floats rounded to 3 decimals.
    pub fn display_rows(&self) -> Vec<Vec<String>> {
        self.data
            .iter()
            .map(|row| row.iter().map(display_cell).collect())
            .collect()
    }

    /// Split-orientation JSON with floats rounded to 3 decimals.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let rounded = Table {
            columns: self.columns.clone(),
            index: self.index.clone(),
            data: self
                .data
                .iter()
                .map(|row| row.iter().map(round_cell).collect())
                .collect(),
        };
        serde_json::to_string(&rounded)
    }
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

fn round_cell(value: &Value) -> Value {
    match value {
        Value::Float(x) if x.is_finite() => Value::Float(round3(*x)),
        other => other.clone(),
    }
}

/// Display text of a table cell.
pub fn display_cell(value: &Value) -> String {
    match value {
        Value::Float(x) if x.is_finite() => format!("{}", round3(*x)),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        let mut t = Table::new(["a", "b", "c"]);
        t.push_row("x", vec![Value::Int(1), Value::Float(2.34567), Value::from("s")]);
        t.push_row("y", vec![Value::Int(3)]);
        t
    }

    #[test]
    fn test_push_row_pads() {
        let t = sample();
        assert_eq!(t.n_rows(), 2);
        assert_eq!(t.cell("y", "c"), Some(&Value::Null));
        assert_eq!(t.cell("x", "a"), Some(&Value::Int(1)));
        assert_eq!(t.cell("z", "a"), None);
    }

    #[test]
    fn test_to_json_split_orientation() {
        let json = sample().to_json().unwrap();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["columns"][1], "b");
        assert_eq!(v["index"][0], "x");
        assert_eq!(v["data"][0][1], 2.346);
        assert!(v["data"][1][2].is_null());
    }

    #[test]
    fn test_chunk_columns() {
        let mut t = Table::new((0..8).map(|i| format!("c{}", i)));
        t.push_row("r", (0..8).map(|i| Value::Int(i)).collect());
        let chunks = t.chunk_columns(6);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].columns.len(), 6);
        assert_eq!(chunks[1].columns, vec!["c6", "c7"]);
        assert_eq!(chunks[1].data[0], vec![Value::Int(6), Value::Int(7)]);
    }

    #[test]
    fn test_transpose() {
        let t = sample().transpose();
        assert_eq!(t.columns, vec!["x", "y"]);
        assert_eq!(t.index, vec!["a", "b", "c"]);
        assert_eq!(t.cell("a", "y"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_display_rows_round() {
        let rows = sample().display_rows();
        assert_eq!(rows[0], vec!["1", "2.346", "s"]);
    }
}
