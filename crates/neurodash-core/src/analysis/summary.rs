//! Descriptive summaries: basic counts, numeric and categorical describes.

use std::collections::{BTreeSet, HashMap};

use crate::config::DataFormat;
use crate::models::{ReportSubset, Table, Value};

/// Rows of a numeric describe.
pub const NUMERIC_STATS: [&str; 8] = ["count", "mean", "std", "min", "25%", "50%", "75%", "max"];

/// Rows of a categorical describe.
pub const CATEGORICAL_STATS: [&str; 4] = ["count", "unique", "top", "freq"];

/// Linear-interpolated quantile of sorted, non-empty data.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

fn numeric_stats(values: &[f64]) -> Vec<Value> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    if n == 0 {
        let mut out = vec![Value::Float(0.0)];
        out.resize(NUMERIC_STATS.len(), Value::Null);
        return out;
    }
    let mean = sorted.iter().sum::<f64>() / n as f64;
    let std = if n > 1 {
        Value::Float(
            (sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt(),
        )
    } else {
        Value::Null
    };
    vec![
        Value::Float(n as f64),
        Value::Float(mean),
        std,
        Value::Float(sorted[0]),
        Value::Float(quantile(&sorted, 0.25)),
        Value::Float(quantile(&sorted, 0.5)),
        Value::Float(quantile(&sorted, 0.75)),
        Value::Float(sorted[n - 1]),
    ]
}

/// Count, mean, sample std, min, quartiles and max per column.
pub fn describe_numeric(columns: &[(String, Vec<f64>)]) -> Table {
    let stats: Vec<Vec<Value>> = columns.iter().map(|(_, v)| numeric_stats(v)).collect();
    let mut table = Table::new(columns.iter().map(|(name, _)| name.clone()));
    for (i, stat) in NUMERIC_STATS.iter().enumerate() {
        table.push_row(*stat, stats.iter().map(|s| s[i].clone()).collect());
    }
    table
}

/// Numeric describe with the count row replaced by a column total.
pub fn describe_total(columns: &[(String, Vec<f64>)]) -> Table {
    let described = describe_numeric(columns);
    let mut table = Table::new(described.columns.clone());
    for (index, row) in described.index.iter().zip(&described.data) {
        if index != "count" {
            table.push_row(index.clone(), row.clone());
        }
    }
    table.push_row(
        "total",
        columns
            .iter()
            .map(|(_, v)| Value::Float(v.iter().filter(|x| x.is_finite()).sum()))
            .collect(),
    );
    table
}

/// Non-null count, distinct values, most frequent value and its count.
pub fn describe_categorical(columns: &[(String, Vec<Value>)]) -> Table {
    let mut table = Table::new(columns.iter().map(|(name, _)| name.clone()));
    let stats: Vec<[Value; 4]> = columns
        .iter()
        .map(|(_, values)| {
            let mut counts: HashMap<String, usize> = HashMap::new();
            let mut order: Vec<String> = Vec::new();
            for label in values.iter().filter_map(Value::label) {
                let entry = counts.entry(label.clone()).or_insert(0);
                if *entry == 0 {
                    order.push(label);
                }
                *entry += 1;
            }
            let count: usize = counts.values().sum();
            let top = order
                .iter()
                .fold(None::<(&String, usize)>, |best, label| {
                    let n = counts[label];
                    match best {
                        Some((_, m)) if m >= n => best,
                        _ => Some((label, n)),
                    }
                });
            [
                Value::Int(count as i64),
                Value::Int(order.len() as i64),
                top.map_or(Value::Null, |(l, _)| Value::Text(l.clone())),
                top.map_or(Value::Null, |(_, n)| Value::Int(n as i64)),
            ]
        })
        .collect();
    for (i, stat) in CATEGORICAL_STATS.iter().enumerate() {
        table.push_row(*stat, stats.iter().map(|s| s[i].clone()).collect());
    }
    table
}

/// Numeric view of a column; booleans and text are not numeric here.
pub fn numeric_column(subset: &ReportSubset<'_>, column: &str) -> Vec<f64> {
    subset
        .iter()
        .filter_map(|r| match r.get(column) {
            Value::Bool(_) => None,
            v => v.as_f64(),
        })
        .collect()
}

/// Start and end date, number of reports and of distinct patients.
pub fn basic_summary(subset: &ReportSubset<'_>) -> Table {
    let mut table = Table::new(["start_date", "end_date", "n_reports", "n_unique_patients"]);
    let span = subset.date_span();
    let patients: BTreeSet<String> = subset.iter().filter_map(|r| r.patient_id()).collect();
    table.push_row(
        "0",
        vec![
            span.map_or(Value::Null, |(first, _)| Value::Text(first.date().to_string())),
            span.map_or(Value::Null, |(_, last)| Value::Text(last.date().to_string())),
            Value::Int(subset.len() as i64),
            Value::Int(patients.len() as i64),
        ],
    );
    table
}

/// Numeric describe of the continuous and per-patient continuous columns.
pub fn continuous_summary(subset: &ReportSubset<'_>, format: &DataFormat) -> Table {
    let columns: Vec<(String, Vec<f64>)> = format
        .continuous_columns()
        .into_iter()
        .map(|c| {
            let values = numeric_column(subset, &c);
            (c, values)
        })
        .collect();
    describe_numeric(&columns)
}

/// Categorical describe of the categorical and per-patient categorical
/// columns.
pub fn categorical_summary(subset: &ReportSubset<'_>, format: &DataFormat) -> Table {
    let columns: Vec<(String, Vec<Value>)> = format
        .categorical_columns()
        .into_iter()
        .map(|c| {
            let values = subset.column(&c);
            (c, values)
        })
        .collect();
    describe_categorical(&columns)
}

/// The three summary tables of the operational view.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationalSummary {
    pub basic: Table,
    pub continuous: Table,
    pub categorical: Table,
}

impl OperationalSummary {
    pub fn compute(subset: &ReportSubset<'_>, format: &DataFormat) -> Self {
        Self {
            basic: basic_summary(subset),
            continuous: continuous_summary(subset, format),
            categorical: categorical_summary(subset, format),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::NaiveDate;

    use super::*;
    use crate::models::{columns, ReportRecord};

    fn approx(v: &Value, expected: f64) -> bool {
        v.as_f64().map(|x| (x - expected).abs() < 1e-9).unwrap_or(false)
    }

    #[test]
    fn test_describe_numeric() {
        let table = describe_numeric(&[("x".to_string(), vec![1.0, 2.0, 3.0, 4.0])]);
        assert_eq!(table.index, NUMERIC_STATS.to_vec());
        assert!(approx(table.cell("count", "x").unwrap(), 4.0));
        assert!(approx(table.cell("mean", "x").unwrap(), 2.5));
        assert!(approx(table.cell("std", "x").unwrap(), 1.2909944487358056));
        assert!(approx(table.cell("25%", "x").unwrap(), 1.75));
        assert!(approx(table.cell("50%", "x").unwrap(), 2.5));
        assert!(approx(table.cell("max", "x").unwrap(), 4.0));
    }

    #[test]
    fn test_describe_numeric_degenerate() {
        let table = describe_numeric(&[("one".to_string(), vec![5.0]), ("none".to_string(), vec![])]);
        assert_eq!(table.cell("std", "one"), Some(&Value::Null));
        assert!(approx(table.cell("min", "one").unwrap(), 5.0));
        assert!(approx(table.cell("count", "none").unwrap(), 0.0));
        assert_eq!(table.cell("mean", "none"), Some(&Value::Null));
    }

    #[test]
    fn test_describe_total() {
        let table = describe_total(&[("n_daily_reports".to_string(), vec![2.0, 4.0])]);
        assert!(table.row_position("count").is_none());
        assert_eq!(table.index.last().map(String::as_str), Some("total"));
        assert!(approx(table.cell("total", "n_daily_reports").unwrap(), 6.0));
    }

    #[test]
    fn test_describe_categorical() {
        let values = vec![
            Value::from("b"),
            Value::from("a"),
            Value::from("a"),
            Value::Null,
            Value::from("b"),
        ];
        let table = describe_categorical(&[("x".to_string(), values)]);
        assert_eq!(table.cell("count", "x"), Some(&Value::Int(4)));
        assert_eq!(table.cell("unique", "x"), Some(&Value::Int(2)));
        assert_eq!(table.cell("top", "x"), Some(&Value::from("b")));
        assert_eq!(table.cell("freq", "x"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_basic_summary() {
        let record = |mrn: &str, day: u32| {
            let mut fields = BTreeMap::new();
            fields.insert(columns::MRN.to_string(), Value::from(mrn));
            fields.insert(
                columns::EXAM_DATE.to_string(),
                Value::Date(NaiveDate::from_ymd_opt(2020, 2, day).unwrap().and_hms_opt(8, 0, 0).unwrap()),
            );
            fields.insert(columns::AGE.to_string(), Value::Int(day as i64 * 10));
            ReportRecord::from_fields(fields)
        };
        let records = vec![record("A", 3), record("B", 1), record("A", 9)];
        let cols: Vec<String> = Vec::new();
        let subset = ReportSubset::new(&cols, records.iter().collect());

        let basic = basic_summary(&subset);
        assert_eq!(basic.cell("0", "start_date"), Some(&Value::from("2020-02-01")));
        assert_eq!(basic.cell("0", "end_date"), Some(&Value::from("2020-02-09")));
        assert_eq!(basic.cell("0", "n_reports"), Some(&Value::Int(3)));
        assert_eq!(basic.cell("0", "n_unique_patients"), Some(&Value::Int(2)));

        let summary = OperationalSummary::compute(&subset, &DataFormat::default_ris());
        assert!(approx(summary.continuous.cell("mean", columns::AGE).unwrap(), 130.0 / 3.0));
        assert!(summary.categorical.column_position(columns::SEX).is_some());
    }
}
