//! Dynamically typed cell values.

use std::cmp::Ordering;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

/// Format used when writing dates back out.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const ISO_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const DAY_FIRST_FORMATS: [&str; 4] = [
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
];

const MONTH_FIRST_FORMATS: [&str; 2] = ["%m/%d/%Y %H:%M:%S", "%m/%d/%Y %H:%M"];

/// A single cell of a report table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Date(NaiveDateTime),
    Text(String),
    List(Vec<String>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(f) => f.is_nan(),
            Value::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    /// Numeric view of the value; booleans count as 0/1.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) if !f.is_nan() => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Display text, or `None` for missing values.
    pub fn label(&self) -> Option<String> {
        if self.is_null() {
            None
        } else {
            Some(self.to_string())
        }
    }

    /// Ordering between values of the same kind. Mixed kinds are unordered.
    pub fn partial_compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::List(a), Value::List(b)) => Some(a.cmp(b)),
            (a, b) => match (a.numeric(), b.numeric()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }

    fn numeric(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) if x.is_nan() => Ok(()),
            Value::Float(x) => write!(f, "{}", x),
            Value::Date(d) => write!(f, "{}", d.format(DATETIME_FORMAT)),
            Value::Text(s) => write!(f, "{}", s),
            Value::List(items) => {
                let json = serde_json::to_string(items).map_err(|_| fmt::Error)?;
                write!(f, "{}", json)
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(d: NaiveDateTime) -> Self {
        Value::Date(d)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Parse a timestamp as exported by the RIS.
///
/// ISO layouts are always accepted. Slash and dash layouts are read day-first
/// when `dayfirst` is set, month-first otherwise. Date-only input maps to
/// midnight.
pub fn parse_datetime(raw: &str, dayfirst: bool) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    for fmt in ISO_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }

    let layouts: &[&str] = if dayfirst {
        &DAY_FIRST_FORMATS
    } else {
        &MONTH_FIRST_FORMATS
    };
    for fmt in layouts {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }

    let date_layouts: &[&str] = if dayfirst {
        &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"]
    } else {
        &["%Y-%m-%d", "%m/%d/%Y"]
    };
    date_layouts
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Parse a serialized list cell: JSON (`["a", "b"]`), Python repr
/// (`['a', 'b']`), or a bare single item.
pub fn parse_list(raw: &str) -> Vec<String> {
    let s = raw.trim();
    if s.is_empty() {
        return Vec::new();
    }
    if let Ok(items) = serde_json::from_str::<Vec<String>>(s) {
        return items;
    }
    if s.starts_with('[') && s.ends_with(']') {
        if let Ok(items) = serde_json::from_str::<Vec<String>>(&s.replace('\'', "\"")) {
            return items;
        }
        return s[1..s.len() - 1]
            .split(',')
            .map(|item| item.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
            .filter(|item| !item.is_empty())
            .collect();
    }
    vec![s.to_string()]
}

/// Parse a boolean cell in any of the spellings spreadsheets produce.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn test_parse_datetime_dayfirst() {
        assert_eq!(parse_datetime("03/02/2020 10:15", true), Some(dt(2020, 2, 3, 10, 15)));
        assert_eq!(parse_datetime("03/02/2020", true), Some(dt(2020, 2, 3, 0, 0)));
        assert_eq!(parse_datetime("03/02/2020 10:15", false), Some(dt(2020, 3, 2, 10, 15)));
    }

    #[test]
    fn test_parse_datetime_iso() {
        assert_eq!(parse_datetime("2020-02-03 10:15:00", true), Some(dt(2020, 2, 3, 10, 15)));
        assert_eq!(parse_datetime("2020-02-03T10:15:00", false), Some(dt(2020, 2, 3, 10, 15)));
        assert_eq!(parse_datetime("2020-02-03", true), Some(dt(2020, 2, 3, 0, 0)));
        assert_eq!(parse_datetime("not a date", true), None);
        assert_eq!(parse_datetime("", true), None);
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list(r#"["Epilepsy", "Traumatic"]"#), vec!["Epilepsy", "Traumatic"]);
        assert_eq!(parse_list("['Epilepsy', 'Traumatic']"), vec!["Epilepsy", "Traumatic"]);
        assert_eq!(parse_list("[]"), Vec::<String>::new());
        assert_eq!(parse_list("Headache"), vec!["Headache"]);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(Value::Float(42.5).to_string(), "42.5");
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Date(dt(2020, 1, 2, 3, 4)).to_string(), "2020-01-02 03:04:00");
        assert_eq!(Value::List(vec!["a".into()]).to_string(), r#"["a"]"#);
    }

    #[test]
    fn test_partial_compare() {
        assert_eq!(Value::Int(2).partial_compare(&Value::Float(1.5)), Some(Ordering::Greater));
        assert_eq!(Value::from("a").partial_compare(&Value::from("b")), Some(Ordering::Less));
        assert_eq!(Value::Bool(true).partial_compare(&Value::from("all")), None);
    }

    #[test]
    fn test_is_null() {
        assert!(Value::Null.is_null());
        assert!(Value::Float(f64::NAN).is_null());
        assert!(Value::from("").is_null());
        assert!(!Value::Int(0).is_null());
    }
}
