//! Report selection: criteria built from the selection panel and the filter
//! that applies them.
//!
//! Every constraint is combined with logical AND:
//! - categorical fields: value must be in the permitted set (`all` = no constraint)
//! - age: inclusive range; reports without an age are excluded
//! - exam date: inclusive on both ends
//! - pathological domains: every selected domain flag must be set

mod options;

pub use options::*;

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::DataFormat;
use crate::models::{columns, ReportRecord, ReportSet, ReportSubset, Table, Value};

/// Selection errors.
#[derive(Error, Debug)]
pub enum SelectionError {
    #[error("Selection panel fields missing from configuration: {missing:?} (required: {required:?})")]
    MissingPanelFields {
        missing: Vec<String>,
        required: Vec<String>,
    },

    #[error("No reports with {0} to derive selection bounds from")]
    NoBounds(&'static str),

    #[error("Invalid selection: {0}")]
    Invalid(String),
}

pub type SelectionResult<T> = Result<T, SelectionError>;

/// Fields the selection panel requires in the data format.
pub const PANEL_FIELDS: [&str; 13] = [
    columns::EXAM_DATE,
    columns::PROCEDURE,
    columns::REQUESTING_CLINICIAN,
    columns::ORDERING_DEPT,
    columns::DEPT_SPECIALTY,
    columns::REPORTING_CLINICIANS,
    columns::PATHOLOGICAL_DOMAINS,
    columns::USES_CONTRAST,
    columns::QUALITY_PRIORITY,
    columns::PATIENT_CLASS,
    columns::NORMALITY_CLASS,
    columns::SEX,
    columns::AGE,
];

/// Categorical panel fields, in widget order.
pub const CATEGORICAL_PANEL_FIELDS: [&str; 10] = [
    columns::ORDERING_DEPT,
    columns::REQUESTING_CLINICIAN,
    columns::PROCEDURE,
    columns::REPORTING_CLINICIANS,
    columns::DEPT_SPECIALTY,
    columns::USES_CONTRAST,
    columns::PATIENT_CLASS,
    columns::QUALITY_PRIORITY,
    columns::NORMALITY_CLASS,
    columns::SEX,
];

/// Permitted values for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Choice {
    /// No constraint
    All,
    /// Only these displayed values
    Only(BTreeSet<String>),
}

impl Choice {
    /// Build from widget selections; any `all` entry means no constraint.
    pub fn from_selected<I, S>(selected: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: BTreeSet<String> = selected.into_iter().map(Into::into).collect();
        if values.contains(ALL) {
            Choice::All
        } else {
            Choice::Only(values)
        }
    }

    /// Whether a categorical value passes. A specific set never admits a
    /// missing value.
    pub fn permits(&self, value: &Value) -> bool {
        match self {
            Choice::All => true,
            Choice::Only(allowed) => value.label().map(|v| allowed.contains(&v)).unwrap_or(false),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Choice::All)
    }
}

impl Default for Choice {
    fn default() -> Self {
        Choice::All
    }
}

/// Immutable per-field constraints from the selection panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionCriteria {
    /// Categorical field → permitted values; absent fields are unconstrained
    pub categorical: Vec<(String, Choice)>,
    /// Inclusive age range
    pub age: (i64, i64),
    /// Inclusive exam-date range
    pub dates: (NaiveDate, NaiveDate),
    /// Domains that must all be flagged
    pub domains: Choice,
}

impl SelectionCriteria {
    /// Unconstrained criteria spanning the data's age and date ranges.
    pub fn unconstrained(reports: &ReportSet) -> SelectionResult<Self> {
        let ages: Vec<f64> = reports.records.iter().filter_map(ReportRecord::age).collect();
        let min_age = ages.iter().copied().reduce(f64::min).ok_or(SelectionError::NoBounds("ages"))?;
        let max_age = ages.iter().copied().reduce(f64::max).ok_or(SelectionError::NoBounds("ages"))?;
        let (first, last) = reports
            .view()
            .date_span()
            .ok_or(SelectionError::NoBounds("exam dates"))?;

        Ok(Self {
            categorical: Vec::new(),
            age: (min_age.floor() as i64, max_age.ceil() as i64),
            dates: (first.date(), last.date()),
            domains: Choice::All,
        })
    }

    /// Copy with one categorical field constrained.
    pub fn with_choice(&self, field: &str, choice: Choice) -> Self {
        let mut next = self.clone();
        next.categorical.retain(|(f, _)| f != field);
        next.categorical.push((field.to_string(), choice));
        next
    }

    pub fn with_age(&self, min: i64, max: i64) -> SelectionResult<Self> {
        if min > max {
            return Err(SelectionError::Invalid(format!("age range {}..={} is empty", min, max)));
        }
        Ok(Self {
            age: (min, max),
            ..self.clone()
        })
    }

    pub fn with_dates(&self, start: NaiveDate, end: NaiveDate) -> SelectionResult<Self> {
        if start > end {
            return Err(SelectionError::Invalid(format!("end date {} is before start date {}", end, start)));
        }
        Ok(Self {
            dates: (start, end),
            ..self.clone()
        })
    }

    pub fn with_domains(&self, domains: Choice) -> Self {
        Self {
            domains,
            ..self.clone()
        }
    }

    pub fn choice(&self, field: &str) -> &Choice {
        self.categorical
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, c)| c)
            .unwrap_or(&Choice::All)
    }

    /// Whether one report satisfies every constraint.
    pub fn matches(&self, record: &ReportRecord) -> bool {
        let (min_age, max_age) = (self.age.0 as f64, self.age.1 as f64);
        let age_ok = record
            .age()
            .map(|a| a >= min_age && a <= max_age)
            .unwrap_or(false);
        if !age_ok {
            return false;
        }

        let date_ok = record
            .exam_day()
            .map(|d| d >= self.dates.0 && d <= self.dates.1)
            .unwrap_or(false);
        if !date_ok {
            return false;
        }

        if !self
            .categorical
            .iter()
            .all(|(field, choice)| choice.permits(&record.get(field)))
        {
            return false;
        }

        match &self.domains {
            Choice::All => true,
            Choice::Only(domains) => domains.iter().all(|d| record.domain_flag(d)),
        }
    }

    /// Audit record of the numeric and date bounds applied.
    pub fn audit_table(&self) -> Table {
        let mut table = Table::new(["min age", "max age", "start date", "end date"]);
        table.push_row(
            "0",
            vec![
                Value::Text(self.age.0.to_string()),
                Value::Text(self.age.1.to_string()),
                Value::Text(self.dates.0.to_string()),
                Value::Text(self.dates.1.to_string()),
            ],
        );
        table
    }
}

/// Output of a selection: the matching reports and the criteria audit table.
#[derive(Debug, Clone)]
pub struct Selection<'a> {
    pub subset: ReportSubset<'a>,
    pub criteria: Table,
}

/// Validated selection panel over a data format.
#[derive(Debug, Clone)]
pub struct SelectionFilter {
    display_names: Vec<(String, String)>,
}

impl SelectionFilter {
    /// Fails listing every panel field the data format does not put in the
    /// selection panel.
    pub fn new(format: &DataFormat) -> SelectionResult<Self> {
        let available = format.selection_columns();
        let missing: Vec<String> = PANEL_FIELDS
            .iter()
            .filter(|f| !available.iter().any(|a| a == *f))
            .map(|f| f.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(SelectionError::MissingPanelFields {
                missing,
                required: PANEL_FIELDS.iter().map(|f| f.to_string()).collect(),
            });
        }

        let display_names = PANEL_FIELDS
            .iter()
            .filter_map(|f| format.get(f).map(|s| (f.to_string(), s.display_name.clone())))
            .collect();
        Ok(Self { display_names })
    }

    /// Widget label for a panel field.
    pub fn display_name(&self, field: &str) -> Option<&str> {
        self.display_names
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, d)| d.as_str())
    }

    /// Option list for every categorical panel widget.
    pub fn options(&self, reports: &ReportSet) -> Vec<(String, Vec<String>)> {
        CATEGORICAL_PANEL_FIELDS
            .iter()
            .map(|field| {
                let values: Vec<Value> = reports.records.iter().map(|r| r.get(field)).collect();
                (field.to_string(), multiselect_options(&values, MAX_OPTIONS))
            })
            .collect()
    }

    /// Option list for the domain widget.
    pub fn domain_options(&self, reports: &ReportSet) -> Vec<String> {
        multilabel_options(reports.records.iter().map(|r| r.pathological_domains()))
    }

    /// Apply criteria to a report set.
    pub fn apply<'a>(&self, reports: &'a ReportSet, criteria: &SelectionCriteria) -> Selection<'a> {
        let rows: Vec<&ReportRecord> = reports
            .records
            .iter()
            .filter(|r| criteria.matches(r))
            .collect();
        info!(rows_in = reports.len(), rows_out = rows.len(), "applied selection");
        Selection {
            subset: ReportSubset::new(&reports.columns, rows),
            criteria: criteria.audit_table(),
        }
    }
}

/// Anything carrying an exam date.
pub trait HasExamDate {
    fn exam_day(&self) -> Option<NaiveDate>;
}

impl HasExamDate for ReportRecord {
    fn exam_day(&self) -> Option<NaiveDate> {
        ReportRecord::exam_day(self)
    }
}

impl<T: HasExamDate + ?Sized> HasExamDate for &T {
    fn exam_day(&self) -> Option<NaiveDate> {
        (**self).exam_day()
    }
}

/// Rows with `start <= exam day < end`.
pub fn select_dates<T: HasExamDate>(rows: &[T], start: NaiveDate, end: NaiveDate) -> Vec<&T> {
    rows.iter()
        .filter(|r| r.exam_day().map(|d| d >= start && d < end).unwrap_or(false))
        .collect()
}
