//! Aggregator/transformer: reshapes report subsets for workload and service
//! analysis.
//!
//! Everything here is a pure function of its input; nothing mutates the
//! session's report set.

mod age;
mod categories;
mod contrast;
mod reporters;
mod rolling;

pub use age::*;
pub use categories::*;
pub use contrast::*;
pub use reporters::*;
pub use rolling::*;

use chrono::{NaiveDate, NaiveDateTime};
use neurodash_nlp::PATHOLOGICAL_DOMAINS;
use tracing::debug;

use crate::models::{columns, ReportRecord, ReportSubset, Value};
use crate::selection::HasExamDate;

/// Prefix of per-pathology assertion count columns in service exports.
pub const ASSERTED_PATHOLOGY_PREFIX: &str = "asserted-pathology-";

/// Prefix of the derived pathology presence columns.
pub const HAS_PATHOLOGY_PREFIX: &str = "has-";

/// A report prepared for workload aggregation.
#[derive(Debug, Clone)]
pub struct WorkloadRecord<'a> {
    pub report: &'a ReportRecord,
    pub age_bucket: Option<String>,
    /// Calendar day of the exam
    pub date: NaiveDate,
    pub primary_reporter: Option<String>,
    pub secondary_reporter: Option<String>,
}

impl HasExamDate for WorkloadRecord<'_> {
    fn exam_day(&self) -> Option<NaiveDate> {
        Some(self.date)
    }
}

/// Bucket ages, take the calendar date and split the reporters of every
/// report. Reports without an exam date cannot be placed on a day and are
/// dropped.
pub fn prepare_workload<'a>(subset: &ReportSubset<'a>) -> Vec<WorkloadRecord<'a>> {
    let rows: Vec<WorkloadRecord<'a>> = subset
        .iter()
        .filter_map(|report| {
            let date = report.exam_day()?;
            let (primary_reporter, secondary_reporter) =
                split_reporters(report.text(columns::REPORTING_CLINICIANS));
            Some(WorkloadRecord {
                report,
                age_bucket: report.age().and_then(age_bucket),
                date,
                primary_reporter,
                secondary_reporter,
            })
        })
        .collect();
    if rows.len() < subset.len() {
        debug!(dropped = subset.len() - rows.len(), "reports without exam date");
    }
    rows
}

/// First and last day covered by prepared rows.
pub fn date_range(rows: &[WorkloadRecord<'_>]) -> Option<(NaiveDate, NaiveDate)> {
    let first = rows.iter().map(|r| r.date).min()?;
    let last = rows.iter().map(|r| r.date).max()?;
    Some((first, last))
}

/// Domains with a membership flag on any report, in canonical domain order.
pub fn domain_columns<'a, I>(reports: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a ReportRecord>,
{
    let mut seen = std::collections::HashSet::new();
    for report in reports {
        if let Some(enrichment) = &report.enrichment {
            seen.extend(enrichment.domain_flags.keys().map(String::as_str));
        }
    }
    PATHOLOGICAL_DOMAINS
        .iter()
        .filter(|d| seen.contains(**d))
        .map(|d| d.to_string())
        .collect()
}

/// Seconds since the Unix epoch, treating the timestamp as UTC.
pub fn epoch_seconds(dt: NaiveDateTime) -> i64 {
    dt.and_utc().timestamp()
}

/// Timestamp of an epoch-seconds value.
pub fn from_epoch_seconds(secs: i64) -> Option<NaiveDateTime> {
    chrono::DateTime::from_timestamp(secs, 0).map(|dt| dt.naive_utc())
}

/// `has-*` column derived from an `asserted-pathology-*` count column.
pub fn pathology_presence_column(column: &str) -> Option<String> {
    column
        .strip_prefix(ASSERTED_PATHOLOGY_PREFIX)
        .map(|rest| format!("{}{}", HAS_PATHOLOGY_PREFIX, rest))
}

/// Presence flag of a pathology count cell: any positive count.
pub fn pathology_present(count: &Value) -> Value {
    Value::Bool(count.as_f64().map(|c| c > 0.0).unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::NaiveDate;

    use super::*;
    use crate::models::Enrichment;

    fn report(day: u32, age: i64, reporters: &str) -> ReportRecord {
        let mut fields = BTreeMap::new();
        fields.insert(
            columns::EXAM_DATE.to_string(),
            Value::Date(
                NaiveDate::from_ymd_opt(2021, 6, day)
                    .unwrap()
                    .and_hms_opt(23, 59, 0)
                    .unwrap(),
            ),
        );
        fields.insert(columns::AGE.to_string(), Value::Int(age));
        fields.insert(columns::REPORTING_CLINICIANS.to_string(), Value::from(reporters));
        ReportRecord::from_fields(fields)
    }

    #[test]
    fn test_prepare_workload() {
        let reports = vec![report(1, 34, "A\nB"), report(2, 101, "C"), ReportRecord::default()];
        let columns: Vec<String> = Vec::new();
        let subset = ReportSubset::new(&columns, reports.iter().collect());
        let rows = prepare_workload(&subset);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2021, 6, 1).unwrap());
        assert_eq!(rows[0].age_bucket.as_deref(), Some("30-39"));
        assert_eq!(rows[0].secondary_reporter.as_deref(), Some("B"));
        assert_eq!(rows[1].age_bucket, None);
        assert_eq!(
            date_range(&rows),
            Some((
                NaiveDate::from_ymd_opt(2021, 6, 1).unwrap(),
                NaiveDate::from_ymd_opt(2021, 6, 2).unwrap()
            ))
        );
    }

    #[test]
    fn test_epoch_seconds() {
        let dt = NaiveDate::from_ymd_opt(1970, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 1)
            .unwrap();
        assert_eq!(epoch_seconds(dt), 86_401);
        assert_eq!(from_epoch_seconds(86_401), Some(dt));
    }

    #[test]
    fn test_pathology_presence() {
        assert_eq!(
            pathology_presence_column("asserted-pathology-cerebrovascular").as_deref(),
            Some("has-cerebrovascular")
        );
        assert_eq!(pathology_presence_column("Age"), None);
        assert_eq!(pathology_present(&Value::Int(2)), Value::Bool(true));
        assert_eq!(pathology_present(&Value::Int(0)), Value::Bool(false));
        assert_eq!(pathology_present(&Value::Null), Value::Bool(false));
    }

    #[test]
    fn test_domain_columns_canonical_order() {
        let mut a = ReportRecord::default();
        a.enrichment = Some(Enrichment {
            domain_flags: [("Traumatic".to_string(), false), ("Epilepsy".to_string(), true)]
                .into_iter()
                .collect(),
            ..Default::default()
        });
        let domains = domain_columns([&a]);
        assert_eq!(domains, vec!["Epilepsy", "Traumatic"]);
    }
}
