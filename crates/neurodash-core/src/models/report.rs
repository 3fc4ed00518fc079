//! Report records, the session-owned report set, and filtered views over it.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use neurodash_nlp::{is_pathological_domain, Section};
use serde::Serialize;

use super::value::{parse_bool, parse_list, Value};

/// Column names of the RIS export and of the enrichment fields.
pub mod columns {
    pub const MRN: &str = "MRN";
    pub const NAME: &str = "Name";
    pub const EXAM_DATE: &str = "End Exam Date";
    pub const NARRATIVE: &str = "Narrative";
    pub const PROCEDURE: &str = "Procedure";
    pub const REQUESTING_CLINICIAN: &str = "Requesting Clinician";
    pub const ORDERING_DEPT: &str = "Ordering Dept";
    pub const DEPT_SPECIALTY: &str = "Dept Specialty";
    pub const REPORTING_CLINICIANS: &str = "Reporting Clinicians";
    pub const QUALITY_PRIORITY: &str = "Quality Priority";
    pub const PATIENT_CLASS: &str = "Base Pt Class";
    pub const SEX: &str = "Sex";
    pub const AGE: &str = "Age";

    pub const USES_CONTRAST: &str = "uses_contrast";
    pub const NORMALITY_CLASS: &str = "normality_class";
    pub const IS_COMPARATIVE: &str = "is_comparative";
    pub const REPORT_LENGTH_WORDS: &str = "report_length_words";
    pub const SECTIONS: &str = "sections";
    pub const PATHOLOGICAL_DOMAINS: &str = "pathological_domains";
}

/// Whether a column is produced by enrichment rather than read from source.
pub fn is_enrichment_column(name: &str) -> bool {
    matches!(
        name,
        columns::USES_CONTRAST
            | columns::NORMALITY_CLASS
            | columns::IS_COMPARATIVE
            | columns::REPORT_LENGTH_WORDS
            | columns::SECTIONS
            | columns::PATHOLOGICAL_DOMAINS
    ) || is_pathological_domain(name)
}

/// Model-derived attributes of one report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Enrichment {
    pub uses_contrast: Option<bool>,
    pub normality_class: Option<String>,
    pub is_comparative: Option<bool>,
    pub report_length_words: Option<i64>,
    pub sections: Option<Vec<Section>>,
    pub pathological_domains: Option<Vec<String>>,
    /// One-hot membership per domain observed in the enrichment batch
    pub domain_flags: BTreeMap<String, bool>,
}

impl Enrichment {
    /// Column names this enrichment populates, in export order.
    pub fn columns(&self) -> Vec<String> {
        let mut cols = Vec::new();
        if self.uses_contrast.is_some() {
            cols.push(columns::USES_CONTRAST.to_string());
        }
        if self.normality_class.is_some() {
            cols.push(columns::NORMALITY_CLASS.to_string());
        }
        if self.is_comparative.is_some() {
            cols.push(columns::IS_COMPARATIVE.to_string());
        }
        if self.report_length_words.is_some() {
            cols.push(columns::REPORT_LENGTH_WORDS.to_string());
        }
        if self.sections.is_some() {
            cols.push(columns::SECTIONS.to_string());
        }
        if self.pathological_domains.is_some() {
            cols.push(columns::PATHOLOGICAL_DOMAINS.to_string());
        }
        cols.extend(self.domain_flags.keys().cloned());
        cols
    }

    /// Whether every inferred field is populated.
    pub fn is_complete(&self) -> bool {
        self.uses_contrast.is_some()
            && self.normality_class.is_some()
            && self.is_comparative.is_some()
            && self.report_length_words.is_some()
            && self.sections.is_some()
            && self.pathological_domains.is_some()
    }

    /// Value of an enrichment column, if this enrichment carries it.
    pub fn get(&self, column: &str) -> Option<Value> {
        match column {
            columns::USES_CONTRAST => self.uses_contrast.map(Value::Bool),
            columns::NORMALITY_CLASS => self.normality_class.clone().map(Value::Text),
            columns::IS_COMPARATIVE => self.is_comparative.map(Value::Bool),
            columns::REPORT_LENGTH_WORDS => self.report_length_words.map(Value::Int),
            columns::SECTIONS => self
                .sections
                .as_ref()
                .and_then(|s| serde_json::to_string(s).ok())
                .map(Value::Text),
            columns::PATHOLOGICAL_DOMAINS => self.pathological_domains.clone().map(Value::List),
            other => self.domain_flags.get(other).map(|flag| Value::Bool(*flag)),
        }
    }

    /// Rebuild an enrichment from exported columns. Returns `None` when none
    /// of the enrichment columns are present.
    fn lift(fields: &mut BTreeMap<String, Value>) -> Option<Self> {
        let mut enrichment = Enrichment::default();
        let mut found = false;

        if let Some(v) = fields.remove(columns::USES_CONTRAST) {
            enrichment.uses_contrast = value_as_bool(&v);
            found = true;
        }
        if let Some(v) = fields.remove(columns::NORMALITY_CLASS) {
            enrichment.normality_class = v.label();
            found = true;
        }
        if let Some(v) = fields.remove(columns::IS_COMPARATIVE) {
            enrichment.is_comparative = value_as_bool(&v);
            found = true;
        }
        if let Some(v) = fields.remove(columns::REPORT_LENGTH_WORDS) {
            enrichment.report_length_words = v.as_f64().map(|n| n as i64);
            found = true;
        }
        if let Some(v) = fields.remove(columns::SECTIONS) {
            enrichment.sections = v.as_str().and_then(|s| serde_json::from_str(s).ok());
            found = true;
        }
        if let Some(v) = fields.remove(columns::PATHOLOGICAL_DOMAINS) {
            enrichment.pathological_domains = Some(match v {
                Value::List(items) => items,
                Value::Text(s) => parse_list(&s),
                _ => Vec::new(),
            });
            found = true;
        }

        let flag_columns: Vec<String> = fields
            .keys()
            .filter(|k| is_pathological_domain(k))
            .cloned()
            .collect();
        for column in flag_columns {
            if let Some(v) = fields.remove(&column) {
                enrichment
                    .domain_flags
                    .insert(column, value_as_bool(&v).unwrap_or(false));
                found = true;
            }
        }

        found.then_some(enrichment)
    }
}

fn value_as_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Text(s) => parse_bool(s),
        other => other.as_bool(),
    }
}

/// One radiology report: source columns plus, once inferred, its enrichment.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportRecord {
    /// Source columns keyed by column name
    pub fields: BTreeMap<String, Value>,
    /// Model-derived attributes (absent until inference has run)
    pub enrichment: Option<Enrichment>,
}

impl ReportRecord {
    /// Create a record from loaded columns, lifting any previously exported
    /// enrichment columns back into the enrichment set.
    pub fn from_fields(mut fields: BTreeMap<String, Value>) -> Self {
        let enrichment = Enrichment::lift(&mut fields);
        Self { fields, enrichment }
    }

    /// Value of a column, enrichment columns taking precedence.
    pub fn get(&self, column: &str) -> Value {
        self.enrichment
            .as_ref()
            .and_then(|e| e.get(column))
            .or_else(|| self.fields.get(column).cloned())
            .unwrap_or(Value::Null)
    }

    /// Borrowed source column.
    pub fn field(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }

    /// Text of a source column, if it is non-empty text.
    pub fn text(&self, column: &str) -> Option<&str> {
        self.fields
            .get(column)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Patient identifier as displayed.
    pub fn patient_id(&self) -> Option<String> {
        self.fields.get(columns::MRN).and_then(Value::label)
    }

    pub fn exam_date(&self) -> Option<NaiveDateTime> {
        self.fields.get(columns::EXAM_DATE).and_then(Value::as_date)
    }

    /// Calendar day of the exam, time of day dropped.
    pub fn exam_day(&self) -> Option<NaiveDate> {
        self.exam_date().map(|d| d.date())
    }

    pub fn narrative(&self) -> &str {
        self.text(columns::NARRATIVE).unwrap_or("")
    }

    pub fn age(&self) -> Option<f64> {
        self.fields.get(columns::AGE).and_then(Value::as_f64)
    }

    pub fn uses_contrast(&self) -> Option<bool> {
        self.enrichment.as_ref().and_then(|e| e.uses_contrast)
    }

    pub fn pathological_domains(&self) -> &[String] {
        self.enrichment
            .as_ref()
            .and_then(|e| e.pathological_domains.as_deref())
            .unwrap_or(&[])
    }

    /// Membership flag for a domain; missing flags read as false.
    pub fn domain_flag(&self, domain: &str) -> bool {
        self.enrichment
            .as_ref()
            .and_then(|e| e.domain_flags.get(domain).copied())
            .unwrap_or(false)
    }

    /// Copy of this record carrying the given enrichment.
    pub fn with_enrichment(&self, enrichment: Enrichment) -> Self {
        Self {
            fields: self.fields.clone(),
            enrichment: Some(enrichment),
        }
    }
}

/// The report records of one upload batch, with source column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportSet {
    /// Source column names in file order
    pub columns: Vec<String>,
    pub records: Vec<ReportRecord>,
}

impl ReportSet {
    pub fn new(columns: Vec<String>, records: Vec<ReportRecord>) -> Self {
        Self { columns, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Whether every record carries every inferred field.
    pub fn is_enriched(&self) -> bool {
        !self.records.is_empty()
            && self
                .records
                .iter()
                .all(|r| r.enrichment.as_ref().is_some_and(Enrichment::is_complete))
    }

    /// Concatenate sets in order; column order follows first appearance.
    pub fn concat(sets: Vec<ReportSet>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let mut records = Vec::new();
        for set in sets {
            for column in set.columns {
                if !columns.contains(&column) {
                    columns.push(column);
                }
            }
            records.extend(set.records);
        }
        Self { columns, records }
    }

    /// A view over every record.
    pub fn view(&self) -> ReportSubset<'_> {
        ReportSubset {
            columns: &self.columns,
            rows: self.records.iter().collect(),
        }
    }

    /// Source columns followed by the enrichment columns present on any record.
    pub fn all_columns(&self) -> Vec<String> {
        self.view().all_columns()
    }
}

/// A filtered, non-owning view over a [`ReportSet`].
#[derive(Debug, Clone)]
pub struct ReportSubset<'a> {
    pub columns: &'a [String],
    pub rows: Vec<&'a ReportRecord>,
}

impl<'a> ReportSubset<'a> {
    pub fn new(columns: &'a [String], rows: Vec<&'a ReportRecord>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a ReportRecord> + '_ {
        self.rows.iter().copied()
    }

    /// Values of one column across the view.
    pub fn column(&self, column: &str) -> Vec<Value> {
        self.rows.iter().map(|r| r.get(column)).collect()
    }

    /// Source columns followed by enrichment columns in first-seen order.
    pub fn all_columns(&self) -> Vec<String> {
        let mut cols: Vec<String> = self.columns.to_vec();
        for row in &self.rows {
            if let Some(enrichment) = &row.enrichment {
                for c in enrichment.columns() {
                    if !cols.contains(&c) {
                        cols.push(c);
                    }
                }
            }
        }
        cols
    }

    /// Earliest and latest exam dates in the view.
    pub fn date_span(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let mut dates = self.rows.iter().filter_map(|r| r.exam_date());
        let first = dates.next()?;
        Some(dates.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_from_fields_without_enrichment() {
        let record = ReportRecord::from_fields(fields(&[
            (columns::MRN, Value::from("A1")),
            (columns::NARRATIVE, Value::from("Normal study.")),
        ]));
        assert!(record.enrichment.is_none());
        assert_eq!(record.patient_id().as_deref(), Some("A1"));
        assert_eq!(record.narrative(), "Normal study.");
    }

    #[test]
    fn test_from_fields_lifts_enrichment() {
        let record = ReportRecord::from_fields(fields(&[
            (columns::MRN, Value::Int(7)),
            (columns::USES_CONTRAST, Value::from("True")),
            (columns::PATHOLOGICAL_DOMAINS, Value::from("['Epilepsy']")),
            ("Epilepsy", Value::from("True")),
            ("Traumatic", Value::from("False")),
        ]));
        let enrichment = record.enrichment.as_ref().unwrap();
        assert_eq!(enrichment.uses_contrast, Some(true));
        assert_eq!(record.pathological_domains(), ["Epilepsy".to_string()]);
        assert!(record.domain_flag("Epilepsy"));
        assert!(!record.domain_flag("Traumatic"));
        assert!(!record.domain_flag("Headache"));
        assert!(!record.fields.contains_key("Epilepsy"));
        assert_eq!(record.patient_id().as_deref(), Some("7"));
    }

    #[test]
    fn test_get_prefers_enrichment() {
        let mut record = ReportRecord::default();
        record
            .fields
            .insert(columns::USES_CONTRAST.into(), Value::Bool(false));
        assert_eq!(record.get(columns::USES_CONTRAST), Value::Bool(false));

        let enriched = record.with_enrichment(Enrichment {
            uses_contrast: Some(true),
            ..Default::default()
        });
        assert_eq!(enriched.get(columns::USES_CONTRAST), Value::Bool(true));
        assert_eq!(enriched.get("missing"), Value::Null);
    }

    #[test]
    fn test_concat_keeps_order() {
        let a = ReportSet::new(vec!["a".into(), "b".into()], vec![ReportRecord::default()]);
        let b = ReportSet::new(
            vec!["b".into(), "c".into()],
            vec![ReportRecord::default(), ReportRecord::default()],
        );
        let all = ReportSet::concat(vec![a, b]);
        assert_eq!(all.columns, vec!["a", "b", "c"]);
        assert_eq!(all.len(), 3);
    }
}
