//! Report enrichment: narrative cleaning and model-derived columns.

mod cleaner;
mod contrast;
mod engine;

pub use cleaner::*;
pub use contrast::*;
pub use engine::*;

use std::fmt;
use std::str::FromStr;

use neurodash_nlp::NlpError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{columns, ReportSet};

/// Enrichment errors.
#[derive(Error, Debug)]
pub enum EnrichError {
    #[error("Missing input columns for inference: {0:?}")]
    MissingColumns(Vec<String>),

    #[error("Unknown inferred field: {0}")]
    UnknownField(String),

    #[error("Model error: {0}")]
    Model(#[from] NlpError),

    #[error("{stage} returned {got} results for {expected} narratives")]
    LengthMismatch {
        stage: &'static str,
        expected: usize,
        got: usize,
    },
}

pub type EnrichResult<T> = Result<T, EnrichError>;

/// A column the inference engine can derive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferredField {
    UsesContrast,
    NormalityClass,
    IsComparative,
    ReportLengthWords,
    Sections,
    PathologicalDomains,
}

impl InferredField {
    pub const ALL: [InferredField; 6] = [
        InferredField::UsesContrast,
        InferredField::NormalityClass,
        InferredField::IsComparative,
        InferredField::ReportLengthWords,
        InferredField::Sections,
        InferredField::PathologicalDomains,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            InferredField::UsesContrast => columns::USES_CONTRAST,
            InferredField::NormalityClass => columns::NORMALITY_CLASS,
            InferredField::IsComparative => columns::IS_COMPARATIVE,
            InferredField::ReportLengthWords => columns::REPORT_LENGTH_WORDS,
            InferredField::Sections => columns::SECTIONS,
            InferredField::PathologicalDomains => columns::PATHOLOGICAL_DOMAINS,
        }
    }

    /// Source columns this field is computed from.
    pub fn input_columns(&self) -> &'static [&'static str] {
        match self {
            InferredField::UsesContrast => &[columns::PROCEDURE, columns::NARRATIVE],
            _ => &[columns::NARRATIVE],
        }
    }

    /// Parse the inferred column names of a data format.
    pub fn parse_all<S: AsRef<str>>(names: &[S]) -> EnrichResult<Vec<InferredField>> {
        names.iter().map(|n| n.as_ref().parse()).collect()
    }
}

/// Fields some record of the set still lacks, in inference order.
pub fn missing_fields(reports: &ReportSet) -> Vec<InferredField> {
    InferredField::ALL
        .into_iter()
        .filter(|field| {
            reports.records.iter().any(|r| {
                r.enrichment
                    .as_ref()
                    .and_then(|e| e.get(field.column()))
                    .is_none()
            })
        })
        .collect()
}

impl FromStr for InferredField {
    type Err = EnrichError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InferredField::ALL
            .into_iter()
            .find(|f| f.column() == s)
            .ok_or_else(|| EnrichError::UnknownField(s.to_string()))
    }
}

impl fmt::Display for InferredField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inferred_fields() {
        let fields = InferredField::parse_all(&["uses_contrast", "pathological_domains"]).unwrap();
        assert_eq!(
            fields,
            vec![InferredField::UsesContrast, InferredField::PathologicalDomains]
        );
        assert!(matches!(
            InferredField::parse_all(&["colour"]),
            Err(EnrichError::UnknownField(_))
        ));
    }

    #[test]
    fn test_input_columns() {
        assert_eq!(
            InferredField::UsesContrast.input_columns(),
            &[columns::PROCEDURE, columns::NARRATIVE]
        );
        assert_eq!(InferredField::Sections.input_columns(), &[columns::NARRATIVE]);
    }

    #[test]
    fn test_missing_fields() {
        use std::collections::BTreeMap;

        use crate::models::{Enrichment, ReportRecord, Value};

        let mut fields = BTreeMap::new();
        fields.insert(columns::USES_CONTRAST.to_string(), Value::Bool(true));
        fields.insert("Epilepsy".to_string(), Value::Bool(false));
        let partial = ReportRecord::from_fields(fields);
        assert!(partial.enrichment.is_some());

        let reports = ReportSet::new(vec![columns::NARRATIVE.to_string()], vec![partial.clone()]);
        assert!(!reports.is_enriched());
        assert_eq!(
            missing_fields(&reports),
            vec![
                InferredField::NormalityClass,
                InferredField::IsComparative,
                InferredField::ReportLengthWords,
                InferredField::Sections,
                InferredField::PathologicalDomains,
            ]
        );

        let complete = partial.with_enrichment(Enrichment {
            uses_contrast: Some(true),
            normality_class: Some("normal".into()),
            is_comparative: Some(false),
            report_length_words: Some(3),
            sections: Some(Vec::new()),
            pathological_domains: Some(Vec::new()),
            ..Default::default()
        });
        let reports = ReportSet::new(vec![columns::NARRATIVE.to_string()], vec![complete]);
        assert!(reports.is_enriched());
        assert!(missing_fields(&reports).is_empty());
    }
}
