//! Clinical view: patient search, report metadata and entity highlights.

use std::collections::BTreeSet;

use neurodash_nlp::{display_normality_label, Entity};
use serde::Serialize;
use tracing::debug;

use super::AnalysisResult;
use crate::enrich::InferenceEngine;
use crate::models::{columns, ReportRecord, ReportSubset, Table, Value};

/// Columns shown in the patient search table.
pub const SEARCH_COLUMNS: [&str; 4] = [
    columns::MRN,
    columns::DEPT_SPECIALTY,
    columns::NAME,
    columns::EXAM_DATE,
];

/// Narratives this short are treated as absent.
pub const MIN_NARRATIVE_CHARS: usize = 5;

/// Highlight colour of asserted entities.
pub const ASSERTED_COLOUR: &str = "#5d99fd";

/// Highlight colour of denied entities.
pub const DENIED_COLOUR: &str = "#ff1515";

/// Sorted distinct patient ids of the view.
pub fn patient_ids(subset: &ReportSubset<'_>) -> Vec<String> {
    subset
        .iter()
        .filter_map(ReportRecord::patient_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Reports found for a patient.
#[derive(Debug, Clone)]
pub enum PatientSearch<'a> {
    /// The patient has no report in the view
    NoReports,
    Found {
        rows: Vec<&'a ReportRecord>,
        /// [`SEARCH_COLUMNS`] of each row, indexed by position in the view
        table: Table,
    },
}

/// Every report of one patient, in view order.
pub fn search_patient<'a>(subset: &ReportSubset<'a>, patient_id: &str) -> PatientSearch<'a> {
    let mut table = Table::new(SEARCH_COLUMNS);
    let mut rows = Vec::new();
    for (i, row) in subset.iter().enumerate() {
        if row.patient_id().as_deref() == Some(patient_id) {
            table.push_row(
                i.to_string(),
                SEARCH_COLUMNS.iter().map(|c| row.get(c)).collect(),
            );
            rows.push(row);
        }
    }
    debug!(patient_id, reports = rows.len(), "patient search");
    if rows.is_empty() {
        PatientSearch::NoReports
    } else {
        PatientSearch::Found { rows, table }
    }
}

/// A span to highlight in the narrative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Highlight {
    pub start: usize,
    pub end: usize,
    /// `<LABEL>-ASSERTED` or `<LABEL>-DENIED`
    pub label: String,
    pub colour: &'static str,
}

impl From<&Entity> for Highlight {
    fn from(entity: &Entity) -> Self {
        Self {
            start: entity.start,
            end: entity.end,
            label: entity.assertion_label(),
            colour: if entity.is_negated {
                DENIED_COLOUR
            } else {
                ASSERTED_COLOUR
            },
        }
    }
}

/// Everything the clinical view shows for one report.
#[derive(Debug, Clone, PartialEq)]
pub struct ClinicalView {
    /// One `value` column indexed by field label
    pub metadata: Table,
    /// `entity`, `location` of the asserted clinical entities
    pub asserted: Table,
    /// `entity`, `location` of the denied clinical entities
    pub denied: Table,
    pub narrative: String,
    pub highlights: Vec<Highlight>,
}

/// Outcome of opening a report in the clinical view.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportView {
    /// The narrative is missing or too short to analyse
    NoNarrative,
    Report(Box<ClinicalView>),
}

/// Field label and value of the metadata table.
fn report_metadata(record: &ReportRecord) -> Table {
    let text = |column: &str| record.get(column).to_string();
    let fields = [
        ("Name", text(columns::NAME)),
        ("Sex", text(columns::SEX)),
        ("Patient ID", text(columns::MRN)),
        ("Age", text(columns::AGE)),
        ("Procedure", text(columns::PROCEDURE)),
        ("With contrast?", text(columns::USES_CONTRAST)),
        (
            "Normality class",
            record
                .get(columns::NORMALITY_CLASS)
                .label()
                .map(|l| display_normality_label(&l))
                .unwrap_or_default(),
        ),
        ("Compared to previous imaging?", text(columns::IS_COMPARATIVE)),
        ("Requesting Clinician", text(columns::REQUESTING_CLINICIAN)),
        ("Reporting Clinicians", text(columns::REPORTING_CLINICIANS)),
        ("Pathological domains", record.pathological_domains().join(", ")),
    ];
    let mut table = Table::new(["value"]);
    for (label, value) in fields {
        table.push_row(label, vec![Value::Text(value)]);
    }
    table
}

fn entity_table<'e, I: IntoIterator<Item = &'e Entity>>(entities: I) -> Table {
    let mut table = Table::new(["entity", "location"]);
    for (i, entity) in entities.into_iter().enumerate() {
        table.push_row(
            i.to_string(),
            vec![
                Value::Text(entity.text.clone()),
                Value::Text(entity.related_locations.join(", ")),
            ],
        );
    }
    table
}

/// Build the clinical view of a report from the entities the engine finds
/// in its narrative.
pub fn clinical_view(record: &ReportRecord, engine: &InferenceEngine) -> AnalysisResult<ReportView> {
    let narrative = record.narrative();
    if narrative.chars().count() <= MIN_NARRATIVE_CHARS {
        return Ok(ReportView::NoNarrative);
    }
    let entities = engine.analyse(narrative)?;
    let (denied, asserted): (Vec<&Entity>, Vec<&Entity>) = entities
        .iter()
        .filter(|e| e.is_clinical())
        .partition(|e| e.is_negated);

    Ok(ReportView::Report(Box::new(ClinicalView {
        metadata: report_metadata(record),
        asserted: entity_table(asserted),
        denied: entity_table(denied),
        narrative: narrative.to_string(),
        highlights: entities.iter().map(Highlight::from).collect(),
    })))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use neurodash_nlp::{KeywordModelLoader, ModelPaths};

    use super::*;
    use crate::models::Enrichment;

    fn record(mrn: &str, narrative: &str) -> ReportRecord {
        let mut fields = BTreeMap::new();
        fields.insert(columns::MRN.to_string(), Value::from(mrn));
        fields.insert(columns::NAME.to_string(), Value::from("Jo Bloggs"));
        fields.insert(columns::AGE.to_string(), Value::Int(41));
        fields.insert(columns::NARRATIVE.to_string(), Value::from(narrative));
        ReportRecord::from_fields(fields).with_enrichment(Enrichment {
            uses_contrast: Some(false),
            normality_class: Some("STOCK".into()),
            pathological_domains: Some(vec!["Vascular".into(), "Neoplastic".into()]),
            ..Default::default()
        })
    }

    fn engine() -> InferenceEngine {
        InferenceEngine::load(&KeywordModelLoader, &ModelPaths::default()).unwrap()
    }

    #[test]
    fn test_patient_ids_sorted_unique() {
        let records = vec![record("B2", ""), record("A1", ""), record("B2", "")];
        let cols: Vec<String> = Vec::new();
        let subset = ReportSubset::new(&cols, records.iter().collect());
        assert_eq!(patient_ids(&subset), vec!["A1", "B2"]);

        match search_patient(&subset, "B2") {
            PatientSearch::Found { rows, table } => {
                assert_eq!(rows.len(), 2);
                assert_eq!(table.index, vec!["0", "2"]);
                assert_eq!(table.columns, SEARCH_COLUMNS.to_vec());
            }
            PatientSearch::NoReports => panic!("expected reports"),
        }
        assert!(matches!(search_patient(&subset, "Z9"), PatientSearch::NoReports));
    }

    #[test]
    fn test_short_narrative() {
        let view = clinical_view(&record("A1", "Nil."), &engine()).unwrap();
        assert_eq!(view, ReportView::NoNarrative);
    }

    #[test]
    fn test_clinical_view() {
        let narrative = "Acute infarct in the left frontal lobe. No haemorrhage.";
        let view = clinical_view(&record("A1", narrative), &engine()).unwrap();
        let ReportView::Report(view) = view else {
            panic!("expected a report view");
        };

        assert_eq!(view.metadata.columns, vec!["value"]);
        assert_eq!(view.metadata.cell("Patient ID", "value"), Some(&Value::from("A1")));
        assert_eq!(view.metadata.cell("With contrast?", "value"), Some(&Value::from("False")));
        assert_eq!(
            view.metadata.cell("Normality class", "value"),
            Some(&Value::from("NORMAL USING STOCK PHRASE"))
        );
        assert_eq!(
            view.metadata.cell("Pathological domains", "value"),
            Some(&Value::from("Vascular, Neoplastic"))
        );

        let asserted: Vec<&Value> = view.asserted.column("entity").unwrap();
        let infarct = asserted
            .iter()
            .position(|e| **e == Value::from("infarct"))
            .unwrap();
        assert_eq!(
            view.asserted.cell(&infarct.to_string(), "location"),
            Some(&Value::from("frontal lobe"))
        );
        let denied: Vec<&Value> = view.denied.column("entity").unwrap();
        assert_eq!(denied, vec![&Value::from("haemorrhage")]);

        let denied_highlight = view
            .highlights
            .iter()
            .find(|h| h.label == "PATHOLOGY-DENIED")
            .unwrap();
        assert_eq!(denied_highlight.colour, DENIED_COLOUR);
        assert!(view.highlights.iter().any(|h| h.label == "LOCATION-ASSERTED"));
    }
}
