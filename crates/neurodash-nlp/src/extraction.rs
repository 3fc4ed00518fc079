//! Model output types and decision helpers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// NLP errors.
#[derive(Error, Debug)]
pub enum NlpError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid model output: {0}")]
    InvalidFormat(String),

    #[error("Model inference error: {0}")]
    Inference(String),

    #[error("Model load error: {0}")]
    Load(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type NlpResult<T> = Result<T, NlpError>;

/// Per-document category scores, as produced by a text classifier.
pub type CategoryScores = BTreeMap<String, f64>;

/// Category name the comparative classifier scores.
pub const IS_COMPARATIVE: &str = "IS_COMPARATIVE";

/// An entity span found in a narrative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Surface text of the span
    pub text: String,
    /// Entity label (PATHOLOGY, DESCRIPTOR, LOCATION)
    pub label: String,
    /// Byte offset of the span start
    pub start: usize,
    /// Byte offset of the span end (exclusive)
    pub end: usize,
    /// Whether the narrative denies this entity
    #[serde(default)]
    pub is_negated: bool,
    /// Text of locations this entity is linked to
    #[serde(default)]
    pub related_locations: Vec<String>,
}

impl Entity {
    /// Label used when highlighting the span: `<LABEL>-ASSERTED` or `<LABEL>-DENIED`.
    pub fn assertion_label(&self) -> String {
        let status = if self.is_negated { "DENIED" } else { "ASSERTED" };
        format!("{}-{}", self.label, status)
    }

    /// Pathology and descriptor entities carry clinical meaning; locations only qualify them.
    pub fn is_clinical(&self) -> bool {
        self.label == "PATHOLOGY" || self.label == "DESCRIPTOR"
    }
}

/// A labelled section of a narrative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub label: String,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// One processed document as emitted by an external model server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDoc {
    #[serde(default)]
    pub cats: CategoryScores,
    #[serde(default)]
    pub ents: Vec<Entity>,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default)]
    pub n_tokens: Option<usize>,
}

/// Parse a model-server JSON document.
///
/// Servers sometimes wrap the object in log lines, so parsing starts at the
/// first `{` and ends at the last `}`.
pub fn parse_model_output(json: &str) -> NlpResult<ModelDoc> {
    let json_start = json
        .find('{')
        .ok_or_else(|| NlpError::InvalidFormat("No JSON object found in response".into()))?;
    let json_end = json
        .rfind('}')
        .ok_or_else(|| NlpError::InvalidFormat("No closing brace found in response".into()))?;

    if json_end < json_start {
        return Err(NlpError::InvalidFormat("Closing brace before opening brace".into()));
    }

    let doc: ModelDoc = serde_json::from_str(&json[json_start..=json_end])?;
    Ok(doc)
}

/// The highest-scoring category.
pub fn normality_class(cats: &CategoryScores) -> NlpResult<String> {
    cats.iter()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(label, _)| label.clone())
        .ok_or_else(|| NlpError::InvalidFormat("Classifier returned no categories".into()))
}

/// Whether the comparative classifier reads the report as comparing to prior imaging.
pub fn is_comparative(cats: &CategoryScores) -> NlpResult<bool> {
    cats.get(IS_COMPARATIVE)
        .map(|score| *score > 0.5)
        .ok_or_else(|| NlpError::InvalidFormat(format!("Missing {} category", IS_COMPARATIVE)))
}

/// Human-readable name for the normal-report subclasses.
pub fn display_normality_label(label: &str) -> String {
    match label {
        "DEFACTO" => "NORMAL AS NO ASSERTION".to_string(),
        "STOCK" => "NORMAL USING STOCK PHRASE".to_string(),
        "INCIDENTAL" => "NORMAL WITH INCIDENTALS".to_string(),
        "CONTEXTUAL" => "NORMAL ACCORDING TO CONTEXT".to_string(),
        other => other.to_string(),
    }
}
