//! Capability traits for the external model suite.
//!
//! Every trait has a single-document method and a batch method. The batch
//! method receives the configured process count; implementations backed by a
//! real runtime forward it, the default implementation ignores it and maps
//! the single-document method.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::extraction::{CategoryScores, Entity, NlpResult, Section};

/// Document classifier returning per-category scores.
pub trait TextClassifier: Send + Sync {
    fn classify(&self, text: &str) -> NlpResult<CategoryScores>;

    fn classify_batch(&self, texts: &[&str], n_process: usize) -> NlpResult<Vec<CategoryScores>> {
        let _ = n_process;
        texts.iter().map(|t| self.classify(t)).collect()
    }

    /// Top-scoring label for a single document.
    fn label(&self, text: &str) -> NlpResult<String> {
        crate::extraction::normality_class(&self.classify(text)?)
    }
}

/// Span extractor with negation and location-relation attributes.
pub trait EntityExtractor: Send + Sync {
    fn extract_entities(&self, text: &str) -> NlpResult<Vec<Entity>>;

    /// Number of tokens the model's tokenizer produces for the text.
    fn token_count(&self, text: &str) -> NlpResult<usize>;

    fn extract_entities_batch(&self, texts: &[&str], n_process: usize) -> NlpResult<Vec<Vec<Entity>>> {
        let _ = n_process;
        texts.iter().map(|t| self.extract_entities(t)).collect()
    }

    fn token_count_batch(&self, texts: &[&str], n_process: usize) -> NlpResult<Vec<usize>> {
        let _ = n_process;
        texts.iter().map(|t| self.token_count(t)).collect()
    }
}

/// Pathology-domain tagger.
pub trait DomainDetector: Send + Sync {
    fn extract_domains(&self, text: &str) -> NlpResult<Vec<String>>;

    fn extract_domains_batch(&self, texts: &[&str], n_process: usize) -> NlpResult<Vec<Vec<String>>> {
        let _ = n_process;
        texts.iter().map(|t| self.extract_domains(t)).collect()
    }
}

/// Splits a narrative into labelled sections.
pub trait Sectioner: Send + Sync {
    fn sections(&self, text: &str) -> NlpResult<Vec<Section>>;

    fn sections_batch(&self, texts: &[&str], n_process: usize) -> NlpResult<Vec<Vec<Section>>> {
        let _ = n_process;
        texts.iter().map(|t| self.sections(t)).collect()
    }
}

/// The full set of models the enrichment pipeline calls into.
pub struct ModelSuite {
    /// Normal/abnormal report classifier
    pub normality: Box<dyn TextClassifier>,
    /// Comparison-to-prior-imaging classifier
    pub comparative: Box<dyn TextClassifier>,
    /// Information-extraction model (entities and tokenization)
    pub info: Box<dyn EntityExtractor>,
    /// Pathology domain detector
    pub domains: Box<dyn DomainDetector>,
    /// Section classifier
    pub sectioner: Box<dyn Sectioner>,
}

/// Locations of the model artifacts on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelPaths {
    pub normality_cls: PathBuf,
    pub comparative_cls: PathBuf,
    pub info_model: PathBuf,
    pub tokenizer: PathBuf,
    pub section_cls: PathBuf,
    pub domainer: PathBuf,
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self {
            normality_cls: "./models/normality_cls".into(),
            comparative_cls: "./models/comparative_cls".into(),
            info_model: "./models/info_model".into(),
            tokenizer: "./models/tokenizer".into(),
            section_cls: "./models/section_cls".into(),
            domainer: "./models/pathology_patterns.json".into(),
        }
    }
}

/// Builds a [`ModelSuite`] from artifact paths.
pub trait ModelLoader {
    fn load(&self, paths: &ModelPaths) -> NlpResult<ModelSuite>;
}
