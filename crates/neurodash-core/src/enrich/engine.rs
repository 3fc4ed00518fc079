//! Inference engine: applies the model suite to a report set.

use neurodash_nlp::{
    is_comparative, normality_class, Entity, ModelLoader, ModelPaths, ModelSuite, NlpResult,
};
use tracing::{debug, info};

use super::contrast::uses_contrast;
use super::{EnrichError, EnrichResult, InferredField};
use crate::config::InferenceOptions;
use crate::models::{columns, Enrichment, ReportSet};

/// Wraps the injected model suite and derives enrichment columns.
pub struct InferenceEngine {
    suite: ModelSuite,
}

impl InferenceEngine {
    pub fn new(suite: ModelSuite) -> Self {
        Self { suite }
    }

    /// Load the suite from artifact paths.
    pub fn load(loader: &dyn ModelLoader, paths: &ModelPaths) -> EnrichResult<Self> {
        Ok(Self::new(loader.load(paths)?))
    }

    pub fn suite(&self) -> &ModelSuite {
        &self.suite
    }

    /// Enrich every record with the requested fields.
    ///
    /// Returns a new report set; the input is untouched. Missing input
    /// columns fail before any model is called, and any model error aborts
    /// the whole pass.
    pub fn infer(
        &self,
        reports: &ReportSet,
        fields: &[InferredField],
        options: &InferenceOptions,
    ) -> EnrichResult<ReportSet> {
        check_inputs(reports, fields)?;

        let texts: Vec<&str> = reports.records.iter().map(|r| r.narrative()).collect();
        let mut enrichments: Vec<Enrichment> = reports
            .records
            .iter()
            .map(|r| r.enrichment.clone().unwrap_or_default())
            .collect();
        let batch = Batcher::new(&texts, options);

        for field in fields {
            info!(field = %field, n_reports = texts.len(), "inferring");
            match field {
                InferredField::UsesContrast => {
                    for (e, r) in enrichments.iter_mut().zip(&reports.records) {
                        let procedure = r.text(columns::PROCEDURE).unwrap_or("");
                        e.uses_contrast = Some(uses_contrast(procedure, r.narrative()));
                    }
                }
                InferredField::NormalityClass => {
                    let scores = batch.run("normality_class", |chunk, n| {
                        self.suite.normality.classify_batch(chunk, n)
                    })?;
                    for (e, cats) in enrichments.iter_mut().zip(scores) {
                        e.normality_class = Some(normality_class(&cats)?);
                    }
                }
                InferredField::IsComparative => {
                    let scores = batch.run("is_comparative", |chunk, n| {
                        self.suite.comparative.classify_batch(chunk, n)
                    })?;
                    for (e, cats) in enrichments.iter_mut().zip(scores) {
                        e.is_comparative = Some(is_comparative(&cats)?);
                    }
                }
                InferredField::ReportLengthWords => {
                    let counts = batch.run("report_length_words", |chunk, n| {
                        self.suite.info.token_count_batch(chunk, n)
                    })?;
                    for (e, count) in enrichments.iter_mut().zip(counts) {
                        e.report_length_words = Some(count as i64);
                    }
                }
                InferredField::Sections => {
                    let sections = batch.run("sections", |chunk, n| {
                        self.suite.sectioner.sections_batch(chunk, n)
                    })?;
                    for (e, s) in enrichments.iter_mut().zip(sections) {
                        e.sections = Some(s);
                    }
                }
                InferredField::PathologicalDomains => {
                    let domains = batch.run("pathological_domains", |chunk, n| {
                        self.suite.domains.extract_domains_batch(chunk, n)
                    })?;
                    let observed = observed_domains(&domains);
                    debug!(n_domains = observed.len(), "expanding domain membership");
                    for (e, found) in enrichments.iter_mut().zip(domains) {
                        e.domain_flags = observed
                            .iter()
                            .map(|d| (d.clone(), found.contains(d)))
                            .collect();
                        e.pathological_domains = Some(found);
                    }
                }
            }
        }

        let records = reports
            .records
            .iter()
            .zip(enrichments)
            .map(|(r, e)| r.with_enrichment(e))
            .collect();
        Ok(ReportSet::new(reports.columns.clone(), records))
    }

    /// Entities of a single narrative, for the clinical view.
    pub fn analyse(&self, narrative: &str) -> EnrichResult<Vec<Entity>> {
        Ok(self.suite.info.extract_entities(narrative)?)
    }
}

fn check_inputs(reports: &ReportSet, fields: &[InferredField]) -> EnrichResult<()> {
    let mut missing: Vec<String> = Vec::new();
    for field in fields {
        for column in field.input_columns() {
            if !reports.has_column(column) && !missing.iter().any(|m| m == column) {
                missing.push(column.to_string());
            }
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(EnrichError::MissingColumns(missing))
    }
}

/// Domains in first-seen order across the batch.
fn observed_domains(domains: &[Vec<String>]) -> Vec<String> {
    let mut observed: Vec<String> = Vec::new();
    for d in domains.iter().flatten() {
        if !observed.contains(d) {
            observed.push(d.clone());
        }
    }
    observed
}

/// Splits the narratives into model batches.
struct Batcher<'a> {
    texts: &'a [&'a str],
    batch_size: usize,
    n_processes: usize,
}

impl<'a> Batcher<'a> {
    fn new(texts: &'a [&'a str], options: &InferenceOptions) -> Self {
        Self {
            texts,
            batch_size: options.batch_size.max(1),
            n_processes: options.n_processes.max(1),
        }
    }

    fn run<T, F>(&self, stage: &'static str, f: F) -> EnrichResult<Vec<T>>
    where
        F: Fn(&[&str], usize) -> NlpResult<Vec<T>>,
    {
        let mut out = Vec::with_capacity(self.texts.len());
        for chunk in self.texts.chunks(self.batch_size) {
            let results = f(chunk, self.n_processes)?;
            if results.len() != chunk.len() {
                return Err(EnrichError::LengthMismatch {
                    stage,
                    expected: chunk.len(),
                    got: results.len(),
                });
            }
            out.extend(results);
        }
        Ok(out)
    }
}
