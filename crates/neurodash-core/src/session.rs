//! Dashboard session: one user's uploaded reports and every view over them.
//!
//! The session owns the enriched report set, the injected inference engine,
//! decryptor and chart renderer, and the memo caches for the expensive
//! passes. All views take selection criteria and work on the subset they
//! select.

use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::analysis::{
    aggregate_reporters_report, clinical_view, contrast_usage_report, patient_ids,
    per_reporter_reports, restrict_dates, search_patient, AnalysisError, OperationalPlotter,
    OperationalSummary, PatientSearch, PlotOptions, ReportView,
};
use crate::cache::{InputKey, MemoCache};
use crate::config::{ConfigError, DataFormat, InferenceOptions, PlotView};
use crate::enrich::{missing_fields, EnrichError, InferenceEngine};
use crate::export::{
    generate, records_to_csv, table_to_csv, ChartRenderer, ExportError, Figure, ImageSource,
    RasterChartRenderer, ReportBundle, ReportDocument,
};
use crate::ingest::{check_file_encryption, decrypt_files, load_reports, Decryptor, IngestError, UploadedFile};
use crate::models::{ReportRecord, ReportSet, Table};
use crate::selection::{Selection, SelectionCriteria, SelectionError, SelectionFilter};
use crate::transform::prepare_workload;

/// Session errors.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No reports uploaded yet")]
    NotReady,

    #[error("Patient {0} has no report at position {1}")]
    NoSuchReport(String, usize),

    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Inference error: {0}")]
    Enrich(#[from] EnrichError),

    #[error("Selection error: {0}")]
    Selection(#[from] SelectionError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Outcome of an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadStatus {
    /// Some files are encrypted; call [`DashboardSession::unlock`]
    PasswordRequired { files: Vec<String> },
    Complete { n_reports: usize },
}

/// Workload PDFs for one selection.
#[derive(Debug, Clone)]
pub struct WorkloadDocuments {
    pub aggregate: ReportDocument,
    pub contrast: ReportDocument,
    /// Reporter name and report, busiest reporter first
    pub reporters: Vec<(String, ReportDocument)>,
}

pub struct DashboardSession {
    id: Uuid,
    format: DataFormat,
    filter: SelectionFilter,
    engine: InferenceEngine,
    options: InferenceOptions,
    decryptor: Option<Box<dyn Decryptor>>,
    renderer: Box<dyn ChartRenderer>,
    pending: Vec<UploadedFile>,
    reports: Option<Arc<ReportSet>>,
    enrichment_cache: MemoCache<Arc<ReportSet>>,
    aggregate_cache: MemoCache<ReportDocument>,
    contrast_cache: MemoCache<ReportDocument>,
}

impl DashboardSession {
    /// New session over a data format. Fails when the format lacks a
    /// selection-panel field.
    pub fn new(format: DataFormat, engine: InferenceEngine, options: InferenceOptions) -> SessionResult<Self> {
        let filter = SelectionFilter::new(&format)?;
        let id = Uuid::new_v4();
        info!(session = %id, "session started");
        Ok(Self {
            id,
            format,
            filter,
            engine,
            options,
            decryptor: None,
            renderer: Box::new(RasterChartRenderer::new()),
            pending: Vec::new(),
            reports: None,
            enrichment_cache: MemoCache::new("enrichment"),
            aggregate_cache: MemoCache::new("aggregate_report"),
            contrast_cache: MemoCache::new("contrast_report"),
        })
    }

    pub fn with_decryptor(mut self, decryptor: Box<dyn Decryptor>) -> Self {
        self.decryptor = Some(decryptor);
        self
    }

    pub fn with_renderer(mut self, renderer: Box<dyn ChartRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn format(&self) -> &DataFormat {
        &self.format
    }

    /// The enriched reports of the last complete upload.
    pub fn reports(&self) -> SessionResult<&Arc<ReportSet>> {
        self.reports.as_ref().ok_or(SessionError::NotReady)
    }

    // =========================================================================
    // Upload
    // =========================================================================

    /// Load, decrypt and enrich uploaded files.
    ///
    /// Encrypted files without a password park the upload until
    /// [`unlock`](Self::unlock). A failed upload leaves the previous reports
    /// in place.
    pub fn upload(&mut self, files: Vec<UploadedFile>, password: Option<&str>) -> SessionResult<UploadStatus> {
        let encrypted = check_file_encryption(&files)?;
        let files = match password {
            Some(password) => decrypt_files(files, &encrypted, password, self.decryptor.as_deref())?,
            None if encrypted.iter().any(|e| *e) => {
                let names = files
                    .iter()
                    .zip(&encrypted)
                    .filter(|(_, e)| **e)
                    .map(|(f, _)| f.name.clone())
                    .collect();
                info!(session = %self.id, "upload awaiting password");
                self.pending = files;
                return Ok(UploadStatus::PasswordRequired { files: names });
            }
            None => files,
        };
        self.pending.clear();

        let loaded = load_reports(&files, &self.format)?;
        let enriched = self.enrich(loaded)?;
        let n_reports = enriched.len();
        self.reports = Some(enriched);
        info!(session = %self.id, n_reports, "upload complete");
        Ok(UploadStatus::Complete { n_reports })
    }

    /// Retry a parked upload with a password.
    pub fn unlock(&mut self, password: &str) -> SessionResult<UploadStatus> {
        if self.pending.is_empty() {
            warn!(session = %self.id, "unlock without pending upload");
            return Err(SessionError::NotReady);
        }
        let files = self.pending.clone();
        self.upload(files, Some(password))
    }

    fn enrich(&mut self, loaded: ReportSet) -> SessionResult<Arc<ReportSet>> {
        let missing = missing_fields(&loaded);
        if missing.is_empty() {
            info!(n_reports = loaded.len(), "reports already enriched");
            return Ok(Arc::new(loaded));
        }
        let key = InputKey::builder("enrichment")
            .json(&loaded)?
            .json(&missing)?
            .json(&self.options)?
            .finish();
        let engine = &self.engine;
        let options = &self.options;
        let enriched = self.enrichment_cache.get_or_try_insert_with(key, || {
            engine.infer(&loaded, &missing, options).map(Arc::new)
        })?;
        Ok(enriched)
    }

    // =========================================================================
    // Selection
    // =========================================================================

    /// Option lists for the categorical widgets, then the domain widget
    /// under the pathological-domains column.
    pub fn selection_options(&self) -> SessionResult<Vec<(String, Vec<String>)>> {
        let reports = self.reports()?;
        let mut options = self.filter.options(reports);
        options.push((
            crate::models::columns::PATHOLOGICAL_DOMAINS.to_string(),
            self.filter.domain_options(reports),
        ));
        Ok(options)
    }

    /// Criteria that select every report.
    pub fn default_criteria(&self) -> SessionResult<SelectionCriteria> {
        Ok(SelectionCriteria::unconstrained(self.reports()?)?)
    }

    pub fn select(&self, criteria: &SelectionCriteria) -> SessionResult<Selection<'_>> {
        Ok(self.filter.apply(self.reports()?, criteria))
    }

    /// Selected reports as CSV, enrichment columns included.
    pub fn selection_csv(&self, criteria: &SelectionCriteria) -> SessionResult<Vec<u8>> {
        let selection = self.select(criteria)?;
        Ok(records_to_csv(&selection.subset)?)
    }

    // =========================================================================
    // Operational view
    // =========================================================================

    pub fn operational_summary(&self, criteria: &SelectionCriteria) -> SessionResult<OperationalSummary> {
        let selection = self.select(criteria)?;
        Ok(OperationalSummary::compute(&selection.subset, &self.format))
    }

    /// Categorical and continuous summaries as CSV.
    pub fn summary_csvs(&self, criteria: &SelectionCriteria) -> SessionResult<(Vec<u8>, Vec<u8>)> {
        let summary = self.operational_summary(criteria)?;
        Ok((table_to_csv(&summary.categorical)?, table_to_csv(&summary.continuous)?))
    }

    pub fn plot(
        &self,
        criteria: &SelectionCriteria,
        column: &str,
        view: PlotView,
        options: &PlotOptions,
    ) -> SessionResult<Figure> {
        let selection = self.select(criteria)?;
        Ok(OperationalPlotter::new(&self.format).plot(&selection.subset, column, view, options)?)
    }

    /// Operational analysis PDF with the chart of one column.
    pub fn operational_pdf(
        &self,
        criteria: &SelectionCriteria,
        column: &str,
        view: PlotView,
        options: &PlotOptions,
        today: NaiveDate,
    ) -> SessionResult<ReportDocument> {
        let selection = self.select(criteria)?;
        let summary = OperationalSummary::compute(&selection.subset, &self.format);
        let figure = OperationalPlotter::new(&self.format).plot(&selection.subset, column, view, options)?;
        let png = self.renderer.render(&figure)?;
        let bundle = ReportBundle::operational(
            today,
            &selection.criteria,
            &summary.categorical,
            &summary.continuous,
            ImageSource::bytes("operational_plot.png", png),
        );
        let document = generate(&bundle)?;
        info!(session = %self.id, column, bytes = document.len(), "operational report generated");
        Ok(document)
    }

    // =========================================================================
    // Clinical view
    // =========================================================================

    pub fn patient_ids(&self, criteria: &SelectionCriteria) -> SessionResult<Vec<String>> {
        let selection = self.select(criteria)?;
        Ok(patient_ids(&selection.subset))
    }

    /// Search table of a patient's reports; `None` when there are none.
    pub fn search_patient(&self, criteria: &SelectionCriteria, patient_id: &str) -> SessionResult<Option<Table>> {
        let selection = self.select(criteria)?;
        Ok(match search_patient(&selection.subset, patient_id) {
            PatientSearch::NoReports => None,
            PatientSearch::Found { table, .. } => Some(table),
        })
    }

    /// Clinical view of the `index`-th report of a patient.
    pub fn clinical_view(
        &self,
        criteria: &SelectionCriteria,
        patient_id: &str,
        index: usize,
    ) -> SessionResult<ReportView> {
        let selection = self.select(criteria)?;
        let record: &ReportRecord = match search_patient(&selection.subset, patient_id) {
            PatientSearch::Found { rows, .. } => rows
                .get(index)
                .copied()
                .ok_or_else(|| SessionError::NoSuchReport(patient_id.to_string(), index))?,
            PatientSearch::NoReports => {
                return Err(SessionError::NoSuchReport(patient_id.to_string(), index))
            }
        };
        Ok(clinical_view(record, &self.engine)?)
    }

    // =========================================================================
    // Workload view
    // =========================================================================

    /// Aggregate, contrast and per-reporter PDFs over the selected reports
    /// dated in `[start, end)`.
    pub fn workload_reports(
        &mut self,
        criteria: &SelectionCriteria,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        today: NaiveDate,
    ) -> SessionResult<WorkloadDocuments> {
        let reports = Arc::clone(self.reports()?);
        let selection = self.filter.apply(&reports, criteria);
        let rows = restrict_dates(&prepare_workload(&selection.subset), start, end);

        let records: Vec<&ReportRecord> = rows.iter().map(|r| r.report).collect();
        let key = |kind: &str| -> SessionResult<InputKey> {
            Ok(InputKey::builder(kind)
                .json(&records)?
                .text(&today.to_string())
                .finish())
        };
        let renderer = self.renderer.as_ref();

        let aggregate = self
            .aggregate_cache
            .get_or_try_insert_with(key("aggregate_report")?, || {
                aggregate_reporters_report(&rows)?.to_pdf(renderer, today)
            })?;
        let contrast = self
            .contrast_cache
            .get_or_try_insert_with(key("contrast_report")?, || {
                contrast_usage_report(&rows)?.to_pdf(renderer, today)
            })?;
        let reporters = per_reporter_reports(&rows)?
            .into_iter()
            .map(|report| Ok((report.target.clone(), report.to_pdf(renderer, today)?)))
            .collect::<SessionResult<Vec<_>>>()?;

        info!(session = %self.id, rows = rows.len(), reporters = reporters.len(), "workload reports generated");
        Ok(WorkloadDocuments {
            aggregate,
            contrast,
            reporters,
        })
    }
}
