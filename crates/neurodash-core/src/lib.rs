//! neuroDash Core Library
//!
//! Enrichment, selection and analysis of radiology reports exported from a
//! RIS, for an operational dashboard.
//!
//! # Architecture
//!
//! ```text
//! CSV / XLSX upload ──(decrypt if password protected)──▶ Ingest
//!                                                          │
//!                                              typed ReportSet, cleaned narratives
//!                                                          │
//!                                           Inference Engine (model suite)
//!                                                          │
//!                                          [enriched ReportSet, memoised]
//!                                                          │
//!                                               Selection Filter
//!                                                          │
//!                 ┌────────────────────┬───────────────────┼────────────────────┐
//!                 │                    │                   │                    │
//!                 ▼                    ▼                   ▼                    ▼
//!            Operational           Clinical            Workload          Selection CSV
//!        summary + plots       report + entities    reporter/contrast
//!                 │                                        │
//!                 └──────────────▶ Report Generator ◀──────┘
//!                                     (PDF)
//! ```
//!
//! # Modules
//!
//! - [`ingest`]: file type detection, decryption, CSV/XLSX parsing into a [`ReportSet`]
//! - [`enrich`]: text cleaning and the inference engine over an injected model suite
//! - [`selection`]: selection criteria and the filter applying them
//! - [`transform`]: age buckets, category collapsing, reporter attribution, contrast series
//! - [`analysis`]: operational, clinical, workload and service analyses
//! - [`export`]: CSV, chart rendering and PDF generation
//! - [`session`]: one dashboard session over uploaded reports
//! - [`cache`]: memoisation keyed by input hash

pub mod analysis;
pub mod cache;
pub mod config;
pub mod enrich;
pub mod export;
pub mod ingest;
pub mod models;
pub mod selection;
pub mod session;
pub mod transform;

// Re-export commonly used types
pub use config::{DataFormat, InferenceOptions, PlotView, ServiceConfig};
pub use enrich::{InferenceEngine, InferredField, TextCleaner};
pub use export::{ChartRenderer, Figure, RasterChartRenderer, ReportDocument};
pub use ingest::{load_reports, OfficeDecryptor, UploadedFile};
pub use models::{ReportRecord, ReportSet, ReportSubset, Table, Value};
pub use selection::{Choice, SelectionCriteria, SelectionFilter};
pub use session::{DashboardSession, UploadStatus, WorkloadDocuments};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use neurodash_nlp::{KeywordModelLoader, ModelPaths};

use crate::analysis::{Interval, PlotOptions};
use crate::session::SessionError;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum NeuroDashError {
    #[error("Ingest error: {0}")]
    IngestError(String),

    #[error("Inference error: {0}")]
    InferenceError(String),

    #[error("Selection error: {0}")]
    SelectionError(String),

    #[error("Analysis error: {0}")]
    AnalysisError(String),

    #[error("Export error: {0}")]
    ExportError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Not ready: {0}")]
    NotReady(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<SessionError> for NeuroDashError {
    fn from(e: SessionError) -> Self {
        let message = e.to_string();
        match e {
            SessionError::NotReady => NeuroDashError::NotReady(message),
            SessionError::NoSuchReport(..) => NeuroDashError::InvalidInput(message),
            SessionError::Ingest(_) => NeuroDashError::IngestError(message),
            SessionError::Enrich(_) => NeuroDashError::InferenceError(message),
            SessionError::Selection(_) => NeuroDashError::SelectionError(message),
            SessionError::Analysis(_) => NeuroDashError::AnalysisError(message),
            SessionError::Export(_) => NeuroDashError::ExportError(message),
            SessionError::Config(_) => NeuroDashError::ConfigError(message),
            SessionError::Json(_) => NeuroDashError::SerializationError(message),
        }
    }
}

impl From<config::ConfigError> for NeuroDashError {
    fn from(e: config::ConfigError) -> Self {
        NeuroDashError::ConfigError(e.to_string())
    }
}

impl From<enrich::EnrichError> for NeuroDashError {
    fn from(e: enrich::EnrichError) -> Self {
        NeuroDashError::InferenceError(e.to_string())
    }
}

impl From<selection::SelectionError> for NeuroDashError {
    fn from(e: selection::SelectionError) -> Self {
        NeuroDashError::SelectionError(e.to_string())
    }
}

impl From<serde_json::Error> for NeuroDashError {
    fn from(e: serde_json::Error) -> Self {
        NeuroDashError::SerializationError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for NeuroDashError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        NeuroDashError::NotReady(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open a session over the built-in RIS data format.
#[uniffi::export]
pub fn new_session() -> Result<Arc<NeuroDashCore>, NeuroDashError> {
    NeuroDashCore::open(DataFormat::default_ris())
}

/// Open a session over a data format given as JSON.
#[uniffi::export]
pub fn new_session_with_format(format_json: String) -> Result<Arc<NeuroDashCore>, NeuroDashError> {
    NeuroDashCore::open(DataFormat::from_json(&format_json)?)
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe session wrapper for FFI.
#[derive(uniffi::Object)]
pub struct NeuroDashCore {
    session: Arc<Mutex<DashboardSession>>,
}

impl NeuroDashCore {
    fn open(format: DataFormat) -> Result<Arc<Self>, NeuroDashError> {
        let engine = InferenceEngine::load(&KeywordModelLoader, &ModelPaths::default())?;
        let session = DashboardSession::new(format, engine, InferenceOptions::default())?
            .with_decryptor(Box::new(OfficeDecryptor));
        Ok(Arc::new(Self {
            session: Arc::new(Mutex::new(session)),
        }))
    }
}

#[uniffi::export]
impl NeuroDashCore {
    pub fn session_id(&self) -> Result<String, NeuroDashError> {
        let session = self.session.lock()?;
        Ok(session.id().to_string())
    }

    // =========================================================================
    // Upload
    // =========================================================================

    /// Upload RIS exports. Encrypted files without a password return
    /// `PasswordRequired`; call `unlock` with the password.
    pub fn upload(
        &self,
        files: Vec<FfiUploadedFile>,
        password: Option<String>,
    ) -> Result<FfiUploadStatus, NeuroDashError> {
        let mut session = self.session.lock()?;
        let files = files.into_iter().map(Into::into).collect();
        Ok(session.upload(files, password.as_deref())?.into())
    }

    pub fn unlock(&self, password: String) -> Result<FfiUploadStatus, NeuroDashError> {
        let mut session = self.session.lock()?;
        Ok(session.unlock(&password)?.into())
    }

    // =========================================================================
    // Selection
    // =========================================================================

    /// Option lists of every selection widget.
    pub fn selection_options(&self) -> Result<Vec<FfiSelectOptions>, NeuroDashError> {
        let session = self.session.lock()?;
        Ok(session
            .selection_options()?
            .into_iter()
            .map(|(field, options)| FfiSelectOptions { field, options })
            .collect())
    }

    /// Criteria that select every report.
    pub fn default_criteria(&self) -> Result<FfiCriteria, NeuroDashError> {
        let session = self.session.lock()?;
        Ok(session.default_criteria()?.into())
    }

    pub fn selection_count(&self, criteria: FfiCriteria) -> Result<u64, NeuroDashError> {
        let criteria: SelectionCriteria = criteria.try_into()?;
        let session = self.session.lock()?;
        Ok(session.select(&criteria)?.subset.len() as u64)
    }

    /// Selected reports as CSV bytes.
    pub fn selection_csv(&self, criteria: FfiCriteria) -> Result<Vec<u8>, NeuroDashError> {
        let criteria: SelectionCriteria = criteria.try_into()?;
        let session = self.session.lock()?;
        Ok(session.selection_csv(&criteria)?)
    }

    // =========================================================================
    // Operational view
    // =========================================================================

    /// Display name and column of every plottable variable.
    pub fn plottable_variables(&self) -> Result<Vec<FfiSelectOptions>, NeuroDashError> {
        let session = self.session.lock()?;
        Ok(session
            .format()
            .plottable()
            .into_iter()
            .map(|(display, column)| FfiSelectOptions {
                field: display,
                options: vec![column],
            })
            .collect())
    }

    /// Operational analysis PDF charting one column.
    pub fn operational_pdf(
        &self,
        criteria: FfiCriteria,
        column: String,
        view: String,
        interval: Option<String>,
        today: String,
    ) -> Result<Vec<u8>, NeuroDashError> {
        let criteria: SelectionCriteria = criteria.try_into()?;
        let view = PlotView::parse(&view)
            .ok_or_else(|| NeuroDashError::InvalidInput(format!("unknown plot view {}", view)))?;
        let interval = match interval {
            Some(i) => Interval::parse(&i)
                .ok_or_else(|| NeuroDashError::InvalidInput(format!("unknown interval {}", i)))?,
            None => Interval::default(),
        };
        let options = PlotOptions {
            interval,
            ..PlotOptions::default()
        };
        let today = parse_date(&today)?;
        let session = self.session.lock()?;
        Ok(session
            .operational_pdf(&criteria, &column, view, &options, today)?
            .into_bytes())
    }

    // =========================================================================
    // Workload view
    // =========================================================================

    /// Aggregate, contrast and per-reporter PDFs for reports dated in
    /// `[start, end)`.
    pub fn workload_pdfs(
        &self,
        criteria: FfiCriteria,
        start: Option<String>,
        end: Option<String>,
        today: String,
    ) -> Result<FfiWorkloadReports, NeuroDashError> {
        let criteria: SelectionCriteria = criteria.try_into()?;
        let start = start.as_deref().map(parse_date).transpose()?;
        let end = end.as_deref().map(parse_date).transpose()?;
        let today = parse_date(&today)?;
        let mut session = self.session.lock()?;
        Ok(session.workload_reports(&criteria, start, end, today)?.into())
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, NeuroDashError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| NeuroDashError::InvalidInput(format!("date {:?}: {}", raw, e)))
}

// =========================================================================
// FFI Types
// =========================================================================

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiUploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl From<FfiUploadedFile> for UploadedFile {
    fn from(file: FfiUploadedFile) -> Self {
        UploadedFile::new(file.name, file.bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum FfiUploadStatus {
    PasswordRequired { files: Vec<String> },
    Complete { n_reports: u64 },
}

impl From<UploadStatus> for FfiUploadStatus {
    fn from(status: UploadStatus) -> Self {
        match status {
            UploadStatus::PasswordRequired { files } => FfiUploadStatus::PasswordRequired { files },
            UploadStatus::Complete { n_reports } => FfiUploadStatus::Complete {
                n_reports: n_reports as u64,
            },
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSelectOptions {
    pub field: String,
    pub options: Vec<String>,
}

/// Values chosen in one categorical widget; `all` or no values means
/// unconstrained.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiChoice {
    pub field: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiCriteria {
    pub categorical: Vec<FfiChoice>,
    pub min_age: i64,
    pub max_age: i64,
    /// ISO date, inclusive
    pub start_date: String,
    /// ISO date, inclusive
    pub end_date: String,
    /// Domains that must all be flagged; empty means any
    pub domains: Vec<String>,
}

fn ffi_choice(values: Vec<String>) -> Choice {
    if values.is_empty() {
        Choice::All
    } else {
        Choice::from_selected(values)
    }
}

fn choice_values(choice: &Choice) -> Vec<String> {
    match choice {
        Choice::All => Vec::new(),
        Choice::Only(values) => values.iter().cloned().collect(),
    }
}

impl TryFrom<FfiCriteria> for SelectionCriteria {
    type Error = NeuroDashError;

    fn try_from(ffi: FfiCriteria) -> Result<Self, Self::Error> {
        let base = SelectionCriteria {
            categorical: Vec::new(),
            age: (ffi.min_age, ffi.max_age),
            dates: (parse_date(&ffi.start_date)?, parse_date(&ffi.end_date)?),
            domains: ffi_choice(ffi.domains),
        };
        let criteria = base
            .with_age(ffi.min_age, ffi.max_age)?
            .with_dates(base.dates.0, base.dates.1)?;
        Ok(ffi
            .categorical
            .into_iter()
            .fold(criteria, |c, choice| c.with_choice(&choice.field, ffi_choice(choice.values))))
    }
}

impl From<SelectionCriteria> for FfiCriteria {
    fn from(criteria: SelectionCriteria) -> Self {
        Self {
            categorical: criteria
                .categorical
                .iter()
                .map(|(field, choice)| FfiChoice {
                    field: field.clone(),
                    values: choice_values(choice),
                })
                .collect(),
            min_age: criteria.age.0,
            max_age: criteria.age.1,
            start_date: criteria.dates.0.to_string(),
            end_date: criteria.dates.1.to_string(),
            domains: choice_values(&criteria.domains),
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiReporterReport {
    pub reporter: String,
    pub pdf: Vec<u8>,
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiWorkloadReports {
    pub aggregate: Vec<u8>,
    pub contrast: Vec<u8>,
    pub reporters: Vec<FfiReporterReport>,
}

impl From<WorkloadDocuments> for FfiWorkloadReports {
    fn from(docs: WorkloadDocuments) -> Self {
        Self {
            aggregate: docs.aggregate.into_bytes(),
            contrast: docs.contrast.into_bytes(),
            reporters: docs
                .reporters
                .into_iter()
                .map(|(reporter, pdf)| FfiReporterReport {
                    reporter,
                    pdf: pdf.into_bytes(),
                })
                .collect(),
        }
    }
}
