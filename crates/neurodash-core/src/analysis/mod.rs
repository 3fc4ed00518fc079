//! Analyses over report subsets: operational summaries and plots, the
//! clinical report view, workload reports and the batch service analysis.

mod clinical;
mod plots;
mod service;
mod summary;
mod workload;

pub use clinical::*;
pub use plots::*;
pub use service::*;
pub use summary::*;
pub use workload::*;

use thiserror::Error;

use crate::config::ConfigError;
use crate::enrich::EnrichError;
use crate::export::ExportError;
use crate::ingest::IngestError;

/// Analysis errors.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("No reports to analyse: {0}")]
    Empty(String),

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Column {0} is not plottable")]
    NotPlottable(String),

    #[error("Missing column {0} in input data")]
    MissingColumn(String),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Inference error: {0}")]
    Enrich(#[from] EnrichError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;
