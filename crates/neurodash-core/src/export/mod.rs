//! Exports: CSV files, chart images and PDF report documents.

mod chart;
mod pdf;
mod tables;

pub use chart::*;
pub use pdf::*;
pub use tables::*;

use thiserror::Error;

/// Export errors.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Image {source_name} could not be read: {reason}")]
    Image { source_name: String, reason: String },

    #[error("Chart rendering failed: {0}")]
    Chart(String),

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ExportResult<T> = Result<T, ExportError>;
