//! Error taxonomy for the segmentation pipeline

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SegmentationError {
    /// A transaction field could not be validated.
    #[error("Invalid data in {record}: field '{field}' {reason}")]
    InvalidData {
        record: String,
        field: &'static str,
        reason: String,
    },

    #[error("Insufficient data: {customers} customer(s) supplied, at least {required} required")]
    InsufficientData { customers: usize, required: usize },

    #[error("Degenerate input: all feature vectors are identical, clustering is meaningless")]
    DegenerateInput,

    #[error("Computation error in {context}: {reason}")]
    Computation { context: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV ingestion error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),
}

impl SegmentationError {
    pub(crate) fn invalid(record: impl Into<String>, field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidData {
            record: record.into(),
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn computation(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Computation {
            context: context.into(),
            reason: reason.into(),
        }
    }
}
