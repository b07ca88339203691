use polars::error::PolarsError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Source '{name}' is unavailable: {reason}")]
    SourceUnavailable { name: String, reason: String },

    #[error("Invalid field reference (field_id {field_id:?}): {reason}")]
    InvalidFieldReference {
        field_id: Option<String>,
        reason: String,
    },

    #[error("Invalid value '{value}' for source parameter '{key}': {reason}")]
    InvalidParameter {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Source '{name}' did not respond within {after:?}")]
    Timeout { name: String, after: Duration },

    #[error("Failed to read CSV file '{0}'")]
    CsvRead(PathBuf, #[source] PolarsError),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("Failed processing DataFrame: {0}")]
    DataFrameProcessing(#[from] PolarsError),
}

impl SourceError {
    pub fn unavailable(name: &str, reason: impl Into<String>) -> Self {
        SourceError::SourceUnavailable {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Fatal errors abort the run even for optional sources: the field set
    /// itself is malformed, or the source is misconfigured.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SourceError::InvalidFieldReference { .. } | SourceError::InvalidParameter { .. }
        )
    }
}
