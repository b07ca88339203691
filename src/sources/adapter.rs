use crate::sources::error::SourceError;
use crate::sources::params::SourceParams;
use crate::types::field::FieldRecord;
use async_trait::async_trait;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

/// A field the adapter could not resolve, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRecord {
    pub field_id: String,
    pub reason: String,
}

impl SkippedRecord {
    pub fn new(field_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field_id: field_id.into(),
            reason: reason.into(),
        }
    }
}

/// Raw attribute table returned by an adapter. Column names and types are
/// whatever the source produces; the standardizer conforms them.
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub frame: DataFrame,
    pub skipped: Vec<SkippedRecord>,
}

impl SourceBatch {
    pub fn new(frame: DataFrame) -> Self {
        Self {
            frame,
            skipped: Vec::new(),
        }
    }

    pub fn with_skipped(mut self, skipped: Vec<SkippedRecord>) -> Self {
        self.skipped = skipped;
        self
    }
}

/// One attribute source: soil survey, weather service, crop layer, imagery
/// statistics or anything else keyed by `field_id`.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Unique name of this source within a pipeline. Prefixes its joined
    /// columns.
    fn name(&self) -> &str;

    /// Schema kind the returned table is standardized against.
    fn kind(&self) -> &str;

    /// Produces attribute records for `fields`.
    ///
    /// Unresolvable individual fields belong in [`SourceBatch::skipped`]. An
    /// unreachable backend is [`SourceError::SourceUnavailable`].
    async fn fetch(
        &self,
        fields: &[FieldRecord],
        params: &SourceParams,
    ) -> Result<SourceBatch, SourceError>;
}
