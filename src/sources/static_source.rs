use crate::sources::adapter::{SkippedRecord, SourceAdapter, SourceBatch};
use crate::sources::error::SourceError;
use crate::sources::params::SourceParams;
use crate::types::field::FieldRecord;
use async_trait::async_trait;
use polars::prelude::DataFrame;

/// Serves an already materialized table, for callers that fetched or computed
/// attributes themselves.
#[derive(Debug, Clone)]
pub struct StaticSource {
    name: String,
    kind: String,
    frame: DataFrame,
    skipped: Vec<SkippedRecord>,
}

impl StaticSource {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, frame: DataFrame) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            frame,
            skipped: Vec::new(),
        }
    }

    pub fn with_skipped(mut self, skipped: Vec<SkippedRecord>) -> Self {
        self.skipped = skipped;
        self
    }
}

#[async_trait]
impl SourceAdapter for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    async fn fetch(
        &self,
        _fields: &[FieldRecord],
        _params: &SourceParams,
    ) -> Result<SourceBatch, SourceError> {
        Ok(SourceBatch::new(self.frame.clone()).with_skipped(self.skipped.clone()))
    }
}
