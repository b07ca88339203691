use crate::sources::adapter::{SourceAdapter, SourceBatch};
use crate::sources::error::SourceError;
use crate::sources::params::SourceParams;
use crate::types::field::FieldRecord;
use async_trait::async_trait;
use bon::bon;
use log::{info, warn};
use polars::prelude::*;
use std::path::{Path, PathBuf};
use tokio::{fs, task};

/// Reads an attribute table from a delimited text file with a header row.
///
/// Every column is read as text; typing is left to the standardizer so that
/// a bad value surfaces as a coercion error with its row. A missing file makes
/// the source unavailable rather than failing the run.
#[derive(Debug, Clone)]
pub struct CsvFileSource {
    name: String,
    kind: String,
    path: PathBuf,
    separator: u8,
}

#[bon]
impl CsvFileSource {
    #[builder]
    pub fn new(
        #[builder(into)] name: String,
        #[builder(into)] kind: String,
        #[builder(into)] path: PathBuf,
        #[builder(default = b',')] separator: u8,
    ) -> Self {
        Self {
            name,
            kind,
            path,
            separator,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<DataFrame, SourceError> {
        let path = self.path.clone();
        let separator = self.separator;
        task::spawn_blocking(move || {
            CsvReadOptions::default()
                .with_has_header(true)
                .with_infer_schema_length(Some(0))
                .with_parse_options(CsvParseOptions::default().with_separator(separator))
                .try_into_reader_with_file_path(Some(path.clone()))
                .map_err(|e| SourceError::CsvRead(path.clone(), e))?
                .finish()
                .map_err(|e| SourceError::CsvRead(path, e))
        })
        .await?
    }
}

#[async_trait]
impl SourceAdapter for CsvFileSource {
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
        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            warn!(
                "Attribute file for source '{}' not found at {:?}",
                self.name, self.path
            );
            return Err(SourceError::unavailable(
                &self.name,
                format!("file {} not found", self.path.display()),
            ));
        }

        let frame = self.read().await.map_err(|e| match e {
            SourceError::CsvRead(path, source) => {
                warn!("Could not parse {:?}: {}", path, source);
                SourceError::unavailable(&self.name, format!("unreadable CSV: {source}"))
            }
            other => other,
        })?;
        info!(
            "Read {} rows x {} columns for source '{}' from {:?}",
            frame.height(),
            frame.width(),
            self.name,
            self.path
        );
        Ok(SourceBatch::new(frame))
    }
}
