use crate::io::error::GeoIoError;
use crate::join::error::JoinError;
use crate::pipeline::orchestrator::PipelineState;
use crate::schema::error::SchemaError;
use crate::sources::error::SourceError;
use crate::standardize::error::StandardizeError;
use crate::types::field::FieldSetError;
use polars::error::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Failed to standardize the '{table}' table")]
    Standardize {
        table: String,
        #[source]
        source: StandardizeError,
    },

    #[error(transparent)]
    FieldSet(#[from] FieldSetError),

    #[error("Source '{source_name}' failed")]
    Source {
        source_name: String,
        #[source]
        source: SourceError,
    },

    #[error("Required source '{source_name}' failed")]
    RequiredSourceFailed {
        source_name: String,
        #[source]
        source: SourceError,
    },

    #[error(transparent)]
    Join(#[from] JoinError),

    #[error(transparent)]
    GeoIo(#[from] GeoIoError),

    #[error("Invalid configuration")]
    Config(#[from] Box<figment::Error>),

    #[error("Pipeline already ran and is {0}; call reset() before running again")]
    AlreadyRan(PipelineState),

    #[error("Failed processing DataFrame: {0}")]
    DataFrameProcessing(#[from] PolarsError),
}

impl PipelineError {
    pub(crate) fn standardize(table: &str, source: StandardizeError) -> Self {
        PipelineError::Standardize {
            table: table.to_string(),
            source,
        }
    }
}
