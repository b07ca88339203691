use crate::types::crs::ParseCrsError;
use crate::types::spatial_frame::RowCountMismatch;
use polars::error::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeoIoError {
    #[error("Failed to read '{0}'")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("Failed to write '{0}'")]
    Write(PathBuf, #[source] std::io::Error),

    #[error("Failed to move finished output into place at '{0}'")]
    Persist(PathBuf, #[source] tempfile::PersistError),

    #[error("Malformed GeoJSON")]
    Json(#[from] serde_json::Error),

    #[error("Expected a FeatureCollection, found '{0}'")]
    NotFeatureCollection(String),

    #[error("Feature {feature} has no geometry")]
    MissingGeometry { feature: usize },

    #[error("Feature {feature} has unsupported geometry type '{kind}'")]
    UnsupportedGeometry { feature: usize, kind: String },

    #[error("Feature {feature} has malformed coordinates")]
    InvalidCoordinates {
        feature: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Feature {feature} has a position with fewer than two ordinates")]
    ShortPosition { feature: usize },

    #[error(transparent)]
    Crs(#[from] ParseCrsError),

    #[error("Encoding error writing parquet file '{0}'")]
    ParquetWrite(PathBuf, #[source] PolarsError),

    #[error(transparent)]
    RowCount(#[from] RowCountMismatch),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("Failed processing DataFrame: {0}")]
    DataFrameProcessing(#[from] PolarsError),
}
