use crate::schema::column::ColumnType;
use crate::types::crs::Crs;
use crate::types::spatial_frame::RowCountMismatch;
use polars::error::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StandardizeError {
    #[error("Table for schema '{kind}' has no key column '{column}'")]
    MissingKeyColumn { kind: String, column: String },

    #[error("Cannot coerce value '{value}' in column '{column}' (row {row}) to {expected}")]
    TypeCoercion {
        column: String,
        value: String,
        row: usize,
        expected: ColumnType,
    },

    #[error("Geometries for schema '{kind}' carry no coordinate reference and none is assumed")]
    MissingCoordinateReference { kind: String },

    #[error("No transform from {from} to {to}")]
    UnsupportedReprojection { from: Crs, to: Crs },

    #[error(transparent)]
    RowCount(#[from] RowCountMismatch),

    #[error("Failed processing DataFrame: {0}")]
    DataFrameProcessing(#[from] PolarsError),
}
