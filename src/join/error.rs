use polars::error::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JoinError {
    #[error("Field id '{field_id}' appears more than once in the field set")]
    DuplicateFieldId { field_id: String },

    #[error("Field set row {row} has no field id")]
    MissingFieldId { row: usize },

    #[error("Table for source '{source_name}' has no key column '{column}'")]
    MissingKeyColumn { source_name: String, column: String },

    #[error("Source name '{0}' is used more than once")]
    DuplicateSourceName(String),

    #[error("Joined column '{column}' from source '{source_name}' already exists")]
    ColumnNameCollision { source_name: String, column: String },

    #[error("Failed processing DataFrame: {0}")]
    DataFrameProcessing(#[from] PolarsError),
}
