use crate::schema::column::{ColumnType, DefaultValue};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Unknown schema kind '{0}'")]
    UnknownSchemaKind(String),

    #[error("Schema '{kind}' declares {count} key columns, expected exactly one")]
    KeyColumnCount { kind: String, count: usize },

    #[error("Key column '{column}' of schema '{kind}' must be text, found {found}")]
    KeyColumnType {
        kind: String,
        column: String,
        found: ColumnType,
    },

    #[error("Schema '{kind}' declares more than one time column")]
    MultipleTimeColumns { kind: String },

    #[error("Schema '{kind}' declares column '{column}' twice")]
    DuplicateColumn { kind: String, column: String },

    #[error("Default {default} does not fit column '{column}' ({column_type}) of schema '{kind}'")]
    IncompatibleDefault {
        kind: String,
        column: String,
        column_type: ColumnType,
        default: DefaultValue,
    },

    #[error("Schema kind must not be empty")]
    EmptyKind,
}
