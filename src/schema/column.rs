//! Column declarations: name, type, default and role within a schema.

use chrono::NaiveDate;
use polars::prelude::{lit, DataType, Expr, NULL};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical type of a schema column, mapped onto a polars [`DataType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Text,
    Int64,
    Float64,
    /// Calendar date, parsed from `YYYY-MM-DD` text.
    Date,
}

impl ColumnType {
    pub fn data_type(&self) -> DataType {
        match self {
            ColumnType::Text => DataType::String,
            ColumnType::Int64 => DataType::Int64,
            ColumnType::Float64 => DataType::Float64,
            ColumnType::Date => DataType::Date,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Text => "text",
            ColumnType::Int64 => "int64",
            ColumnType::Float64 => "float64",
            ColumnType::Date => "date",
        };
        f.write_str(name)
    }
}

/// Value used to replace missing entries of a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl DefaultValue {
    /// Whether this default can populate a column of type `column_type`.
    pub fn fits(&self, column_type: ColumnType) -> bool {
        matches!(
            (self, column_type),
            (DefaultValue::Text(_), ColumnType::Text)
                | (DefaultValue::Int(_), ColumnType::Int64)
                | (DefaultValue::Int(_), ColumnType::Float64)
                | (DefaultValue::Float(_), ColumnType::Float64)
                | (DefaultValue::Text(_), ColumnType::Date)
        )
    }

    /// Literal expression of this default, already cast to the column type.
    pub(crate) fn literal(&self, column_type: ColumnType) -> Expr {
        let value = match (self, column_type) {
            (DefaultValue::Text(v), ColumnType::Date) => match parse_date_days(v) {
                Some(days) => lit(days),
                None => lit(NULL),
            },
            (DefaultValue::Int(v), _) => lit(*v),
            (DefaultValue::Float(v), _) => lit(*v),
            (DefaultValue::Text(v), _) => lit(v.clone()),
        };
        value.cast(column_type.data_type())
    }
}

/// Days since 1970-01-01 for an ISO `YYYY-MM-DD` date, the physical value of
/// a polars `Date`.
pub(crate) fn parse_date_days(text: &str) -> Option<i32> {
    let date = NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").ok()?;
    Some((date - NaiveDate::from_ymd_opt(1970, 1, 1)?).num_days() as i32)
}

impl fmt::Display for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Int(v) => write!(f, "{v}"),
            DefaultValue::Float(v) => write!(f, "{v}"),
            DefaultValue::Text(v) => write!(f, "{v:?}"),
        }
    }
}

/// What a column means to the join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    /// The `field_id` join key.
    Key,
    /// Orders repeated records of one field (e.g. `date`, `year`).
    Time,
    #[default]
    Value,
}

/// One declared column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default)]
    pub default: Option<DefaultValue>,
    #[serde(default)]
    pub role: ColumnRole,
}

impl ColumnSpec {
    pub fn key(name: &str) -> Self {
        Self {
            name: name.to_string(),
            column_type: ColumnType::Text,
            default: None,
            role: ColumnRole::Key,
        }
    }

    pub fn time(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
            default: None,
            role: ColumnRole::Time,
        }
    }

    pub fn value(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
            default: None,
            role: ColumnRole::Value,
        }
    }

    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn is_key(&self) -> bool {
        self.role == ColumnRole::Key
    }

    pub fn is_time(&self) -> bool {
        self.role == ColumnRole::Time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_type_compatibility() {
        assert!(DefaultValue::Int(0).fits(ColumnType::Float64));
        assert!(!DefaultValue::Float(0.5).fits(ColumnType::Int64));
        assert!(!DefaultValue::Text("x".into()).fits(ColumnType::Float64));
    }

    #[test]
    fn date_days_from_epoch() {
        assert_eq!(parse_date_days("1970-01-02"), Some(1));
        assert_eq!(parse_date_days(" 2024-01-01 "), Some(19_723));
        assert_eq!(parse_date_days("01/02/2024"), None);
    }

    #[test]
    fn column_spec_deserializes_from_toml_shape() {
        let spec: ColumnSpec = serde_json::from_str(
            r#"{"name": "yield_bu_ac", "type": "float64", "default": 0}"#,
        )
        .unwrap();
        assert_eq!(spec.column_type, ColumnType::Float64);
        assert_eq!(spec.default, Some(DefaultValue::Int(0)));
        assert_eq!(spec.role, ColumnRole::Value);
    }
}
