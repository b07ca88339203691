use crate::schema::column::{parse_date_days, ColumnSpec, ColumnType, DefaultValue};
use crate::schema::error::SchemaError;
use crate::types::crs::Crs;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Built-in dataset kinds. Configured kinds are plain strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetKind {
    Fields,
    Soil,
    Weather,
    Crops,
    ImageryStats,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 5] = [
        DatasetKind::Fields,
        DatasetKind::Soil,
        DatasetKind::Weather,
        DatasetKind::Crops,
        DatasetKind::ImageryStats,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Fields => "fields",
            DatasetKind::Soil => "soil",
            DatasetKind::Weather => "weather",
            DatasetKind::Crops => "crops",
            DatasetKind::ImageryStats => "imagery_stats",
        }
    }
}

impl std::fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unvalidated schema shape, as read from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub kind: String,
    pub columns: Vec<ColumnSpec>,
    #[serde(default)]
    pub crs: Option<Crs>,
    /// Registered kind whose columns come first; `columns` then add to or
    /// replace them. See [`Schema::widened`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
}

/// Ordered column declarations for one dataset kind.
///
/// A `Schema` always has exactly one text key column, at most one time column
/// and unique column names. Defaults are known to fit their column type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    kind: String,
    columns: Vec<ColumnSpec>,
    crs: Option<Crs>,
}

impl TryFrom<SchemaDefinition> for Schema {
    type Error = SchemaError;

    fn try_from(def: SchemaDefinition) -> Result<Self, Self::Error> {
        Schema::new(def.kind, def.columns, def.crs)
    }
}

impl Schema {
    pub fn new(
        kind: impl Into<String>,
        columns: Vec<ColumnSpec>,
        crs: Option<Crs>,
    ) -> Result<Self, SchemaError> {
        let kind = kind.into();
        if kind.trim().is_empty() {
            return Err(SchemaError::EmptyKind);
        }

        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(SchemaError::DuplicateColumn {
                    kind,
                    column: column.name.clone(),
                });
            }
            if let Some(default) = &column.default {
                if !default_fits(default, column.column_type) {
                    return Err(SchemaError::IncompatibleDefault {
                        kind,
                        column: column.name.clone(),
                        column_type: column.column_type,
                        default: default.clone(),
                    });
                }
            }
        }

        let keys: Vec<&ColumnSpec> = columns.iter().filter(|c| c.is_key()).collect();
        if keys.len() != 1 {
            return Err(SchemaError::KeyColumnCount {
                count: keys.len(),
                kind,
            });
        }
        if keys[0].column_type != ColumnType::Text {
            return Err(SchemaError::KeyColumnType {
                column: keys[0].name.clone(),
                found: keys[0].column_type,
                kind,
            });
        }
        if columns.iter().filter(|c| c.is_time()).count() > 1 {
            return Err(SchemaError::MultipleTimeColumns { kind });
        }

        Ok(Self { kind, columns, crs })
    }

    /// For built-in schemas, whose shape is covered by tests.
    pub(crate) fn new_unchecked(kind: &str, columns: Vec<ColumnSpec>, crs: Option<Crs>) -> Self {
        Self {
            kind: kind.to_string(),
            columns,
            crs,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Canonical coordinate reference for spatial kinds.
    pub fn crs(&self) -> Option<Crs> {
        self.crs
    }

    pub fn key_column(&self) -> &str {
        self.columns
            .iter()
            .find(|c| c.is_key())
            .map(|c| c.name.as_str())
            .unwrap_or_default()
    }

    pub fn time_column(&self) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.is_time())
            .map(|c| c.name.as_str())
    }

    /// Every column a standardized table carries, in order.
    pub fn required_columns(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Non-key columns, in order. These become the joined column group.
    pub fn value_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| !c.is_key())
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.column(name).map(|c| c.column_type)
    }

    /// A zero-row table with the schema's columns and types.
    pub fn empty_frame(&self) -> PolarsResult<DataFrame> {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                Series::new_empty(c.name.as_str().into(), &c.column_type.data_type()).into_column()
            })
            .collect();
        DataFrame::new(columns)
    }

    /// Builds `definition` on top of this schema: its columns are appended,
    /// replacing same-named columns in place, and its reference, when set,
    /// overrides this one. The result takes the definition's kind.
    pub fn widened(&self, definition: SchemaDefinition) -> Result<Self, SchemaError> {
        let mut columns = self.columns.clone();
        for spec in definition.columns {
            match columns.iter_mut().find(|c| c.name == spec.name) {
                Some(existing) => *existing = spec,
                None => columns.push(spec),
            }
        }
        Schema::new(definition.kind, columns, definition.crs.or(self.crs))
    }
}

fn default_fits(default: &DefaultValue, column_type: ColumnType) -> bool {
    match (default, column_type) {
        (DefaultValue::Text(text), ColumnType::Date) => parse_date_days(text).is_some(),
        (default, column_type) => default.fits(column_type),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn soil_like() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::key("field_id"),
            ColumnSpec::value("om_pct", ColumnType::Float64),
            ColumnSpec::value("texture", ColumnType::Text)
                .with_default(DefaultValue::Text("Unknown".into())),
        ]
    }

    #[test]
    fn queries() {
        let schema = Schema::new("soil", soil_like(), None).unwrap();
        assert_eq!(schema.key_column(), "field_id");
        assert_eq!(schema.time_column(), None);
        assert_eq!(
            schema.required_columns(),
            vec!["field_id", "om_pct", "texture"]
        );
        assert_eq!(schema.column_type("om_pct"), Some(ColumnType::Float64));
        assert_eq!(schema.column_type("nope"), None);
        assert_eq!(schema.empty_frame().unwrap().width(), 3);
    }

    #[test]
    fn rejects_missing_and_double_keys() {
        let mut columns = soil_like();
        columns.remove(0);
        assert!(matches!(
            Schema::new("soil", columns, None),
            Err(SchemaError::KeyColumnCount { count: 0, .. })
        ));

        let mut columns = soil_like();
        columns.push(ColumnSpec::key("other_id"));
        assert!(matches!(
            Schema::new("soil", columns, None),
            Err(SchemaError::KeyColumnCount { count: 2, .. })
        ));
    }

    #[test]
    fn rejects_bad_defaults_and_duplicates() {
        let mut columns = soil_like();
        columns.push(
            ColumnSpec::value("sampled", ColumnType::Date)
                .with_default(DefaultValue::Text("last spring".into())),
        );
        assert!(matches!(
            Schema::new("soil", columns, None),
            Err(SchemaError::IncompatibleDefault { .. })
        ));

        let mut columns = soil_like();
        columns.push(ColumnSpec::value("om_pct", ColumnType::Text));
        assert!(matches!(
            Schema::new("soil", columns, None),
            Err(SchemaError::DuplicateColumn { .. })
        ));
    }

    #[test]
    fn widening_replaces_and_appends() {
        let schema = Schema::new("soil", soil_like(), None).unwrap();
        let wider = schema
            .widened(SchemaDefinition {
                kind: "soil_lab".into(),
                columns: vec![
                    ColumnSpec::value("om_pct", ColumnType::Float64)
                        .with_default(DefaultValue::Float(3.0)),
                    ColumnSpec::value("cec", ColumnType::Float64),
                ],
                crs: None,
                extends: Some("soil".into()),
            })
            .unwrap();
        assert_eq!(wider.kind(), "soil_lab");
        assert_eq!(
            wider.required_columns(),
            vec!["field_id", "om_pct", "texture", "cec"]
        );
        assert_eq!(
            wider.column("om_pct").and_then(|c| c.default.clone()),
            Some(DefaultValue::Float(3.0))
        );
    }
}
