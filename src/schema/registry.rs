use crate::schema::column::{ColumnSpec, ColumnType, DefaultValue};
use crate::schema::definition::{DatasetKind, Schema, SchemaDefinition};
use crate::schema::error::SchemaError;
use crate::types::crs::Crs;
use crate::types::field::AREA_COLUMN;
use log::{debug, info};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

/// Column name shared by every built-in schema as the join key.
pub const FIELD_ID: &str = "field_id";

static BUILTIN: LazyLock<Arc<SchemaRegistry>> =
    LazyLock::new(|| Arc::new(SchemaRegistry::builtin()));

/// Lookup of [`Schema`]s by dataset kind.
///
/// Built once, then shared read-only (usually behind an `Arc`).
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Schema>,
}

impl SchemaRegistry {
    /// The process-wide registry holding only the built-in schemas.
    pub fn global() -> Arc<SchemaRegistry> {
        Arc::clone(&BUILTIN)
    }

    /// Registry with the fields, soil, weather, crops and imagery_stats kinds.
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        for kind in DatasetKind::ALL {
            registry.insert(builtin_schema(kind));
        }
        registry
    }

    /// Adds `schema`, replacing any schema already registered for its kind.
    pub fn with_schema(mut self, schema: Schema) -> Self {
        if self.schemas.contains_key(schema.kind()) {
            info!("Replacing schema for kind '{}'", schema.kind());
        }
        self.insert(schema);
        self
    }

    /// Validates and registers configured schema definitions, in order.
    ///
    /// A definition that `extends` a kind is widened from the schema
    /// registered for it at that point, built-in or configured earlier.
    pub fn with_definitions(
        mut self,
        definitions: impl IntoIterator<Item = SchemaDefinition>,
    ) -> Result<Self, SchemaError> {
        for definition in definitions {
            let schema = match definition.extends.clone() {
                Some(base) => self.get(&base)?.widened(definition)?,
                None => Schema::try_from(definition)?,
            };
            self = self.with_schema(schema);
        }
        Ok(self)
    }

    pub fn get(&self, kind: &str) -> Result<&Schema, SchemaError> {
        self.schemas
            .get(kind)
            .ok_or_else(|| SchemaError::UnknownSchemaKind(kind.to_string()))
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.schemas.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    fn insert(&mut self, schema: Schema) {
        debug!(
            "Registered schema '{}' with {} columns",
            schema.kind(),
            schema.columns().len()
        );
        self.schemas.insert(schema.kind().to_string(), schema);
    }
}

fn text(name: &str) -> ColumnSpec {
    ColumnSpec::value(name, ColumnType::Text)
}

fn float(name: &str) -> ColumnSpec {
    ColumnSpec::value(name, ColumnType::Float64)
}

fn unknown(name: &str) -> ColumnSpec {
    text(name).with_default(DefaultValue::Text("Unknown".to_string()))
}

fn builtin_columns(kind: DatasetKind) -> (Vec<ColumnSpec>, Option<Crs>) {
    let key = ColumnSpec::key(FIELD_ID);
    match kind {
        DatasetKind::Fields => (
            vec![key, text("region"), float(AREA_COLUMN), text("crop_name"), text("owner")],
            Some(Crs::Wgs84),
        ),
        DatasetKind::Soil => (
            vec![
                key,
                unknown("dominant_soil"),
                float("om_pct"),
                float("ph_water"),
                float("awc_r"),
                unknown("drainagecl"),
            ],
            None,
        ),
        DatasetKind::Weather => (
            vec![
                key,
                ColumnSpec::time("date", ColumnType::Date),
                float("t2m"),
                float("t2m_min"),
                float("t2m_max"),
                float("prectotcorr").with_default(DefaultValue::Float(0.0)),
                float("rh2m"),
                float("ws10m"),
            ],
            None,
        ),
        DatasetKind::Crops => (
            vec![
                key,
                ColumnSpec::time("year", ColumnType::Int64),
                ColumnSpec::value("crop_code", ColumnType::Int64).with_default(DefaultValue::Int(0)),
                unknown("crop_name"),
            ],
            None,
        ),
        DatasetKind::ImageryStats => (
            vec![
                key,
                float("ndvi_mean"),
                float("ndvi_std"),
                float("ndvi_min"),
                float("ndvi_max"),
                float("ndvi_median"),
            ],
            None,
        ),
    }
}

fn builtin_schema(kind: DatasetKind) -> Schema {
    let (columns, crs) = builtin_columns(kind);
    Schema::new_unchecked(kind.as_str(), columns, crs)
}
