//! GeoJSON FeatureCollection reading (field boundaries) and writing (joined
//! datasets).

use crate::io::error::GeoIoError;
use crate::types::crs::Crs;
use crate::types::spatial_frame::SpatialFrame;
use chrono::NaiveDate;
use geo::{Coord, LineString, MultiPolygon, Polygon};
use log::info;
use polars::prelude::*;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::Path;
use tokio::task;

/// Day number of 1970-01-01 counted from 0001-01-01 (day 1).
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

#[derive(Debug, Deserialize)]
struct FeatureCollectionDoc {
    #[serde(rename = "type")]
    doc_type: String,
    #[serde(default)]
    features: Vec<FeatureDoc>,
    #[serde(default)]
    crs: Option<NamedCrs>,
}

/// The pre-RFC 7946 `crs` member.
#[derive(Debug, Deserialize)]
struct NamedCrs {
    properties: NamedCrsProperties,
}

#[derive(Debug, Deserialize)]
struct NamedCrsProperties {
    name: String,
}

#[derive(Debug, Deserialize)]
struct FeatureDoc {
    #[serde(default)]
    id: Option<Value>,
    geometry: Option<GeometryDoc>,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct GeometryDoc {
    #[serde(rename = "type")]
    geometry_type: String,
    #[serde(default)]
    coordinates: Value,
}

/// Parses a FeatureCollection of Polygon / MultiPolygon features.
///
/// Properties become columns. When a feature lacks `key_column` (or it is
/// null), the feature `id` is used instead. The frame's reference comes from
/// the legacy `crs` member. Without one it is WGS84, as RFC 7946 mandates.
pub fn parse_geojson(text: &str, key_column: &str) -> Result<SpatialFrame, GeoIoError> {
    let doc: FeatureCollectionDoc = serde_json::from_str(text)?;
    if doc.doc_type != "FeatureCollection" {
        return Err(GeoIoError::NotFeatureCollection(doc.doc_type));
    }
    let crs = match doc.crs {
        Some(named) => named.properties.name.parse::<Crs>()?,
        None => Crs::Wgs84,
    };

    let count = doc.features.len();
    let mut geometries = Vec::with_capacity(count);
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut columns: Vec<(String, Vec<Value>)> = Vec::new();

    for (i, feature) in doc.features.into_iter().enumerate() {
        let geometry = feature
            .geometry
            .ok_or(GeoIoError::MissingGeometry { feature: i })?;
        geometries.push(to_multipolygon(i, geometry)?);

        let mut properties = feature.properties.unwrap_or_default();
        if properties.get(key_column).map_or(true, Value::is_null) {
            if let Some(id) = feature.id.filter(|id| !id.is_null()) {
                properties.insert(key_column.to_string(), id);
            }
        }
        for (name, value) in properties {
            let slot = match slots.get(&name) {
                Some(&slot) => slot,
                None => {
                    slots.insert(name.clone(), columns.len());
                    columns.push((name, vec![Value::Null; i]));
                    columns.len() - 1
                }
            };
            columns[slot].1.push(value);
        }
        for (_, values) in columns.iter_mut() {
            if values.len() <= i {
                values.push(Value::Null);
            }
        }
    }

    if columns.is_empty() {
        columns.push((key_column.to_string(), vec![Value::Null; count]));
    }
    let columns = columns
        .into_iter()
        .map(|(name, values)| json_column(&name, values))
        .collect::<PolarsResult<Vec<Column>>>()?;
    Ok(SpatialFrame::new(DataFrame::new(columns)?, geometries, Some(crs))?)
}

/// Reads and parses a GeoJSON file.
pub async fn read_geojson(
    path: impl AsRef<Path>,
    key_column: &str,
) -> Result<SpatialFrame, GeoIoError> {
    let path = path.as_ref().to_path_buf();
    let text = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| GeoIoError::Read(path.clone(), e))?;
    let key_column = key_column.to_string();
    let fields = task::spawn_blocking(move || parse_geojson(&text, &key_column)).await??;
    info!(
        "Read {} features ({} properties) from {:?}",
        fields.height(),
        fields.frame().width(),
        path
    );
    Ok(fields)
}

/// Picks the narrowest column type holding every value: boolean, integer,
/// float, else text.
fn json_column(name: &str, values: Vec<Value>) -> PolarsResult<Column> {
    let present = || values.iter().filter(|v| !v.is_null());
    let name: PlSmallStr = name.into();
    let column = if present().next().is_none() {
        Column::full_null(name, values.len(), &DataType::String)
    } else if present().all(Value::is_boolean) {
        let parsed: Vec<Option<bool>> = values.iter().map(Value::as_bool).collect();
        Column::new(name, parsed)
    } else if present().all(|v| v.is_i64()) {
        let parsed: Vec<Option<i64>> = values.iter().map(Value::as_i64).collect();
        Column::new(name, parsed)
    } else if present().all(Value::is_number) {
        let parsed: Vec<Option<f64>> = values.iter().map(Value::as_f64).collect();
        Column::new(name, parsed)
    } else {
        let parsed: Vec<Option<String>> = values
            .iter()
            .map(|v| match v {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
            .collect();
        Column::new(name, parsed)
    };
    Ok(column)
}

fn to_multipolygon(feature: usize, geometry: GeometryDoc) -> Result<MultiPolygon<f64>, GeoIoError> {
    let invalid = |source| GeoIoError::InvalidCoordinates { feature, source };
    match geometry.geometry_type.as_str() {
        "Polygon" => {
            let rings: Vec<Vec<Vec<f64>>> =
                serde_json::from_value(geometry.coordinates).map_err(invalid)?;
            Ok(MultiPolygon(vec![to_polygon(feature, rings)?]))
        }
        "MultiPolygon" => {
            let polygons: Vec<Vec<Vec<Vec<f64>>>> =
                serde_json::from_value(geometry.coordinates).map_err(invalid)?;
            let polygons = polygons
                .into_iter()
                .map(|rings| to_polygon(feature, rings))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(MultiPolygon(polygons))
        }
        other => Err(GeoIoError::UnsupportedGeometry {
            feature,
            kind: other.to_string(),
        }),
    }
}

fn to_polygon(feature: usize, rings: Vec<Vec<Vec<f64>>>) -> Result<Polygon<f64>, GeoIoError> {
    let mut rings = rings.into_iter().map(|ring| {
        ring.into_iter()
            .map(|position| match position.as_slice() {
                [x, y, ..] => Ok(Coord { x: *x, y: *y }),
                _ => Err(GeoIoError::ShortPosition { feature }),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(LineString::from)
    });
    let exterior = rings
        .next()
        .transpose()?
        .unwrap_or_else(|| LineString::new(Vec::new()));
    let interiors = rings.collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

/// Renders a spatial frame as a FeatureCollection. Every column becomes a
/// property; `id_column`, when given, also becomes the feature `id`.
pub fn to_geojson(fields: &SpatialFrame, id_column: Option<&str>) -> Result<Value, GeoIoError> {
    let frame = fields.frame();
    let series: Vec<&Series> = frame
        .get_columns()
        .iter()
        .map(|c| c.as_materialized_series())
        .collect();

    let mut features = Vec::with_capacity(fields.height());
    for (row, geometry) in fields.geometries().iter().enumerate() {
        let mut properties = Map::new();
        for s in &series {
            properties.insert(s.name().to_string(), any_to_json(&s.get(row)?));
        }
        let mut feature = json!({
            "type": "Feature",
            "geometry": geometry_json(geometry),
        });
        if let Some(id) = id_column.and_then(|c| properties.get(c)) {
            feature["id"] = id.clone();
        }
        feature["properties"] = Value::Object(properties);
        features.push(feature);
    }

    let mut doc = json!({
        "type": "FeatureCollection",
        "features": features,
    });
    if let Some(crs) = fields.crs() {
        doc["crs"] = json!({
            "type": "name",
            "properties": { "name": crs.urn() },
        });
    }
    Ok(doc)
}

pub(crate) fn any_to_json(value: &AnyValue) -> Value {
    match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Bool(*b),
        AnyValue::String(s) => Value::String(s.to_string()),
        AnyValue::StringOwned(s) => Value::String(s.to_string()),
        AnyValue::Int8(v) => json!(v),
        AnyValue::Int16(v) => json!(v),
        AnyValue::Int32(v) => json!(v),
        AnyValue::Int64(v) => json!(v),
        AnyValue::UInt8(v) => json!(v),
        AnyValue::UInt16(v) => json!(v),
        AnyValue::UInt32(v) => json!(v),
        AnyValue::UInt64(v) => json!(v),
        AnyValue::Float32(v) => Value::from(*v as f64),
        AnyValue::Float64(v) => Value::from(*v),
        AnyValue::Date(days) => NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE)
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null),
        AnyValue::List(inner) => Value::Array(
            (0..inner.len())
                .map(|i| inner.get(i).map_or(Value::Null, |v| any_to_json(&v)))
                .collect(),
        ),
        other => Value::String(other.to_string()),
    }
}

fn ring_json(ring: &LineString<f64>) -> Value {
    Value::Array(ring.coords().map(|c| json!([c.x, c.y])).collect())
}

fn polygon_json(polygon: &Polygon<f64>) -> Value {
    Value::Array(
        std::iter::once(polygon.exterior())
            .chain(polygon.interiors())
            .map(ring_json)
            .collect(),
    )
}

fn geometry_json(geometry: &MultiPolygon<f64>) -> Value {
    match geometry.0.as_slice() {
        [single] => json!({ "type": "Polygon", "coordinates": polygon_json(single) }),
        many => json!({
            "type": "MultiPolygon",
            "coordinates": many.iter().map(polygon_json).collect::<Vec<_>>(),
        }),
    }
}
