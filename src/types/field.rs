//! Field records: the validated spine every attribute source joins onto.

use crate::types::geometry;
use crate::types::spatial_frame::SpatialFrame;
use geo::{Centroid, MultiPolygon, Point};
use polars::prelude::*;

/// Column that receives the geodesic area of each field.
pub const AREA_COLUMN: &str = "area_acres";

/// One agricultural parcel.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRecord {
    /// Join key shared by every attribute source.
    pub field_id: String,
    /// Boundary in longitude/latitude.
    pub geometry: MultiPolygon<f64>,
    /// Geodesic area of `geometry`, in acres.
    pub area_acres: f64,
}

impl FieldRecord {
    /// Builds a record from a geometry, deriving its area.
    pub fn new(
        field_id: impl Into<String>,
        geometry: MultiPolygon<f64>,
    ) -> Result<Self, FieldSetError> {
        let field_id = field_id.into();
        geometry::validate(&geometry).map_err(|issue| FieldSetError::InvalidFieldReference {
            row: None,
            field_id: Some(field_id.clone()),
            reason: issue.to_string(),
        })?;
        let area_acres = geometry::area_acres(&geometry);
        Ok(Self {
            field_id,
            geometry,
            area_acres,
        })
    }

    /// Centroid of the boundary, the point most point-query sources use.
    pub fn centroid(&self) -> Option<Point<f64>> {
        self.geometry.centroid()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FieldSetError {
    #[error("Invalid field reference at row {row:?} (field_id {field_id:?}): {reason}")]
    InvalidFieldReference {
        row: Option<usize>,
        field_id: Option<String>,
        reason: String,
    },

    #[error("Key column '{0}' is missing or not text")]
    KeyColumn(String, #[source] PolarsError),

    #[error("Failed to write derived area column")]
    AreaColumn(#[source] PolarsError),
}

/// Validates every row of a standardized field table and returns the records.
///
/// Rows with a null or blank key, or a geometry that fails
/// [`geometry::validate`], abort with [`FieldSetError::InvalidFieldReference`].
/// When the table has an [`AREA_COLUMN`], it is overwritten with the derived
/// areas.
pub fn build_field_set(
    fields: &mut SpatialFrame,
    key_column: &str,
) -> Result<Vec<FieldRecord>, FieldSetError> {
    let records = {
        let keys = fields
            .frame()
            .column(key_column)
            .and_then(|c| c.str())
            .map_err(|e| FieldSetError::KeyColumn(key_column.to_string(), e))?;

        let mut records = Vec::with_capacity(fields.height());
        for (row, (key, geometry)) in keys.into_iter().zip(fields.geometries()).enumerate() {
            let field_id = match key.map(str::trim) {
                Some(id) if !id.is_empty() => id.to_string(),
                _ => {
                    return Err(FieldSetError::InvalidFieldReference {
                        row: Some(row),
                        field_id: None,
                        reason: "missing field_id".to_string(),
                    })
                }
            };
            let record = FieldRecord::new(field_id, geometry.clone()).map_err(|e| match e {
                FieldSetError::InvalidFieldReference {
                    field_id, reason, ..
                } => FieldSetError::InvalidFieldReference {
                    row: Some(row),
                    field_id,
                    reason,
                },
                other => other,
            })?;
            records.push(record);
        }
        records
    };

    if fields.frame().get_column_index(AREA_COLUMN).is_some() {
        let areas = Column::new(
            AREA_COLUMN.into(),
            records.iter().map(|r| r.area_acres).collect::<Vec<f64>>(),
        );
        fields
            .frame_mut()
            .with_column(areas)
            .map_err(FieldSetError::AreaColumn)?;
    }

    Ok(records)
}
