use crate::types::crs::Crs;
use crate::types::spatial_frame::SpatialFrame;
use geo::MultiPolygon;
use polars::prelude::*;
use serde::Serialize;

/// The columns one source contributed to a [`JoinedDataset`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnGroup {
    pub source: String,
    pub kind: String,
    /// Output column names, `<source>_<column>`, in schema order.
    pub columns: Vec<String>,
    /// Whether each column holds a per-field list of time ordered values.
    pub time_series: bool,
}

/// One row per field: the base columns, then one column group per source.
#[derive(Debug, Clone)]
pub struct JoinedDataset {
    fields: SpatialFrame,
    key_column: String,
    groups: Vec<ColumnGroup>,
}

impl JoinedDataset {
    pub(crate) fn new(fields: SpatialFrame, key_column: String, groups: Vec<ColumnGroup>) -> Self {
        Self {
            fields,
            key_column,
            groups,
        }
    }

    pub fn frame(&self) -> &DataFrame {
        self.fields.frame()
    }

    pub fn geometries(&self) -> &[MultiPolygon<f64>] {
        self.fields.geometries()
    }

    pub fn crs(&self) -> Option<Crs> {
        self.fields.crs()
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    pub fn groups(&self) -> &[ColumnGroup] {
        &self.groups
    }

    pub fn group(&self, source: &str) -> Option<&ColumnGroup> {
        self.groups.iter().find(|g| g.source == source)
    }

    pub fn height(&self) -> usize {
        self.fields.height()
    }

    pub fn spatial(&self) -> &SpatialFrame {
        &self.fields
    }

    pub fn into_spatial(self) -> SpatialFrame {
        self.fields
    }
}
