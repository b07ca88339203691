use crate::types::field::FieldRecord;
use crate::types::geometry::area_acres;
use crate::types::spatial_frame::SpatialFrame;
use geo::{BoundingRect, Rect};
use ordered_float::OrderedFloat;
use polars::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Field attribute counted per value in [`FieldSummary::regions`].
pub const REGION_COLUMN: &str = "region";
/// Field attribute counted per value in [`FieldSummary::crops`].
pub const CROP_NAME_COLUMN: &str = "crop_name";

/// Lon/lat (or projected) extent of a field set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl From<Rect<f64>> for Extent {
    fn from(rect: Rect<f64>) -> Self {
        Self {
            min_x: rect.min().x,
            min_y: rect.min().y,
            max_x: rect.max().x,
            max_y: rect.max().y,
        }
    }
}

impl Extent {
    fn union(self, other: Extent) -> Extent {
        Extent {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }
}

/// Headline numbers of a field set. Acreage statistics are `None` for an
/// empty set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSummary {
    pub total_fields: usize,
    pub total_acres: f64,
    pub mean_acres: Option<f64>,
    pub median_acres: Option<f64>,
    pub min_acres: Option<f64>,
    pub max_acres: Option<f64>,
    pub extent: Option<Extent>,
    /// Fields per `region` value. Empty when the table has no such column.
    pub regions: BTreeMap<String, usize>,
    /// Fields per `crop_name` value.
    pub crops: BTreeMap<String, usize>,
}

impl FieldSummary {
    pub fn from_records(records: &[FieldRecord]) -> Self {
        let mut areas: Vec<OrderedFloat<f64>> =
            records.iter().map(|r| OrderedFloat(r.area_acres)).collect();
        areas.sort();

        let total_acres: f64 = areas.iter().map(|a| a.0).sum();
        let count = areas.len();
        let median_acres = match count {
            0 => None,
            n if n % 2 == 1 => Some(areas[n / 2].0),
            n => Some((areas[n / 2 - 1].0 + areas[n / 2].0) / 2.0),
        };
        let extent = records
            .iter()
            .filter_map(|r| r.geometry.bounding_rect())
            .map(Extent::from)
            .reduce(Extent::union);

        Self {
            total_fields: count,
            total_acres,
            mean_acres: (count > 0).then(|| total_acres / count as f64),
            median_acres,
            min_acres: areas.first().map(|a| a.0),
            max_acres: areas.last().map(|a| a.0),
            extent,
            regions: BTreeMap::new(),
            crops: BTreeMap::new(),
        }
    }

    /// Like [`FieldSummary::from_records`], with value counts of the field
    /// table's `region` and `crop_name` columns. Nulls are not counted.
    pub fn from_field_set(fields: &SpatialFrame, records: &[FieldRecord]) -> PolarsResult<Self> {
        let mut summary = Self::from_records(records);
        summary.regions = value_counts(fields.frame(), REGION_COLUMN)?;
        summary.crops = value_counts(fields.frame(), CROP_NAME_COLUMN)?;
        Ok(summary)
    }

    pub fn to_markdown(&self) -> String {
        let fmt_acres = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"));
        let mut out = String::new();
        let _ = writeln!(out, "| Metric | Value |");
        let _ = writeln!(out, "|---|---|");
        let _ = writeln!(out, "| Fields | {} |", self.total_fields);
        let _ = writeln!(out, "| Total acres | {:.2} |", self.total_acres);
        let _ = writeln!(out, "| Mean acres | {} |", fmt_acres(self.mean_acres));
        let _ = writeln!(out, "| Median acres | {} |", fmt_acres(self.median_acres));
        let _ = writeln!(out, "| Smallest field | {} |", fmt_acres(self.min_acres));
        let _ = writeln!(out, "| Largest field | {} |", fmt_acres(self.max_acres));
        if let Some(e) = self.extent {
            let _ = writeln!(
                out,
                "| Extent | {:.5}, {:.5} to {:.5}, {:.5} |",
                e.min_x, e.min_y, e.max_x, e.max_y
            );
        }
        for (label, counts) in [("Regions", &self.regions), ("Crops", &self.crops)] {
            if !counts.is_empty() {
                let listed: Vec<String> = counts.iter().map(|(k, n)| format!("{k} ({n})")).collect();
                let _ = writeln!(out, "| {label} | {} |", listed.join(", "));
            }
        }
        out
    }
}

fn value_counts(frame: &DataFrame, column: &str) -> PolarsResult<BTreeMap<String, usize>> {
    let mut counts = BTreeMap::new();
    let Some(idx) = frame.get_column_index(column) else {
        return Ok(counts);
    };
    let values = frame.get_columns()[idx].cast(&DataType::String)?;
    for value in values.str()?.into_iter().flatten() {
        *counts.entry(value.to_string()).or_insert(0) += 1;
    }
    Ok(counts)
}

/// Fields whose area lies within the given bounds, inclusive, in input order.
pub fn filter_by_size(
    records: &[FieldRecord],
    min_acres: Option<f64>,
    max_acres: Option<f64>,
) -> Vec<FieldRecord> {
    records
        .iter()
        .filter(|r| min_acres.map_or(true, |min| r.area_acres >= min))
        .filter(|r| max_acres.map_or(true, |max| r.area_acres <= max))
        .cloned()
        .collect()
}

/// Rows of a field table whose geodesic area lies within the given bounds,
/// inclusive, with their geometries and in input order.
pub fn filter_fields_by_size(
    fields: &SpatialFrame,
    min_acres: Option<f64>,
    max_acres: Option<f64>,
) -> PolarsResult<SpatialFrame> {
    let keep: Vec<usize> = fields
        .geometries()
        .iter()
        .map(area_acres)
        .enumerate()
        .filter(|(_, acres)| min_acres.map_or(true, |min| *acres >= min))
        .filter(|(_, acres)| max_acres.map_or(true, |max| *acres <= max))
        .map(|(row, _)| row)
        .collect();
    fields.take_rows(&keep)
}
