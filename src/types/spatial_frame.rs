//! A polars `DataFrame` paired row-for-row with field geometries.

use crate::types::crs::Crs;
use geo::MultiPolygon;
use polars::prelude::{DataFrame, IdxCa, IdxSize, PolarsResult};

/// Attribute table plus one geometry per row, and the reference the
/// geometries are expressed in.
///
/// Row `i` of [`SpatialFrame::frame`] describes `geometries[i]`. Nothing in the
/// crate reorders rows of a spatial frame, so the pairing survives
/// standardization and joining.
#[derive(Debug, Clone)]
pub struct SpatialFrame {
    frame: DataFrame,
    geometries: Vec<MultiPolygon<f64>>,
    crs: Option<Crs>,
}

/// Returned when the attribute table and geometry list disagree on length.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Spatial frame has {rows} attribute rows but {geometries} geometries")]
pub struct RowCountMismatch {
    pub rows: usize,
    pub geometries: usize,
}

impl SpatialFrame {
    pub fn new(
        frame: DataFrame,
        geometries: Vec<MultiPolygon<f64>>,
        crs: Option<Crs>,
    ) -> Result<Self, RowCountMismatch> {
        if frame.height() != geometries.len() {
            return Err(RowCountMismatch {
                rows: frame.height(),
                geometries: geometries.len(),
            });
        }
        Ok(Self {
            frame,
            geometries,
            crs,
        })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Mutable access for same-height column updates.
    pub(crate) fn frame_mut(&mut self) -> &mut DataFrame {
        &mut self.frame
    }

    pub fn geometries(&self) -> &[MultiPolygon<f64>] {
        &self.geometries
    }

    pub fn crs(&self) -> Option<Crs> {
        self.crs
    }

    pub fn height(&self) -> usize {
        self.geometries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }

    /// Replaces the attribute table, keeping the geometries.
    pub fn with_frame(self, frame: DataFrame) -> Result<Self, RowCountMismatch> {
        Self::new(frame, self.geometries, self.crs)
    }

    /// Keeps only the rows at `indices`, in the given order.
    pub fn take_rows(&self, indices: &[usize]) -> PolarsResult<Self> {
        let idx = IdxCa::from_vec(
            "idx".into(),
            indices.iter().map(|&i| i as IdxSize).collect(),
        );
        let frame = self.frame.take(&idx)?;
        let geometries = indices.iter().map(|&i| self.geometries[i].clone()).collect();
        Ok(Self {
            frame,
            geometries,
            crs: self.crs,
        })
    }

    pub fn into_parts(self) -> (DataFrame, Vec<MultiPolygon<f64>>, Option<Crs>) {
        (self.frame, self.geometries, self.crs)
    }
}
