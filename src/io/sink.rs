use crate::io::error::GeoIoError;
use crate::io::geojson::to_geojson;
use crate::join::dataset::JoinedDataset;
use crate::join::report::JoinReport;
use crate::types::geometry::to_wkt;
use async_trait::async_trait;
use log::info;
use polars::prelude::*;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::task;

/// Name of the WKT geometry column in tabular outputs.
pub const GEOMETRY_COLUMN: &str = "geometry";

/// Destination for a finished run.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Where the dataset goes, for logs.
    fn target(&self) -> String;

    async fn write(&self, dataset: &JoinedDataset, report: &JoinReport) -> Result<(), GeoIoError>;
}

/// `out.geojson` gets its report at `out.report.json`.
pub fn report_path(output: &Path) -> PathBuf {
    output.with_extension("report.json")
}

/// Writes `bytes` to a temporary file beside `path`, then renames it into
/// place, so readers never observe a half written file.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), GeoIoError> {
    let mut file = temp_beside(path)?;
    file.write_all(bytes)
        .and_then(|_| file.flush())
        .map_err(|e| GeoIoError::Write(path.to_path_buf(), e))?;
    file.persist(path)
        .map_err(|e| GeoIoError::Persist(path.to_path_buf(), e))?;
    Ok(())
}

fn temp_beside(path: &Path) -> Result<NamedTempFile, GeoIoError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| GeoIoError::Write(dir.clone(), e))?;
    NamedTempFile::new_in(&dir).map_err(|e| GeoIoError::Write(path.to_path_buf(), e))
}

async fn write_report(output: &Path, report: &JoinReport) -> Result<(), GeoIoError> {
    let path = report_path(output);
    let json = report.to_json()?;
    task::spawn_blocking(move || write_atomically(&path, json.as_bytes())).await??;
    Ok(())
}

/// GeoJSON FeatureCollection with every joined column as a property.
#[derive(Debug, Clone)]
pub struct GeoJsonSink {
    path: PathBuf,
}

impl GeoJsonSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Sink for GeoJsonSink {
    fn target(&self) -> String {
        format!("GeoJSON {}", self.path.display())
    }

    async fn write(&self, dataset: &JoinedDataset, report: &JoinReport) -> Result<(), GeoIoError> {
        let doc = to_geojson(dataset.spatial(), Some(dataset.key_column()))?;
        let bytes = serde_json::to_vec(&doc)?;
        let path = self.path.clone();
        task::spawn_blocking(move || write_atomically(&path, &bytes)).await??;
        write_report(&self.path, report).await?;
        info!(
            "Wrote {} features to {:?}",
            dataset.height(),
            self.path
        );
        Ok(())
    }
}

/// Parquet file of the joined columns plus a WKT `geometry` column.
#[derive(Debug, Clone)]
pub struct ParquetSink {
    path: PathBuf,
}

impl ParquetSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// The joined table with geometries appended as WKT.
pub fn with_wkt_geometry(dataset: &JoinedDataset) -> PolarsResult<DataFrame> {
    let wkt: Vec<String> = dataset.geometries().iter().map(to_wkt).collect();
    let mut frame = dataset.frame().clone();
    frame.with_column(Column::new(GEOMETRY_COLUMN.into(), wkt))?;
    Ok(frame)
}

#[async_trait]
impl Sink for ParquetSink {
    fn target(&self) -> String {
        format!("Parquet {}", self.path.display())
    }

    async fn write(&self, dataset: &JoinedDataset, report: &JoinReport) -> Result<(), GeoIoError> {
        let mut frame = with_wkt_geometry(dataset)?;
        let path = self.path.clone();
        task::spawn_blocking(move || {
            let mut file = temp_beside(&path)?;
            ParquetWriter::new(file.as_file_mut())
                .with_compression(ParquetCompression::Snappy)
                .finish(&mut frame)
                .map_err(|e| GeoIoError::ParquetWrite(path.clone(), e))?;
            file.persist(&path)
                .map_err(|e| GeoIoError::Persist(path.clone(), e))?;
            Ok::<(), GeoIoError>(())
        })
        .await??;
        write_report(&self.path, report).await?;
        info!("Wrote {} rows to {:?}", dataset.height(), self.path);
        Ok(())
    }
}
