mod error;
mod io;
mod join;
mod pipeline;
pub mod reshape;
mod schema;
mod sources;
mod standardize;
mod summary;
mod types;

pub use error::PipelineError;

pub use types::crs::{Crs, ParseCrsError};
pub use types::field::{build_field_set, FieldRecord, FieldSetError, AREA_COLUMN};
pub use types::geometry::{
    area_acres, to_wkt, validate as validate_geometry, GeometryIssue, SQUARE_METERS_PER_ACRE,
};
pub use types::spatial_frame::{RowCountMismatch, SpatialFrame};

pub use schema::column::{ColumnRole, ColumnSpec, ColumnType, DefaultValue};
pub use schema::definition::{DatasetKind, Schema, SchemaDefinition};
pub use schema::error::SchemaError;
pub use schema::registry::{SchemaRegistry, FIELD_ID};

pub use standardize::error::StandardizeError;
pub use standardize::standardizer::{fill_defaults, standardize, standardize_spatial};

pub use sources::adapter::{SkippedRecord, SourceAdapter, SourceBatch};
pub use sources::csv_file::CsvFileSource;
pub use sources::error::SourceError;
pub use sources::mock::{MockCropSource, MockImageryStatsSource, MockSoilSource, MockWeatherSource};
pub use sources::params::SourceParams;
pub use sources::static_source::StaticSource;

pub use join::dataset::{ColumnGroup, JoinedDataset};
pub use join::engine::{join, AttributeSet};
pub use join::error::JoinError;
pub use join::report::{JoinReport, SourceReport, SourceStatus};

pub use io::error::GeoIoError;
pub use io::geojson::{parse_geojson, read_geojson, to_geojson};
pub use io::sink::{report_path, with_wkt_geometry, GeoJsonSink, ParquetSink, Sink, GEOMETRY_COLUMN};

pub use pipeline::config::{
    AdapterConfig, FieldsConfig, OutputConfig, OutputFormat, PipelineConfig, SourceConfig,
};
pub use pipeline::orchestrator::{
    ConfiguredSource, FieldInput, Pipeline, PipelineOutput, PipelineState,
};

pub use summary::{
    filter_by_size, filter_fields_by_size, Extent, FieldSummary, CROP_NAME_COLUMN, REGION_COLUMN,
};
