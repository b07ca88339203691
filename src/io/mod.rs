pub mod error;
pub mod geojson;
pub mod sink;
