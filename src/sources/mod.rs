pub mod adapter;
pub mod csv_file;
pub mod error;
pub mod mock;
pub mod params;
pub mod static_source;
