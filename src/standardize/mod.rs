pub mod error;
pub mod standardizer;
