pub mod crs;
pub mod field;
pub mod geometry;
pub mod spatial_frame;
