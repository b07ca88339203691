pub mod column;
pub mod definition;
pub mod error;
pub mod registry;
