pub mod cache;
pub mod data_source;
pub mod engine;
pub mod indicator;
pub mod model;
pub mod regime;
