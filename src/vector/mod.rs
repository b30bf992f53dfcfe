pub mod kernel;
pub mod metric;
