pub mod errors;
pub mod telemetry;
pub mod timing;
pub mod types;
