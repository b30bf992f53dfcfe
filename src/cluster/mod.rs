pub mod engine;
pub mod partition;
pub mod protocol;
