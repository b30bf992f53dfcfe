use std::io;
use thiserror::Error;

/// Central error enum for the distance engine.
#[derive(Error, Debug)]
pub enum CalcError {
    #[error("Vector length mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        expected: usize,
        actual: usize,
    },

    #[error("Channel is not registered: {0}")]
    UnregisteredChannel(String),

    #[error("Invalid distance metric: {0}")]
    InvalidMetric(String),

    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    #[error("Invalid table: {0}")]
    InvalidTable(String),

    #[error("I/O error: {0}")]
    IOError(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl CalcError {
    pub(crate) fn transport(msg: impl Into<String>) -> Self {
        CalcError::TransportFailure(msg.into())
    }
}
