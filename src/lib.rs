//! Distance matrices between two vector sets, computed sequentially, with
//! data parallelism, or partitioned across cooperating workers.
pub mod cluster;
pub mod table_io;
pub mod transport;
pub mod utils;
pub mod vector;

pub use cluster::engine::{Engine, EngineConfig, run};
pub use utils::errors::CalcError;
pub use utils::types::{DistanceMatrix, DistanceMetric, Scalar, Table, Vector, VectorSet};
pub use vector::kernel::Kernel;
