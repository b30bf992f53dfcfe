//! Coordinator and worker sides of the partition, compute, gather protocol.
//!
//! The coordinator walks `Init -> DistributingQuery -> DistributingDataset ->
//! Computing -> Gathering -> Done`. Each worker mirrors the distribution
//! steps with matching receives, computes its slice and sends it back.
//! Only the coordinator ever holds the assembled matrix.
use std::marker::PhantomData;

use tracing::{debug, info};

use crate::cluster::partition::{Plan, plan};
use crate::transport::flat::{flatten, split_rows};
use crate::transport::registry::TagRegistry;
use crate::transport::{COORDINATOR, Transport};
use crate::utils::errors::CalcError;
use crate::utils::timing::TaskTimings;
use crate::utils::types::{DistanceMatrix, DistanceMetric, Scalar, Vector};
use crate::vector::kernel::Kernel;

/// Logical channel names used by the protocol.
pub mod channels {
    pub const VECTOR_SIZE: &str = "vector_size";
    pub const QUERY_SIZE: &str = "query_size";
    pub const METRIC: &str = "metric";
    pub const DATASET_SIZE: &str = "dataset_size";
    pub const QUERY_MATRIX: &str = "query_matrix";
    pub const DATASET_MATRIX: &str = "dataset_matrix";
    pub const DISTANCE_MATRIX: &str = "distance_matrix";

    pub const ALL: [&str; 7] = [
        VECTOR_SIZE,
        QUERY_SIZE,
        METRIC,
        DATASET_SIZE,
        QUERY_MATRIX,
        DATASET_MATRIX,
        DISTANCE_MATRIX,
    ];
}

/// Registry holding every protocol channel, identical on all participants.
pub fn protocol_registry() -> TagRegistry {
    TagRegistry::with_channels(channels::ALL)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    DistributingQuery,
    DistributingDataset,
    Computing,
    Gathering,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Computed and sent back a slice of `rows` query rows.
    Computed { rows: usize },
    /// The plan needed fewer workers than were available.
    Idle,
}

/// Checks that every row has the dimension of the first query row (or of the
/// first dataset row when the query is empty) and returns it.
///
/// Stricter than the kernel, which only compares query rows with dataset
/// rows: slices travel as flat buffers split by one row length, so a ragged
/// table is rejected even when the other side is empty.
pub fn validate_dimensions<T>(query: &[Vector<T>], dataset: &[Vector<T>]) -> Result<usize, CalcError> {
    let dim = query.first().or(dataset.first()).map_or(0, Vec::len);
    for row in query.iter().chain(dataset) {
        if row.len() != dim {
            return Err(CalcError::DimensionMismatch {
                expected: dim,
                actual: row.len(),
            });
        }
    }
    Ok(dim)
}

fn to_usize(value: u64, what: &str) -> Result<usize, CalcError> {
    usize::try_from(value).map_err(|_| CalcError::transport(format!("{what} {value} does not fit in usize")))
}

pub struct Coordinator<'a, T: Scalar, P: Transport<T>> {
    transport: P,
    registry: TagRegistry,
    kernel: Kernel,
    timings: &'a TaskTimings,
    phase: Phase,
    _scalar: PhantomData<T>,
}

impl<'a, T: Scalar, P: Transport<T>> Coordinator<'a, T, P> {
    pub fn new(transport: P, kernel: Kernel, timings: &'a TaskTimings) -> Result<Self, CalcError> {
        if !transport.is_coordinator() {
            return Err(CalcError::transport(format!(
                "rank {} cannot act as coordinator",
                transport.rank()
            )));
        }
        Ok(Self {
            transport,
            registry: protocol_registry(),
            kernel,
            timings,
            phase: Phase::Init,
            _scalar: PhantomData,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, phase: Phase) {
        debug!(from = ?self.phase, to = ?phase, "coordinator phase");
        self.phase = phase;
    }

    /// Runs one full distribution, computation and gather cycle.
    pub fn run(
        &mut self,
        query: &[Vector<T>],
        dataset: &[Vector<T>],
        metric: DistanceMetric,
    ) -> Result<DistanceMatrix<T>, CalcError> {
        let timings = self.timings;
        self.enter(Phase::Init);
        let dim = validate_dimensions(query, dataset)?;
        let plan = plan(query.len(), self.transport.size());
        info!(
            query_rows = query.len(),
            dataset_rows = dataset.len(),
            dim,
            workers = plan.effective_workers,
            block_size = plan.block_size,
            %metric,
            "partitioned query set"
        );

        self.enter(Phase::DistributingQuery);
        timings.time("distribute_query", || self.distribute_query(query, dim, metric, &plan))?;

        self.enter(Phase::DistributingDataset);
        timings.time("distribute_dataset", || self.distribute_dataset(dataset, &plan))?;

        self.enter(Phase::Computing);
        let own = plan
            .partition(COORDINATOR)
            .map_or(0..0, |p| p.rows());
        let own_matrix = timings.time("compute_distance", || {
            self.kernel.compute_distance(&query[own], dataset, metric)
        })?;

        self.enter(Phase::Gathering);
        let matrix = timings.time("gather", || self.gather(&plan, dataset.len(), own_matrix))?;

        self.enter(Phase::Done);
        info!(rows = matrix.len(), columns = dataset.len(), "distance matrix assembled");
        Ok(matrix)
    }

    fn distribute_query(
        &mut self,
        query: &[Vector<T>],
        dim: usize,
        metric: DistanceMetric,
        plan: &Plan,
    ) -> Result<(), CalcError> {
        let vector_tag = self.registry.tag(channels::VECTOR_SIZE)?;
        let query_tag = self.registry.tag(channels::QUERY_SIZE)?;
        let metric_tag = self.registry.tag(channels::METRIC)?;
        let matrix_tag = self.registry.tag(channels::QUERY_MATRIX)?;

        for rank in 1..self.transport.size() {
            self.transport.send_scalar(dim as u64, rank, vector_tag)?;
            self.transport.send_scalar(query.len() as u64, rank, query_tag)?;
            match plan.partition(rank) {
                Some(slice) => {
                    debug!(rank, rows = ?slice.rows(), "sending query slice");
                    self.transport.send_scalar(metric.index(), rank, metric_tag)?;
                    let flat = flatten(&query[slice.rows()]);
                    self.transport.send_buffer(&flat, rank, matrix_tag)?;
                }
                None => debug!(rank, "worker left idle"),
            }
        }
        Ok(())
    }

    fn distribute_dataset(&mut self, dataset: &[Vector<T>], plan: &Plan) -> Result<(), CalcError> {
        let size_tag = self.registry.tag(channels::DATASET_SIZE)?;
        let matrix_tag = self.registry.tag(channels::DATASET_MATRIX)?;
        let flat = flatten(dataset);

        for rank in 1..plan.effective_workers {
            self.transport.send_scalar(dataset.len() as u64, rank, size_tag)?;
            self.transport.send_buffer(&flat, rank, matrix_tag)?;
        }
        Ok(())
    }

    /// Worker partials in rank order, then the coordinator's own rows.
    fn gather(
        &mut self,
        plan: &Plan,
        dataset_rows: usize,
        own: DistanceMatrix<T>,
    ) -> Result<DistanceMatrix<T>, CalcError> {
        let tag = self.registry.tag(channels::DISTANCE_MATRIX)?;
        let mut matrix = Vec::with_capacity(plan.total_rows);

        for rank in 1..plan.effective_workers {
            let flat = self
                .transport
                .recv_buffer(plan.block_size * dataset_rows, rank, tag)?;
            matrix.extend(split_rows(&flat, plan.block_size, dataset_rows)?);
            debug!(rank, rows = plan.block_size, "gathered partial");
        }
        matrix.extend(own);
        Ok(matrix)
    }
}

pub struct Worker<'a, T: Scalar, P: Transport<T>> {
    transport: P,
    registry: TagRegistry,
    kernel: Kernel,
    timings: &'a TaskTimings,
    _scalar: PhantomData<T>,
}

impl<'a, T: Scalar, P: Transport<T>> Worker<'a, T, P> {
    pub fn new(transport: P, kernel: Kernel, timings: &'a TaskTimings) -> Result<Self, CalcError> {
        if transport.is_coordinator() {
            return Err(CalcError::transport("the coordinator rank cannot serve as a worker"));
        }
        Ok(Self {
            transport,
            registry: protocol_registry(),
            kernel,
            timings,
            _scalar: PhantomData,
        })
    }

    /// Receives the metric, a slice and the dataset, computes, and returns
    /// the partial. The metric always comes from the coordinator.
    pub fn serve(&mut self) -> Result<WorkerOutcome, CalcError> {
        let timings = self.timings;
        let rank = self.transport.rank();

        let dim = self.recv_size(channels::VECTOR_SIZE)?;
        let total_rows = self.recv_size(channels::QUERY_SIZE)?;
        let plan = plan(total_rows, self.transport.size());
        if !plan.participates(rank) {
            debug!(rank, "no rows assigned");
            return Ok(WorkerOutcome::Idle);
        }
        let metric_tag = self.registry.tag(channels::METRIC)?;
        let metric = DistanceMetric::from_index(self.transport.recv_scalar(COORDINATOR, metric_tag)?)?;

        let (query, dataset) = timings.time("receive_task", || -> Result<_, CalcError> {
            let matrix_tag = self.registry.tag(channels::QUERY_MATRIX)?;
            let flat = self
                .transport
                .recv_buffer(plan.block_size * dim, COORDINATOR, matrix_tag)?;
            let query = split_rows(&flat, plan.block_size, dim)?;

            let dataset_rows = self.recv_size(channels::DATASET_SIZE)?;
            let dataset_tag = self.registry.tag(channels::DATASET_MATRIX)?;
            let flat = self
                .transport
                .recv_buffer(dataset_rows * dim, COORDINATOR, dataset_tag)?;
            let dataset = split_rows(&flat, dataset_rows, dim)?;
            Ok((query, dataset))
        })?;
        debug!(rank, rows = query.len(), dataset_rows = dataset.len(), %metric, "received task");

        let matrix = timings.time("compute_distance", || {
            self.kernel.compute_distance(&query, &dataset, metric)
        })?;

        let tag = self.registry.tag(channels::DISTANCE_MATRIX)?;
        timings.time("send_distance_matrix", || {
            self.transport.send_buffer(&flatten(&matrix), COORDINATOR, tag)
        })?;
        Ok(WorkerOutcome::Computed { rows: matrix.len() })
    }

    fn recv_size(&mut self, channel: &str) -> Result<usize, CalcError> {
        let tag = self.registry.tag(channel)?;
        let value = self.transport.recv_scalar(COORDINATOR, tag)?;
        to_usize(value, channel)
    }
}
