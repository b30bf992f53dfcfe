use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cluster::partition::plan;
use crate::cluster::protocol::{Coordinator, Worker, WorkerOutcome};
use crate::transport::channel::star;
use crate::utils::errors::CalcError;
use crate::utils::timing::TaskTimings;
use crate::utils::types::{DistanceMatrix, DistanceMetric, Scalar, Vector};
use crate::vector::kernel::Kernel;

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Kernel used by every participant for its own slice.
    pub kernel: Kernel,
    /// Upper bound on each blocking receive. `None` waits forever.
    pub recv_timeout: Option<Duration>,
}

/// Runs the partition, compute, gather protocol with in-process workers.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
}

/// Distance matrix of `query` against `dataset` spread over at most `worker_count`
/// participants, coordinator included, using the default configuration.
pub fn run<T: Scalar>(
    query: &[Vector<T>],
    dataset: &[Vector<T>],
    metric: DistanceMetric,
    worker_count: usize,
) -> Result<DistanceMatrix<T>, CalcError> {
    Engine::default().run(query, dataset, metric, worker_count)
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn run<T: Scalar>(
        &self,
        query: &[Vector<T>],
        dataset: &[Vector<T>],
        metric: DistanceMetric,
        worker_count: usize,
    ) -> Result<DistanceMatrix<T>, CalcError> {
        self.run_with_timings(query, dataset, metric, worker_count, &TaskTimings::disabled())
    }

    pub fn run_with_timings<T: Scalar>(
        &self,
        query: &[Vector<T>],
        dataset: &[Vector<T>],
        metric: DistanceMetric,
        worker_count: usize,
        timings: &TaskTimings,
    ) -> Result<DistanceMatrix<T>, CalcError> {
        // Ranks past the plan would only idle, so they are never created.
        let size = plan(query.len(), worker_count).effective_workers;
        debug!(requested = worker_count, size, "starting participants");
        let kernel = self.config.kernel;
        let mut endpoints = star::<T>(size)
            .into_iter()
            .map(|t| t.with_recv_timeout(self.config.recv_timeout));
        let coordinator_end = endpoints
            .next()
            .ok_or_else(|| CalcError::transport("no coordinator endpoint"))?;

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(size - 1);
            for endpoint in endpoints {
                let handle = thread::Builder::new()
                    .name(format!("worker-{}", handles.len() + 1))
                    .spawn_scoped(scope, move || -> Result<WorkerOutcome, CalcError> {
                        Worker::new(endpoint, kernel, timings)?.serve()
                    })?;
                handles.push(handle);
            }

            let result = Coordinator::new(coordinator_end, kernel, timings)
                .and_then(|mut coordinator| coordinator.run(query, dataset, metric));

            let mut worker_error = None;
            for (i, handle) in handles.into_iter().enumerate() {
                let rank = i + 1;
                match handle.join() {
                    Ok(Ok(outcome)) => debug!(rank, ?outcome, "worker finished"),
                    Ok(Err(err)) => {
                        warn!(rank, %err, "worker failed");
                        worker_error.get_or_insert(err);
                    }
                    Err(_) => {
                        worker_error.get_or_insert(CalcError::transport(format!("worker {rank} panicked")));
                    }
                }
            }

            let matrix = result?;
            match worker_error {
                Some(err) => Err(err),
                None => Ok(matrix),
            }
        })
    }
}
