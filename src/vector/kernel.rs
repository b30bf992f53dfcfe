//! Distance matrix kernels: a sequential nested loop and a rayon row-parallel variant.
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

use crate::utils::errors::CalcError;
use crate::utils::types::{DistanceMatrix, DistanceMetric, Scalar, Vector};
use crate::vector::metric::{MetricFn, check_dimensions, metric_fn};

/// How a participant computes its slice of the distance matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Kernel {
    /// Row-major nested loop on the calling thread.
    #[default]
    Sequential,
    /// Query rows spread over a rayon pool. `threads == 0` uses the global pool.
    Parallel { threads: usize },
}

impl Kernel {
    pub fn parallel() -> Self {
        Kernel::Parallel { threads: 0 }
    }

    pub fn with_threads(threads: usize) -> Self {
        Kernel::Parallel { threads }
    }

    pub fn from_flag(parallel: bool, threads: usize) -> Self {
        if parallel {
            Kernel::with_threads(threads)
        } else {
            Kernel::Sequential
        }
    }

    pub fn is_parallel(&self) -> bool {
        matches!(self, Kernel::Parallel { .. })
    }

    /// Distances of each query vector from every dataset vector.
    pub fn compute_distance<T: Scalar>(
        &self,
        query: &[Vector<T>],
        dataset: &[Vector<T>],
        metric: DistanceMetric,
    ) -> Result<DistanceMatrix<T>, CalcError> {
        let distance = metric_fn::<T>(metric);
        match *self {
            Kernel::Sequential => compute_sequential(query, dataset, distance),
            Kernel::Parallel { threads: 0 } => compute_parallel(query, dataset, distance),
            Kernel::Parallel { threads } => {
                let pool = ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("kernel-{i}"))
                    .build()
                    .map_err(|e| CalcError::ThreadPool(e.to_string()))?;
                pool.install(|| compute_parallel(query, dataset, distance))
            }
        }
    }
}

fn compute_sequential<T: Scalar>(
    query: &[Vector<T>],
    dataset: &[Vector<T>],
    distance: MetricFn<T>,
) -> Result<DistanceMatrix<T>, CalcError> {
    let mut result = Vec::with_capacity(query.len());
    for q in query {
        let mut row = Vec::with_capacity(dataset.len());
        for d in dataset {
            check_dimensions(q, d)?;
            row.push(distance(q, d));
        }
        result.push(row);
    }
    Ok(result)
}

fn compute_parallel<T: Scalar>(
    query: &[Vector<T>],
    dataset: &[Vector<T>],
    distance: MetricFn<T>,
) -> Result<DistanceMatrix<T>, CalcError> {
    let cancelled = AtomicBool::new(false);
    let mut result: DistanceMatrix<T> = vec![Vec::new(); query.len()];

    result
        .par_iter_mut()
        .zip(query.par_iter())
        .for_each(|(out, q)| {
            if cancelled.load(Ordering::Acquire) {
                return;
            }
            let mut row = Vec::with_capacity(dataset.len());
            for d in dataset {
                if q.len() != d.len() {
                    cancelled.store(true, Ordering::Release);
                    return;
                }
                row.push(distance(q, d));
            }
            *out = row;
        });

    if cancelled.load(Ordering::Acquire) {
        // Rows may have stopped out of order; report what the sequential scan would.
        if let Some(err) = first_mismatch(query, dataset) {
            return Err(err);
        }
    }
    Ok(result)
}

/// The first mismatching (query, dataset) pair in row-major order.
pub fn first_mismatch<T>(query: &[Vector<T>], dataset: &[Vector<T>]) -> Option<CalcError> {
    query
        .iter()
        .flat_map(|q| dataset.iter().map(move |d| (q, d)))
        .find_map(|(q, d)| check_dimensions(q, d).err())
}
