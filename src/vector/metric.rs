use itertools::Itertools;

use crate::utils::errors::CalcError;
use crate::utils::types::{DistanceMetric, Scalar};

/// Pairwise distance with the dimension check already done by the caller.
pub type MetricFn<T> = fn(&[T], &[T]) -> T;

/// Main distance dispatcher
pub fn distance<T: Scalar>(a: &[T], b: &[T], metric: DistanceMetric) -> Result<T, CalcError> {
    check_dimensions(a, b)?;
    Ok(metric_fn(metric)(a, b))
}

/// Resolves the metric once so hot loops can skip the dispatch.
pub fn metric_fn<T: Scalar>(metric: DistanceMetric) -> MetricFn<T> {
    match metric {
        DistanceMetric::L1 => l1_distance,
        DistanceMetric::L2 => l2_distance,
        DistanceMetric::Hamming => hamming_distance,
    }
}

pub fn check_dimensions<T>(a: &[T], b: &[T]) -> Result<(), CalcError> {
    if a.len() != b.len() {
        return Err(CalcError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(())
}

/// Sum of absolute elementwise differences, accumulated in f64 so integer
/// inputs cannot overflow. Saturates at the bounds of `T`.
fn l1_distance<T: Scalar>(a: &[T], b: &[T]) -> T {
    let sum = a
        .iter()
        .zip_eq(b)
        .map(|(&x, &y)| (x.widen() - y.widen()).abs())
        .sum::<f64>();
    T::narrow(sum)
}

/// Euclidean distance, accumulated in f64 regardless of `T`.
fn l2_distance<T: Scalar>(a: &[T], b: &[T]) -> T {
    let sum = a
        .iter()
        .zip_eq(b)
        .map(|(&x, &y)| {
            let diff = x.widen() - y.widen();
            diff * diff
        })
        .sum::<f64>();
    T::narrow(sum.sqrt())
}

/// Count of positions whose elements differ (floats within epsilon are equal).
fn hamming_distance<T: Scalar>(a: &[T], b: &[T]) -> T {
    a.iter()
        .zip_eq(b)
        .filter(|&(&x, &y)| !x.same(y))
        .fold(T::zero(), |acc, _| acc + T::one())
}
