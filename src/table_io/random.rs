use std::ops::Range;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::utils::types::{Scalar, Table};

/// `rows x dim` table of values drawn uniformly from `range`.
///
/// The same seed always yields the same table; `None` seeds from the OS.
pub fn random_table<T: Scalar>(rows: usize, dim: usize, range: Range<f64>, seed: Option<u64>) -> Table<T> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    (0..rows)
        .map(|_| {
            (0..dim)
                .map(|_| T::narrow(rng.random_range(range.clone())))
                .collect()
        })
        .collect()
}
