use itertools::Itertools;

use crate::utils::errors::CalcError;
use crate::utils::types::{Table, Vector};

/// Concatenates rows in row order.
pub fn flatten<T: Copy>(table: &[Vector<T>]) -> Vec<T> {
    let mut flat = Vec::with_capacity(table.iter().map(Vec::len).sum());
    for row in table {
        flat.extend_from_slice(row);
    }
    flat
}

/// Rebuilds `rows` rows of `row_len` elements from a row-major buffer.
///
/// The row count is explicit so that `R x 0` tables survive the round trip.
pub fn split_rows<T: Copy>(flat: &[T], rows: usize, row_len: usize) -> Result<Table<T>, CalcError> {
    let expected = rows
        .checked_mul(row_len)
        .ok_or_else(|| CalcError::transport(format!("{rows} x {row_len} overflows")))?;
    if flat.len() != expected {
        return Err(CalcError::transport(format!(
            "flat buffer holds {} elements, {rows} rows of {row_len} need {expected}",
            flat.len()
        )));
    }
    if row_len == 0 {
        return Ok(vec![Vec::new(); rows]);
    }
    Ok(flat.chunks_exact(row_len).map(<[T]>::to_vec).collect_vec())
}
