use std::path::Path;

use ::csv::{ReaderBuilder, Trim, WriterBuilder};

use crate::utils::errors::CalcError;
use crate::utils::types::{Scalar, Table, Vector};

/// Loads a headerless CSV file where every non-empty cell is a number.
///
/// Empty cells (trailing commas included) are skipped, so rows written as
/// `1, 2, 3,` load as three values.
pub fn load_table<T: Scalar>(path: &Path) -> Result<Table<T>, CalcError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)?;

    let mut table = Vec::new();
    for (row_idx, record) in reader.records().enumerate() {
        let record = record?;
        let row = record
            .iter()
            .enumerate()
            .filter(|(_, cell)| !cell.is_empty())
            .map(|(col_idx, cell)| {
                cell.parse::<T>().map_err(|_| {
                    CalcError::InvalidTable(format!(
                        "{}: row {}, column {}: cannot parse {cell:?}",
                        path.display(),
                        row_idx + 1,
                        col_idx + 1
                    ))
                })
            })
            .collect::<Result<Vector<T>, _>>()?;
        if !row.is_empty() {
            table.push(row);
        }
    }
    Ok(table)
}

/// Writes one CSV record per row.
pub fn write_table<T: Scalar>(path: &Path, table: &[Vector<T>]) -> Result<(), CalcError> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    for row in table {
        writer.write_record(row.iter().map(ToString::to_string))?;
    }
    writer.flush()?;
    Ok(())
}
