use std::ops::Range;

use crate::transport::COORDINATOR;
use crate::utils::types::Rank;

/// Worker count assumed when the caller reports none available.
pub const DEFAULT_WORKERS: usize = 2;

/// Every participating worker gets at least this many rows.
pub const MIN_ROWS_PER_WORKER: usize = 1;

/// Contiguous slice of the query set owned by one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub worker_index: Rank,
    pub row_start: usize,
    pub row_count: usize,
}

impl Partition {
    pub fn rows(&self) -> Range<usize> {
        self.row_start..self.row_start + self.row_count
    }
}

/// How the query rows of one run are spread over the participants.
///
/// Workers `1..effective_workers` take `block_size` rows each in rank order
/// starting at row 0; the coordinator keeps whatever is left, so its slice
/// is never smaller than a worker's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    pub total_rows: usize,
    pub block_size: usize,
    pub effective_workers: usize,
}

/// `available_workers` counts the coordinator; 0 falls back to [`DEFAULT_WORKERS`].
pub fn plan(total_rows: usize, available_workers: usize) -> Plan {
    let available = resolve_workers(available_workers);
    let max_workers = total_rows.div_ceil(MIN_ROWS_PER_WORKER);
    let effective_workers = available.min(max_workers).max(1);
    Plan {
        total_rows,
        block_size: total_rows / effective_workers,
        effective_workers,
    }
}

pub fn resolve_workers(available_workers: usize) -> usize {
    if available_workers == 0 {
        DEFAULT_WORKERS
    } else {
        available_workers
    }
}

impl Plan {
    /// Rows left to the coordinator after every worker took its block.
    pub fn coordinator_rows(&self) -> usize {
        self.total_rows - self.block_size * (self.effective_workers - 1)
    }

    pub fn participates(&self, rank: Rank) -> bool {
        rank < self.effective_workers
    }

    pub fn partition(&self, rank: Rank) -> Option<Partition> {
        if !self.participates(rank) {
            return None;
        }
        if rank == COORDINATOR {
            let row_start = self.block_size * (self.effective_workers - 1);
            return Some(Partition {
                worker_index: COORDINATOR,
                row_start,
                row_count: self.coordinator_rows(),
            });
        }
        Some(Partition {
            worker_index: rank,
            row_start: self.block_size * (rank - 1),
            row_count: self.block_size,
        })
    }

    /// All partitions in gather order: workers ascending, coordinator last.
    pub fn partitions(&self) -> Vec<Partition> {
        (1..self.effective_workers)
            .chain(std::iter::once(COORDINATOR))
            .filter_map(|rank| self.partition(rank))
            .collect()
    }
}
