use distcalc::cluster::partition::{DEFAULT_WORKERS, Partition, plan};

fn part(worker_index: usize, row_start: usize, row_count: usize) -> Partition {
    Partition { worker_index, row_start, row_count }
}

#[test]
fn test_plan_uneven_split_goes_to_coordinator() {
    let p = plan(10, 3);
    assert_eq!(p.block_size, 3);
    assert_eq!(p.effective_workers, 3);
    assert_eq!(p.coordinator_rows(), 4);
    assert_eq!(p.partitions(), vec![part(1, 0, 3), part(2, 3, 3), part(0, 6, 4)]);
}

#[test]
fn test_plan_even_split() {
    let p = plan(12, 4);
    assert_eq!(p.block_size, 3);
    assert_eq!(p.coordinator_rows(), 3);
    assert_eq!(p.partition(3), Some(part(3, 6, 3)));
    assert_eq!(p.partition(0), Some(part(0, 9, 3)));
}

#[test]
fn test_plan_never_exceeds_row_count() {
    let p = plan(2, 5);
    assert_eq!(p.effective_workers, 2);
    assert_eq!(p.block_size, 1);
    assert!(p.participates(1));
    assert!(!p.participates(2));
    assert_eq!(p.partition(4), None);
}

#[test]
fn test_plan_zero_workers_defaults() {
    let p = plan(7, 0);
    assert_eq!(p.effective_workers, DEFAULT_WORKERS);
    assert_eq!(p.block_size, 3);
    assert_eq!(p.coordinator_rows(), 4);
}

#[test]
fn test_plan_single_worker_keeps_everything() {
    let p = plan(9, 1);
    assert_eq!(p.effective_workers, 1);
    assert_eq!(p.block_size, 9);
    assert_eq!(p.partitions(), vec![part(0, 0, 9)]);
}

#[test]
fn test_plan_without_rows() {
    let p = plan(0, 4);
    assert_eq!(p.effective_workers, 1);
    assert_eq!(p.block_size, 0);
    assert_eq!(p.coordinator_rows(), 0);
    assert_eq!(p.partitions(), vec![part(0, 0, 0)]);
}

#[test]
fn test_partitions_cover_all_rows_in_order() {
    for total in 0..60 {
        for workers in 0..12 {
            let p = plan(total, workers);
            let parts = p.partitions();
            assert_eq!(parts.len(), p.effective_workers);

            let worker_rows: usize = parts[..parts.len() - 1].iter().map(|s| s.row_count).sum();
            assert_eq!(worker_rows + p.coordinator_rows(), total, "total {total}, workers {workers}");
            assert!(p.coordinator_rows() >= p.block_size);

            let mut next = 0;
            for slice in &parts {
                assert_eq!(slice.row_start, next, "gap before {slice:?}");
                next = slice.rows().end;
            }
            assert_eq!(next, total);
            assert_eq!(parts.last().map(|s| s.worker_index), Some(0));
        }
    }
}
