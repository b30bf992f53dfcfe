use std::fs;
use std::time::Duration;

use distcalc::table_io::csv::{load_table, write_table};
use distcalc::table_io::random::random_table;
use distcalc::utils::errors::CalcError;
use distcalc::utils::timing::TaskTimings;
use distcalc::utils::types::Table;
use tempfile::tempdir;

#[test]
fn test_csv_write_then_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("matrix.csv");
    let table: Table<f64> = vec![vec![1.5, -2.0, 3.25], vec![0.0, 4.0, 1e-3]];

    write_table(&path, &table).unwrap();
    assert_eq!(load_table::<f64>(&path).unwrap(), table);
}

#[test]
fn test_csv_trailing_commas_and_blank_lines() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("query.csv");
    fs::write(&path, "1, 2, 3,\n4,5,6\n\n7 ,8, 9,\n").unwrap();

    let table = load_table::<i32>(&path).unwrap();
    assert_eq!(table, vec![vec![1, 2, 3], vec![4, 5, 6], vec![7, 8, 9]]);
}

#[test]
fn test_csv_bad_cell_is_reported() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.csv");
    fs::write(&path, "1,2\n3,abc\n").unwrap();

    let err = load_table::<f32>(&path).unwrap_err();
    match err {
        CalcError::InvalidTable(msg) => {
            assert!(msg.contains("row 2"), "{msg}");
            assert!(msg.contains("column 2"), "{msg}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_csv_missing_file() {
    let dir = tempdir().unwrap();
    assert!(load_table::<f32>(&dir.path().join("absent.csv")).is_err());
}

#[test]
fn test_random_table_shape_and_seed() {
    let a = random_table::<f32>(5, 3, -1.0..1.0, Some(42));
    let b = random_table::<f32>(5, 3, -1.0..1.0, Some(42));
    let c = random_table::<f32>(5, 3, -1.0..1.0, Some(43));

    assert_eq!(a.len(), 5);
    assert!(a.iter().all(|row| row.len() == 3));
    assert!(a.iter().flatten().all(|v| (-1.0..=1.0).contains(v)));
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn test_timings_accumulate() {
    let timings = TaskTimings::new();
    assert_eq!(timings.time("load", || 7), 7);
    timings.time("load", || ());
    timings.record("gather", Duration::from_millis(5), 2);

    let load = timings.get("load").unwrap();
    assert_eq!(load.calls, 2);
    let gather = timings.get("gather").unwrap();
    assert_eq!(gather.calls, 2);
    assert_eq!(gather.duration, Duration::from_millis(5));

    let names: Vec<_> = timings.snapshot().into_iter().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["gather", "load"]);
}

#[test]
fn test_disabled_timings_record_nothing() {
    let timings = TaskTimings::disabled();
    assert!(!timings.is_enabled());
    timings.time("load", || ());
    assert!(timings.snapshot().is_empty());
}

#[test]
fn test_timings_append_to_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("timings.txt");
    let timings = TaskTimings::new();
    timings.record("compute_distance", Duration::from_secs(1), 3);

    timings.append_to(&path).unwrap();
    timings.append_to(&path).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "Task: compute_distance | count of call: 3 | duration: 1");
}
