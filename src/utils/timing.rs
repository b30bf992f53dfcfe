//! Per-run collector of named task durations.
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TaskPerformance {
    pub duration: Duration,
    pub calls: u32,
}

/// Accumulates how long each named task took and how often it ran.
///
/// Lives for one run and is passed by reference into the instrumented code;
/// safe to share across worker threads.
#[derive(Debug)]
pub struct TaskTimings {
    enabled: bool,
    tasks: Mutex<BTreeMap<String, TaskPerformance>>,
}

impl Default for TaskTimings {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskTimings {
    pub fn new() -> Self {
        Self {
            enabled: true,
            tasks: Mutex::new(BTreeMap::new()),
        }
    }

    /// A collector that ignores every record.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            tasks: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record(&self, name: &str, elapsed: Duration, calls: u32) {
        if !self.enabled {
            return;
        }
        let mut tasks = self.tasks.lock();
        let entry = tasks.entry(name.to_string()).or_default();
        entry.duration += elapsed;
        entry.calls += calls;
    }

    /// Runs `task` and records its wall time under `name`.
    pub fn time<R>(&self, name: &str, task: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let out = task();
        self.record(name, start.elapsed(), 1);
        out
    }

    pub fn get(&self, name: &str) -> Option<TaskPerformance> {
        self.tasks.lock().get(name).copied()
    }

    pub fn snapshot(&self) -> Vec<(String, TaskPerformance)> {
        self.tasks
            .lock()
            .iter()
            .map(|(name, perf)| (name.clone(), *perf))
            .collect()
    }

    pub fn log_summary(&self) {
        for (name, perf) in self.snapshot() {
            info!(task = %name, calls = perf.calls, secs = perf.duration.as_secs_f64(), "task timing");
        }
    }

    /// Appends one line per task to `path`, creating the file if needed.
    pub fn append_to(&self, path: &Path) -> io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        for (name, perf) in self.snapshot() {
            writeln!(
                file,
                "Task: {} | count of call: {} | duration: {}",
                name,
                perf.calls,
                perf.duration.as_secs_f64()
            )?;
        }
        Ok(())
    }
}
