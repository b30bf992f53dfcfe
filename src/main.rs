//! `distcalc`: distances between big numerical vector sets.
//!
//! ```bash
//! # Single process, four in-process workers, parallel kernel
//! distcalc run --query q.csv --dataset d.csv --metric L2 --workers 4 --parallel
//!
//! # Random input, result printed to stdout
//! distcalc run --rows 8 --dim 3 --seed 7
//!
//! # Separate processes over TCP
//! distcalc coordinator --listen 0.0.0.0:7000 --workers 3 --metric L2 --query q.csv --dataset d.csv
//! distcalc worker --connect host:7000 --rank 1
//! distcalc worker --connect host:7000 --rank 2
//! ```
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use itertools::Itertools;
use tracing::{info, warn};

use distcalc::cluster::engine::{Engine, EngineConfig};
use distcalc::cluster::protocol::{Coordinator, Worker};
use distcalc::table_io::csv::{load_table, write_table};
use distcalc::table_io::random::random_table;
use distcalc::transport::tcp::{TcpRendezvous, TcpTransport};
use distcalc::utils::errors::CalcError;
use distcalc::utils::telemetry;
use distcalc::utils::timing::TaskTimings;
use distcalc::utils::types::{DistanceMetric, Rank, Table};
use distcalc::vector::kernel::Kernel;

type Value = f32;

const RANDOM_RANGE: std::ops::Range<f64> = -1000.0..1000.0;

#[derive(Parser, Debug)]
#[command(name = "distcalc")]
#[command(about = "The distances calculator tool, designed to calculate distances between big numerical vectors")]
struct Cli {
    /// Debug level logging (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute with in-process workers
    Run(JobArgs),
    /// Coordinate workers connecting over TCP
    Coordinator {
        /// Address to accept workers on
        #[arg(long)]
        listen: SocketAddr,

        #[command(flatten)]
        job: JobArgs,
    },
    /// Serve one worker rank for a TCP coordinator
    Worker(WorkerArgs),
}

#[derive(Args, Debug)]
struct KernelArgs {
    /// Compute rows in parallel within each participant
    #[arg(long)]
    parallel: bool,

    /// Kernel threads for --parallel (0 = one per core)
    #[arg(long, default_value = "0")]
    threads: usize,

    /// Fail a receive that waits longer than this many milliseconds
    #[arg(long)]
    recv_timeout_ms: Option<u64>,
}

impl KernelArgs {
    fn kernel(&self) -> Kernel {
        Kernel::from_flag(self.parallel, self.threads)
    }

    fn recv_timeout(&self) -> Option<Duration> {
        self.recv_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Args, Debug)]
struct JobArgs {
    /// CSV file with the query vectors (random if omitted)
    #[arg(long)]
    query: Option<PathBuf>,

    /// CSV file with the dataset vectors (random if omitted)
    #[arg(long)]
    dataset: Option<PathBuf>,

    /// Distance metric: L1, L2 or Hamming
    #[arg(long, default_value = "L1", value_parser = parse_metric)]
    metric: DistanceMetric,

    /// Output CSV file; the matrix is printed when omitted
    #[arg(long)]
    out: Option<PathBuf>,

    /// Participants, coordinator included
    #[arg(long, default_value = "1")]
    workers: usize,

    /// Rows of each random table
    #[arg(long, default_value = "16")]
    rows: usize,

    /// Dimension of random vectors
    #[arg(long, default_value = "8")]
    dim: usize,

    /// Seed for random tables
    #[arg(long)]
    seed: Option<u64>,

    /// Append task timings to this file
    #[arg(long)]
    timings: Option<PathBuf>,

    #[command(flatten)]
    kernel: KernelArgs,
}

#[derive(Args, Debug)]
struct WorkerArgs {
    /// Coordinator address
    #[arg(long)]
    connect: String,

    /// This worker's rank (1-based)
    #[arg(long)]
    rank: Rank,

    #[command(flatten)]
    kernel: KernelArgs,
}

fn parse_metric(s: &str) -> Result<DistanceMetric, CalcError> {
    s.parse()
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_subscriber(cli.verbose);

    match cli.command {
        Command::Run(job) => run_job(&job, |query, dataset, timings| {
            let engine = Engine::new(EngineConfig {
                kernel: job.kernel.kernel(),
                recv_timeout: job.kernel.recv_timeout(),
            });
            Ok(engine.run_with_timings(query, dataset, job.metric, job.workers, timings)?)
        }),
        Command::Coordinator { listen, job } => run_job(&job, |query, dataset, timings| {
            let rendezvous = TcpRendezvous::bind(listen)?.with_recv_timeout(job.kernel.recv_timeout());
            info!(addr = %rendezvous.local_addr()?, workers = job.workers, "waiting for workers");
            let transport = rendezvous.accept::<Value>(job.workers)?;
            let mut coordinator = Coordinator::new(transport, job.kernel.kernel(), timings)?;
            Ok(coordinator.run(query, dataset, job.metric)?)
        }),
        Command::Worker(args) => serve_worker(&args),
    }
}

fn run_job(
    job: &JobArgs,
    compute: impl FnOnce(&Table<Value>, &Table<Value>, &TaskTimings) -> Result<Table<Value>>,
) -> Result<()> {
    check_arguments(job)?;
    show_summary(job);

    let timings = TaskTimings::new();
    let (query, dataset) = timings.time("load_tables", || load_tables(job))?;

    info!("Compute distances.");
    let matrix = timings.time("run", || compute(&query, &dataset, &timings))?;

    match &job.out {
        Some(out) => {
            info!(path = %out.display(), "Write distance matrix in out file.");
            write_table(out, &matrix).with_context(|| format!("writing {}", out.display()))?;
        }
        None => display_result(&matrix)?,
    }

    if let Some(path) = &job.timings {
        timings.log_summary();
        timings
            .append_to(path)
            .with_context(|| format!("writing timings to {}", path.display()))?;
    }
    info!("The distance computing completed successfully.");
    Ok(())
}

fn serve_worker(args: &WorkerArgs) -> Result<()> {
    let timings = TaskTimings::disabled();
    let transport = TcpTransport::<Value>::connect(args.connect.as_str(), args.rank, args.kernel.recv_timeout())
        .with_context(|| format!("connecting to {}", args.connect))?;
    let mut worker = Worker::new(transport, args.kernel.kernel(), &timings)?;
    let outcome = worker.serve()?;
    info!(rank = args.rank, ?outcome, "worker done");
    Ok(())
}

fn check_arguments(job: &JobArgs) -> Result<()> {
    info!("Analyze parameters.");
    for path in [&job.query, &job.dataset].into_iter().flatten() {
        if !path.exists() {
            bail!("The input file does not exist. Path: {}", path.display());
        }
    }
    if let Some(out) = &job.out {
        if out.exists() {
            bail!("The output file already exists. File path: {}", out.display());
        }
    }
    if job.query.is_some() && job.query == job.dataset {
        warn!("The query and data set paths are equal.");
    }
    Ok(())
}

fn show_summary(job: &JobArgs) {
    let show = |p: &Option<PathBuf>| p.as_ref().map_or_else(|| "<random>".to_string(), |p| p.display().to_string());
    info!(
        query = %show(&job.query),
        dataset = %show(&job.dataset),
        out = %job.out.as_ref().map_or_else(|| "<stdout>".to_string(), |p| p.display().to_string()),
        metric = %job.metric,
        parallel = job.kernel.parallel,
        workers = job.workers,
        "execution summary"
    );
}

fn load_tables(job: &JobArgs) -> Result<(Table<Value>, Table<Value>)> {
    let load = |path: Option<&Path>, seed: Option<u64>| -> Result<Table<Value>> {
        match path {
            Some(path) => load_table(path).with_context(|| format!("loading {}", path.display())),
            None => Ok(random_table(job.rows, job.dim, RANDOM_RANGE, seed)),
        }
    };
    let query_seed = job.seed;
    let dataset_seed = job.seed.map(|s| s.wrapping_add(1));

    if !job.kernel.parallel {
        return Ok((
            load(job.query.as_deref(), query_seed)?,
            load(job.dataset.as_deref(), dataset_seed)?,
        ));
    }
    let (query, dataset) = rayon::join(
        || load(job.query.as_deref(), query_seed),
        || load(job.dataset.as_deref(), dataset_seed),
    );
    Ok((query?, dataset?))
}

fn display_result(matrix: &Table<Value>) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "The distance matrix:")?;
    writeln!(out)?;
    for row in matrix {
        writeln!(out, "{}", row.iter().join(", "))?;
    }
    Ok(())
}
