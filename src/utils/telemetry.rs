use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

/// Installs a stderr subscriber honouring `RUST_LOG`.
///
/// Falls back to `debug` when `verbose` is set, `info` otherwise. Returns
/// false if a global subscriber was already installed.
pub fn init_subscriber(verbose: bool) -> bool {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}
