use tracing_subscriber::EnvFilter;

/// Install the global subscriber for the benchmark binaries.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. Lines carry no
/// timestamp or target since the `info` output is the run report itself.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}
