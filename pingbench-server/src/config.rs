use std::time::Duration;

/// Largest request or response body the echo service will buffer.
pub const MAX_BODY_SIZE: usize = 4_194_304;

/// Address the standalone server binds when `--address` is not given.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:8080";

/// How long the binary waits for in-flight requests after a shutdown signal.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
