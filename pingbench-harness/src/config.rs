use pingbench_bus::ConnectOptions;
use pingbench_common::{
    PingBenchError, Result, TlsOptions, Topology, DEFAULT_SERVICE_HOST, DEFAULT_URL, MIN_MSG_SIZE,
};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Requests per second the latency run aims for.
pub const DEFAULT_TARGET_RATE: u64 = 1000;

/// Request size in bytes, counting 8 bytes for the number field.
pub const DEFAULT_MSG_SIZE: usize = MIN_MSG_SIZE;

pub const DEFAULT_DURATION: Duration = Duration::from_secs(5);

/// Shortest measured run; the iteration count is whole seconds times the rate.
pub const MIN_DURATION: Duration = Duration::from_secs(1);

/// Most requests a latency run may issue; every sample is held in memory.
pub const MAX_ITERATIONS: u64 = 100_000_000;

/// Requests each publisher issues in a throughput run.
pub const DEFAULT_NUM_MSGS: u64 = 100_000;

pub const DEFAULT_NUM_PUBS: usize = 1;

pub const DEFAULT_NUM_SUBS: usize = 0;

/// TLS and credential settings shared by both drivers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityConfig {
    /// Use TLS without verifying the server certificate.
    pub secure: bool,
    pub ca_file: Option<PathBuf>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    /// File holding the bus credentials token.
    pub creds_file: Option<PathBuf>,
}

impl SecurityConfig {
    pub fn has_tls(&self) -> bool {
        self.secure || self.ca_file.is_some() || self.cert_file.is_some() || self.key_file.is_some()
    }

    /// Bus connection options, with the token from `creds_file` if one is set.
    pub fn connect_options(&self, name: &str) -> Result<ConnectOptions> {
        let options = ConnectOptions::default().with_name(name);
        let Some(path) = &self.creds_file else {
            return Ok(options);
        };
        let token = std::fs::read_to_string(path).map_err(|e| {
            PingBenchError::ConnectionFailure(format!(
                "Unable to read credentials {}: {e}",
                path.display()
            ))
        })?;
        let token = token.trim();
        if token.is_empty() {
            return Err(PingBenchError::InvalidConfig(format!(
                "credentials file {} is empty",
                path.display()
            )));
        }
        Ok(options.with_credentials(token))
    }

    pub fn tls_options(&self) -> TlsOptions {
        TlsOptions {
            insecure: self.secure,
            ca_file: self.ca_file.clone(),
            cert_file: self.cert_file.clone(),
            key_file: self.key_file.clone(),
        }
    }
}

/// Settings of a latency run, fixed before the run starts.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkConfig {
    /// Endpoint the requests are published on.
    pub publish_url: String,
    /// Endpoint the echo responder listens on.
    pub subscribe_url: String,
    pub target_rate: u64,
    pub msg_size: usize,
    pub duration: Duration,
    /// Base path of the `.raw` and `.histogram` artifacts.
    pub hist_file: Option<PathBuf>,
    pub security: SecurityConfig,
    pub topology: Topology,
    /// Subject the echo responder is registered on.
    pub service: String,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            publish_url: DEFAULT_URL.to_string(),
            subscribe_url: DEFAULT_URL.to_string(),
            target_rate: DEFAULT_TARGET_RATE,
            msg_size: DEFAULT_MSG_SIZE,
            duration: DEFAULT_DURATION,
            hist_file: None,
            security: SecurityConfig::default(),
            topology: Topology::default(),
            service: DEFAULT_SERVICE_HOST.to_string(),
        }
    }
}

impl BenchmarkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.msg_size < MIN_MSG_SIZE {
            return Err(PingBenchError::InvalidConfig(format!(
                "Message Payload Size must be at least {MIN_MSG_SIZE} bytes"
            )));
        }
        if self.target_rate == 0 {
            return Err(PingBenchError::InvalidConfig(
                "Target Publish Rate must be greater than zero".to_string(),
            ));
        }
        if self.duration < MIN_DURATION {
            return Err(PingBenchError::InvalidConfig(format!(
                "Test duration must be at least {MIN_DURATION:?}"
            )));
        }
        match self.duration.as_secs().checked_mul(self.target_rate) {
            Some(iterations) if iterations <= MAX_ITERATIONS => Ok(()),
            _ => Err(PingBenchError::InvalidConfig(format!(
                "Target Publish Rate times Test duration must not exceed {MAX_ITERATIONS} messages"
            ))),
        }
    }

    /// Number of requests in the run: whole seconds of `duration` times the rate.
    pub fn iterations(&self) -> u64 {
        self.duration.as_secs().saturating_mul(self.target_rate)
    }

    pub fn raw_path(&self) -> Option<PathBuf> {
        self.hist_file.as_deref().map(|p| with_suffix(p, ".raw"))
    }

    pub fn histogram_path(&self) -> Option<PathBuf> {
        self.hist_file.as_deref().map(|p| with_suffix(p, ".histogram"))
    }
}

/// Settings of a throughput run.
#[derive(Debug, Clone, PartialEq)]
pub struct ThroughputConfig {
    /// Comma-separated endpoint list every worker connects with.
    pub urls: String,
    pub publishers: usize,
    pub subscribers: usize,
    /// Requests per publisher.
    pub messages: u64,
    pub security: SecurityConfig,
    pub topology: Topology,
    /// Print a `#` to stderr every thousand requests per publisher.
    pub progress: bool,
}

impl Default for ThroughputConfig {
    fn default() -> Self {
        Self {
            urls: DEFAULT_URL.to_string(),
            publishers: DEFAULT_NUM_PUBS,
            subscribers: DEFAULT_NUM_SUBS,
            messages: DEFAULT_NUM_MSGS,
            security: SecurityConfig::default(),
            topology: Topology::default(),
            progress: true,
        }
    }
}

impl ThroughputConfig {
    pub fn validate(&self) -> Result<()> {
        if self.publishers == 0 {
            return Err(PingBenchError::InvalidConfig(
                "at least one publisher is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Read a cluster [`Topology`] from a JSON file.
pub fn load_topology(path: &Path) -> Result<Topology> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        PingBenchError::InvalidConfig(format!("Unable to read topology {}: {e}", path.display()))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        PingBenchError::InvalidConfig(format!("Invalid topology {}: {e}", path.display()))
    })
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}
