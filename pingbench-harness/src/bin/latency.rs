use clap::Parser;
use pingbench_bus::Cluster;
use pingbench_common::{Result, Topology, DEFAULT_SERVICE_HOST, DEFAULT_URL};
use pingbench_harness::config::{load_topology, DEFAULT_MSG_SIZE, DEFAULT_TARGET_RATE};
use pingbench_harness::{latency, logging, BenchmarkConfig, SecurityConfig};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = "pingbench-latency", about = "Measure echo round-trip latency at a fixed request rate")]
struct Args {
    /// Endpoint requests are published on.
    #[arg(long = "sa", default_value = DEFAULT_URL)]
    publish_url: String,

    /// Endpoint the echo responder subscribes on.
    #[arg(long = "sb", default_value = DEFAULT_URL)]
    subscribe_url: String,

    /// Target requests per second.
    #[arg(long = "tr", default_value_t = DEFAULT_TARGET_RATE)]
    target_rate: u64,

    /// Request size in bytes (at least 8).
    #[arg(long = "sz", default_value_t = DEFAULT_MSG_SIZE)]
    msg_size: usize,

    /// Test duration, e.g. `5s` or `1m`.
    #[arg(long = "tt", value_parser = humantime::parse_duration, default_value = "5s")]
    duration: Duration,

    /// Base path for the `.raw` and `.histogram` output files.
    #[arg(long)]
    hist: Option<PathBuf>,

    /// Use TLS without certificate verification.
    #[arg(long)]
    secure: bool,

    /// TLS certificate CA file.
    #[arg(long)]
    tls_ca: Option<PathBuf>,

    /// TLS private key file.
    #[arg(long)]
    tls_key: Option<PathBuf>,

    /// TLS certificate file.
    #[arg(long)]
    tls_cert: Option<PathBuf>,

    /// Credentials file.
    #[arg(long)]
    creds: Option<PathBuf>,

    /// JSON file describing the bus cluster; a single `local` node by default.
    #[arg(long)]
    topology: Option<PathBuf>,

    /// Subject the echo service is registered on.
    #[arg(long, default_value = DEFAULT_SERVICE_HOST)]
    service: String,
}

impl Args {
    fn into_config(self) -> Result<BenchmarkConfig> {
        let topology = match &self.topology {
            Some(path) => load_topology(path)?,
            None => Topology::default(),
        };
        Ok(BenchmarkConfig {
            publish_url: self.publish_url,
            subscribe_url: self.subscribe_url,
            target_rate: self.target_rate,
            msg_size: self.msg_size,
            duration: self.duration,
            hist_file: self.hist,
            security: SecurityConfig {
                secure: self.secure,
                ca_file: self.tls_ca,
                cert_file: self.tls_cert,
                key_file: self.tls_key,
                creds_file: self.creds,
            },
            topology,
            service: self.service,
        })
    }
}

async fn run(args: Args, cancel: CancellationToken) -> Result<()> {
    let config = args.into_config()?;
    config.validate()?;
    let cluster = Cluster::new(&config.topology)?;
    latency::run(&config, &cluster, cancel).await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    logging::init();

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    if let Err(e) = run(args, cancel).await {
        error!("{e}");
        process::exit(1);
    }
}
