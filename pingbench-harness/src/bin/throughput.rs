use clap::Parser;
use pingbench_bus::Cluster;
use pingbench_client::ClientConfig;
use pingbench_common::{Result, Topology, DEFAULT_URL};
use pingbench_harness::config::{load_topology, DEFAULT_NUM_MSGS, DEFAULT_NUM_PUBS, DEFAULT_NUM_SUBS};
use pingbench_harness::format::comma_format;
use pingbench_harness::{load, logging, BusTransport, HttpTransport, SecurityConfig, ThroughputConfig, Transport};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "pingbench-throughput", about = "Measure echo throughput with concurrent clients")]
struct Args {
    /// Server URLs, separated by commas. `http://` URLs use the HTTP echo server.
    #[arg(short = 's', long = "servers", default_value = DEFAULT_URL)]
    urls: String,

    /// Use a TLS connection without certificate verification.
    #[arg(long)]
    tls: bool,

    /// Number of concurrent clients.
    #[arg(long = "np", default_value_t = DEFAULT_NUM_PUBS)]
    publishers: usize,

    /// Number of concurrent echo responders.
    #[arg(long = "ns", default_value_t = DEFAULT_NUM_SUBS)]
    subscribers: usize,

    /// Requests each client publishes.
    #[arg(short = 'n', default_value_t = DEFAULT_NUM_MSGS)]
    messages: u64,

    /// Credentials file.
    #[arg(long)]
    creds: Option<PathBuf>,

    /// JSON file describing the bus cluster; a single `local` node by default.
    #[arg(long)]
    topology: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> Result<ThroughputConfig> {
        let topology = match &self.topology {
            Some(path) => load_topology(path)?,
            None => Topology::default(),
        };
        let urls = self.urls.split(',').map(str::trim).collect::<Vec<_>>().join(",");
        Ok(ThroughputConfig {
            urls,
            publishers: self.publishers,
            subscribers: self.subscribers,
            messages: self.messages,
            security: SecurityConfig { secure: self.tls, creds_file: self.creds, ..Default::default() },
            topology,
            progress: true,
        })
    }
}

fn build_transport(config: &ThroughputConfig) -> Result<Arc<dyn Transport>> {
    if config.urls.starts_with("http://") || config.urls.starts_with("https://") {
        let base_url = config.urls.split(',').next().unwrap_or_default();
        let mut client = ClientConfig::new(base_url);
        client.tls = config.security.tls_options();
        return Ok(Arc::new(HttpTransport::new(client)));
    }
    if config.security.has_tls() {
        warn!("TLS options have no effect on mem:// endpoints");
    }
    let cluster = Cluster::new(&config.topology)?;
    let options = config.security.connect_options("pingbench-throughput")?;
    Ok(Arc::new(BusTransport::new(cluster, config.urls.clone(), options)))
}

async fn run(args: Args, cancel: CancellationToken) -> Result<()> {
    let config = args.into_config()?;
    let transport = build_transport(&config)?;
    let report = load::run(transport, &config, cancel).await?;
    if config.progress {
        eprintln!();
    }
    info!(
        "throughput is {} msgs/sec (duration: {:.3}s)",
        comma_format(report.throughput() as i64),
        report.elapsed.as_secs_f64()
    );
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
