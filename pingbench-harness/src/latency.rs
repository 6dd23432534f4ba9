use pingbench_bus::{Cluster, Connection};
use pingbench_client::BusClient;
use pingbench_common::{PingBenchError, Result};
use pingbench_server::{create_router, BusResponder};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::BenchmarkConfig;
use crate::format::{bps, byte_size, fmt_dur, rps};
use crate::histogram::{aggregate, LatencySummary, REPORT_PERCENTILES};
use crate::probe::{wait_for_route, ProbeOutcome, DEFAULT_ROUTE_WAIT};
use crate::sampler::LatencySampler;

const SEPARATOR: &str = "==============================";

/// Everything a latency run measured.
#[derive(Debug)]
pub struct LatencyReport {
    pub iterations: u64,
    pub probe: ProbeOutcome,
    pub summary: LatencySummary,
    /// Whole requests per second actually achieved.
    pub actual_rate: u64,
    /// From the start of the run until the first request was issued.
    pub first_sent: Duration,
    /// Duration of the measured loop.
    pub elapsed: Duration,
}

/// Run a latency benchmark against the echo service on `cluster`.
///
/// Requests are published through `config.publish_url` and answered by a
/// responder attached at `config.subscribe_url`. Measurement starts only after
/// the responder's interest has reached the publishing node.
pub async fn run(
    config: &BenchmarkConfig,
    cluster: &Cluster,
    cancel: CancellationToken,
) -> Result<LatencyReport> {
    let run_start = Instant::now();
    config.validate()?;
    if config.security.has_tls() {
        warn!("TLS options have no effect on mem:// endpoints");
    }

    let publisher = connect(cluster, &config.publish_url, config, "pingbench-pub")?;
    // Registered before the probe subscription, so it has propagated by the
    // time the probe succeeds.
    publisher.prepare_requests().await?;
    let client = BusClient::new(publisher.clone(), config.service.clone());

    let subscriber = connect(cluster, &config.subscribe_url, config, "pingbench-sub")?;
    let responder_cancel = cancel.child_token();
    let _stop_responder = responder_cancel.clone().drop_guard();
    BusResponder::serve(subscriber.clone(), &config.service, create_router(), responder_cancel)?;

    info!("{SEPARATOR}");
    info!("Pub Server RTT : {:?}", fmt_dur(timed_flush(&publisher).await?));
    info!("Sub Server RTT : {:?}", fmt_dur(timed_flush(&subscriber).await?));

    subscriber.flush().await?;
    let probe = wait_for_route(&publisher, &subscriber, DEFAULT_ROUTE_WAIT).await?;

    let rate = config.target_rate;
    let msg_size = config.msg_size as u64;
    info!("Message Payload: {}", byte_size(msg_size));
    info!("Target Duration: {:?}", config.duration);
    info!("Target Msgs/Sec: {}", rate);
    info!("Target Band/Sec: {}", bps(rate.saturating_mul(msg_size).saturating_mul(2)));
    info!("{SEPARATOR}");

    let iterations = config.iterations();
    let sampler = LatencySampler::new(Arc::new(client), config.msg_size);
    let run = tokio::select! {
        run = sampler.run(iterations, rate) => run?,
        _ = cancel.cancelled() => {
            return Err(PingBenchError::RpcFailure("benchmark interrupted".to_string()));
        }
    };

    let raw_path = config.raw_path();
    let histogram_path = config.histogram_path();
    let summary = aggregate(run.samples, raw_path.as_deref(), histogram_path.as_deref())?;

    info!("HDR Percentiles:");
    for p in REPORT_PERCENTILES {
        let value = Duration::from_nanos(summary.value_at_quantile(p));
        info!("{:<10}{:?}", format!("{p}:"), fmt_dur(value));
    }
    info!("{SEPARATOR}");

    let actual_rate = rps(iterations, run.elapsed);
    let first_sent = run.started.saturating_duration_since(run_start);
    info!("Actual Msgs/Sec: {}", actual_rate);
    info!("Actual Band/Sec: {}", bps(actual_rate.saturating_mul(msg_size).saturating_mul(2)));
    info!("Minimum Latency: {:?}", fmt_dur(Duration::from_nanos(summary.min())));
    info!("Median Latency : {:?}", fmt_dur(Duration::from_nanos(summary.median() as u64)));
    info!("Maximum Latency: {:?}", fmt_dur(Duration::from_nanos(summary.max())));
    info!("1st Sent Wall Time : {:?}", fmt_dur(first_sent));
    info!("Last Sent Wall Time: {:?}", fmt_dur(run.elapsed));
    info!("Last Recv Wall Time: {:?}", fmt_dur(run.elapsed));

    Ok(LatencyReport { iterations, probe, summary, actual_rate, first_sent, elapsed: run.elapsed })
}

fn connect(cluster: &Cluster, url: &str, config: &BenchmarkConfig, name: &str) -> Result<Connection> {
    let options = config.security.connect_options(name)?;
    cluster.connect(url, options).map_err(|e| {
        PingBenchError::ConnectionFailure(format!("Could not connect to {url}: {e}"))
    })
}

async fn timed_flush(conn: &Connection) -> Result<Duration> {
    let start = Instant::now();
    conn.flush().await?;
    Ok(start.elapsed())
}
