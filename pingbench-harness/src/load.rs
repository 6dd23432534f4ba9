use pingbench_common::{PingBenchError, PingRequest, Result};
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ThroughputConfig;
use crate::rate::achieved_rate;
use crate::sync::WaitGroup;
use crate::transport::Transport;

/// A progress mark is printed every this many requests per publisher.
pub const HASH_MODULO: u64 = 1000;

/// Number carried by every throughput request.
const PING_NUMBER: i64 = 22;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputReport {
    pub total_requests: u64,
    /// From the moment every worker was ready until the last publisher finished.
    pub elapsed: Duration,
}

impl ThroughputReport {
    /// Requests per second.
    pub fn throughput(&self) -> f64 {
        achieved_rate(self.total_requests, self.elapsed)
    }
}

/// State every publisher task shares with the driver.
#[derive(Clone)]
struct Publisher {
    transport: Arc<dyn Transport>,
    messages: u64,
    progress: bool,
    ready: WaitGroup,
    gate: WaitGroup,
    done: WaitGroup,
    issued: Arc<AtomicU64>,
    failures: mpsc::UnboundedSender<PingBenchError>,
    cancel: CancellationToken,
}

impl Publisher {
    async fn run(self, id: usize) {
        let client = match self.transport.client().await {
            Ok(client) => client,
            Err(e) => {
                self.failures.send(e).ok();
                return;
            }
        };
        debug!(publisher = id, "publisher ready");
        self.ready.done();
        self.gate.wait().await;

        for i in 0..self.messages {
            if self.cancel.is_cancelled() {
                return;
            }
            let request = PingRequest { number: PING_NUMBER, text: String::new() };
            if let Err(e) = client.ping(request).await {
                self.failures.send(e).ok();
                return;
            }
            self.issued.fetch_add(1, Ordering::Relaxed);
            if self.progress && i % HASH_MODULO == 0 {
                let mut stderr = std::io::stderr();
                write!(stderr, "#").ok();
                stderr.flush().ok();
            }
        }
        debug!(publisher = id, "publisher finished");
        self.done.done();
    }
}

/// Run the throughput benchmark: `subscribers` responders, then `publishers`
/// clients each issuing `messages` sequential requests.
///
/// Timing starts only once every responder is registered and every client is
/// built. The first worker error ends the run with that error. Responders
/// started here are stopped when the run returns.
pub async fn run(
    transport: Arc<dyn Transport>,
    config: &ThroughputConfig,
    cancel: CancellationToken,
) -> Result<ThroughputReport> {
    config.validate()?;
    let run_cancel = cancel.child_token();
    let _stop_workers = run_cancel.clone().drop_guard();
    let (failures, mut failed) = mpsc::unbounded_channel();

    let subscribers_ready = WaitGroup::new();
    subscribers_ready.add(config.subscribers);
    for id in 0..config.subscribers {
        let transport = Arc::clone(&transport);
        let ready = subscribers_ready.clone();
        let failures = failures.clone();
        let cancel = run_cancel.clone();
        tokio::spawn(async move {
            match transport.serve(cancel).await {
                Ok(()) => {
                    debug!(subscriber = id, "subscriber ready");
                    ready.done();
                }
                Err(e) => {
                    failures.send(e).ok();
                }
            }
        });
    }
    wait_or_fail(&subscribers_ready, &mut failed, &run_cancel).await?;

    let publisher = Publisher {
        transport,
        messages: config.messages,
        progress: config.progress,
        ready: WaitGroup::new(),
        gate: WaitGroup::new(),
        done: WaitGroup::new(),
        issued: Arc::new(AtomicU64::new(0)),
        failures,
        cancel: run_cancel.clone(),
    };
    publisher.ready.add(config.publishers);
    publisher.gate.add(1);
    publisher.done.add(config.publishers);
    for id in 0..config.publishers {
        tokio::spawn(publisher.clone().run(id));
    }

    info!("Starting benchmark");
    info!("msgs={}, pubs={}, subs={}", config.messages, config.publishers, config.subscribers);

    wait_or_fail(&publisher.ready, &mut failed, &run_cancel).await?;
    let start = Instant::now();
    publisher.gate.done();
    wait_or_fail(&publisher.done, &mut failed, &run_cancel).await?;
    let elapsed = start.elapsed();

    Ok(ThroughputReport { total_requests: publisher.issued.load(Ordering::Relaxed), elapsed })
}

async fn wait_or_fail(
    barrier: &WaitGroup,
    failed: &mut mpsc::UnboundedReceiver<PingBenchError>,
    cancel: &CancellationToken,
) -> Result<()> {
    tokio::select! {
        _ = barrier.wait() => Ok(()),
        Some(err) = failed.recv() => Err(err),
        _ = cancel.cancelled() => {
            Err(PingBenchError::RpcFailure("benchmark interrupted".to_string()))
        }
    }
}
