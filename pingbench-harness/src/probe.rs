use pingbench_bus::{new_inbox, Connection};
use pingbench_common::{PingBenchError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Pause between probe messages.
pub const PROBE_INTERVAL: Duration = Duration::from_millis(10);

/// How long to wait for interest to propagate before giving up.
pub const DEFAULT_ROUTE_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Both connections share a node; nothing to wait for.
    SameNode,
    /// A probe message published on one node reached the other.
    Routed { attempts: u64, elapsed: Duration },
}

/// Block until a subscription made on `subscriber` receives messages
/// published on `publisher`.
///
/// Subscriptions on one node become visible to the rest of a cluster only
/// after a propagation delay, and anything published before then is lost.
/// The probe subscribes to a fresh inbox subject and publishes to it every
/// [`PROBE_INTERVAL`] until one arrives, failing with
/// [`PingBenchError::RoutingTimeout`] once `max_wait` has passed.
pub async fn wait_for_route(
    publisher: &Connection,
    subscriber: &Connection,
    max_wait: Duration,
) -> Result<ProbeOutcome> {
    if publisher.server_id() == subscriber.server_id() {
        return Ok(ProbeOutcome::SameNode);
    }

    let subject = new_inbox();
    let routed = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&routed);
    let sub = subscriber.subscribe_with(&subject, move |_| {
        counter.fetch_add(1, Ordering::AcqRel);
    })?;

    let outcome = poll_route(publisher, subscriber, &subject, &routed, max_wait).await;
    sub.unsubscribe();
    outcome
}

async fn poll_route(
    publisher: &Connection,
    subscriber: &Connection,
    subject: &str,
    routed: &AtomicU64,
    max_wait: Duration,
) -> Result<ProbeOutcome> {
    subscriber.flush().await?;

    let start = Instant::now();
    let mut attempts = 0u64;
    while routed.load(Ordering::Acquire) == 0 {
        if start.elapsed() > max_wait {
            return Err(PingBenchError::RoutingTimeout {
                subject: subject.to_string(),
                waited_ms: max_wait.as_millis() as u64,
            });
        }
        publisher.publish(subject, Vec::<u8>::new())?;
        attempts += 1;
        tokio::time::sleep(PROBE_INTERVAL).await;
    }

    let elapsed = start.elapsed();
    debug!(subject, attempts, ?elapsed, "route established");
    Ok(ProbeOutcome::Routed { attempts, elapsed })
}
