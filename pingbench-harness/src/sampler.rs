use pingbench_client::EchoClient;
use pingbench_common::{PingRequest, Result, MIN_MSG_SIZE};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::rate::RateController;

/// Upper bound on the sample buffer reserved before the run starts.
const MAX_PREALLOCATED_SAMPLES: u64 = 1 << 20;

/// Source of send and receive timestamps. Abstracted so tests can use deterministic time.
pub trait Clock: Send + Sync {
    /// Nanoseconds since an arbitrary fixed origin; never goes backwards.
    fn now_nanos(&self) -> i64;
}

/// Production clock backed by `Instant`.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_nanos(&self) -> i64 {
        i64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(i64::MAX)
    }
}

/// Result of one measured loop.
#[derive(Debug, Clone)]
pub struct SampleRun {
    /// Round-trip latencies in nanoseconds, in issue order.
    pub samples: Vec<u64>,
    /// When the first request was about to be issued.
    pub started: Instant,
    /// From `started` until the last request completed and was throttled.
    pub elapsed: Duration,
}

/// Issues echo requests one at a time and times each round trip.
///
/// The send timestamp travels in the request's `number` field and the echoed
/// value is subtracted from the receive timestamp, so the measurement does not
/// depend on any state kept between send and receive.
pub struct LatencySampler {
    client: Arc<dyn EchoClient>,
    clock: Arc<dyn Clock>,
    msg_size: usize,
}

impl LatencySampler {
    pub fn new(client: Arc<dyn EchoClient>, msg_size: usize) -> Self {
        Self { client, clock: Arc::new(MonotonicClock::new()), msg_size }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run `iterations` round trips paced toward `target_rate` per second.
    /// The first failed request ends the run with its error.
    pub async fn run(&self, iterations: u64, target_rate: u64) -> Result<SampleRun> {
        let text = payload_text(self.msg_size);
        let capacity = usize::try_from(iterations.min(MAX_PREALLOCATED_SAMPLES)).unwrap_or(0);
        let mut samples = Vec::with_capacity(capacity);

        let started = Instant::now();
        let mut rate = RateController::new(target_rate, started);
        for issued in 1..=iterations {
            let issued_at = Instant::now();
            samples.push(self.sample(&text).await?);
            rate.throttle(issued, issued_at).await;
        }
        let elapsed = started.elapsed();
        debug!(iterations, ?elapsed, final_delay = ?rate.delay(), "sampling finished");
        Ok(SampleRun { samples, started, elapsed })
    }

    /// One timed round trip, in nanoseconds.
    pub async fn sample(&self, text: &str) -> Result<u64> {
        let sent = self.clock.now_nanos();
        let response = self.client.ping(PingRequest { number: sent, text: text.to_string() }).await?;
        let latency = self.clock.now_nanos().saturating_sub(response.number);
        Ok(u64::try_from(latency).unwrap_or(0))
    }
}

/// Random alphanumeric text that brings a request to `msg_size` bytes,
/// counting 8 bytes for the number field.
pub fn payload_text(msg_size: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(msg_size.saturating_sub(MIN_MSG_SIZE))
        .map(char::from)
        .collect()
}
