use std::time::{Duration, Instant};

/// Added to every step so a delay near zero still moves.
const MIN_STEP: Duration = Duration::from_nanos(1);

/// Closed-loop publish throttle.
///
/// After every request the achieved rate since `run_start` is compared with the
/// target and the inter-request delay is nudged by 5% of its current value:
/// down (never below zero) when behind, up when ahead.
#[derive(Debug, Clone)]
pub struct RateController {
    target: u64,
    delay: Duration,
    run_start: Instant,
}

impl RateController {
    /// `target_rate` is in requests per second and must be non-zero.
    pub fn new(target_rate: u64, run_start: Instant) -> Self {
        let target = target_rate.max(1);
        Self { target, delay: Duration::from_nanos(1_000_000_000 / target), run_start }
    }

    pub fn target(&self) -> u64 {
        self.target
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Update the delay after `issued` requests, the latest started at `now`,
    /// and return how long the caller should pause.
    pub fn adjust(&mut self, issued: u64, now: Instant) -> Duration {
        let achieved = achieved_rate(issued, now.saturating_duration_since(self.run_start));
        let step = self.delay / 20 + MIN_STEP;
        let target = self.target as f64;
        if achieved < target {
            self.delay = self.delay.saturating_sub(step);
        } else if achieved > target {
            self.delay += step;
        }
        self.delay
    }

    /// [`adjust`](Self::adjust), then sleep for the resulting delay if it is non-zero.
    pub async fn throttle(&mut self, issued: u64, now: Instant) {
        let delay = self.adjust(issued, now);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Requests per second; infinite when no time has elapsed yet.
pub fn achieved_rate(issued: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs == 0.0 {
        return if issued == 0 { 0.0 } else { f64::INFINITY };
    }
    issued as f64 / secs
}
