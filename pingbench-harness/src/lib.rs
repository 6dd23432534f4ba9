//! Measurement engine of the PingBench harness.
//!
//! The latency driver ([`latency::run`]) waits for the responder's interest to
//! reach the publishing node ([`probe`]), issues paced echo requests
//! ([`sampler`], [`rate`]) and summarizes the round trips ([`histogram`]).
//! The throughput driver ([`load::run`]) runs concurrent publishers and
//! responders behind start and finish barriers ([`sync`]).

pub mod config;
pub mod format;
pub mod histogram;
pub mod latency;
pub mod load;
pub mod logging;
pub mod probe;
pub mod rate;
pub mod sampler;
pub mod sync;
pub mod transport;

pub use config::{BenchmarkConfig, SecurityConfig, ThroughputConfig};
pub use histogram::LatencySummary;
pub use latency::LatencyReport;
pub use load::ThroughputReport;
pub use probe::{wait_for_route, ProbeOutcome};
pub use rate::RateController;
pub use sampler::{Clock, LatencySampler, MonotonicClock};
pub use sync::WaitGroup;
pub use transport::{BusTransport, HttpTransport, Transport};
