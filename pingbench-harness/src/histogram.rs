use hdrhistogram::Histogram;
use pingbench_common::{PingBenchError, Result};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::warn;

use crate::format::ns_to_ms;

/// Significant value digits kept by the latency histogram.
pub const SIGNIFICANT_DIGITS: u8 = 5;

/// Percentiles written to the distribution file.
pub const PERCENTILES: [f64; 12] =
    [10.0, 25.0, 50.0, 75.0, 90.0, 99.0, 99.9, 99.99, 99.999, 99.9999, 99.99999, 100.0];

/// Percentiles logged at the end of a run.
pub const REPORT_PERCENTILES: [f64; 11] =
    [10.0, 50.0, 75.0, 90.0, 99.0, 99.9, 99.99, 99.999, 99.9999, 99.99999, 100.0];

/// Multiplier turning nanoseconds into milliseconds.
pub const NANOS_TO_MILLIS: f64 = 1.0 / 1_000_000.0;

/// Sorted latency samples and the histogram built from them.
pub struct LatencySummary {
    sorted: Vec<u64>,
    histogram: Histogram<u64>,
    median: f64,
}

impl fmt::Debug for LatencySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LatencySummary")
            .field("count", &self.sorted.len())
            .field("min", &self.min())
            .field("max", &self.max())
            .field("median", &self.median)
            .finish_non_exhaustive()
    }
}

impl LatencySummary {
    /// Sort `samples` (nanoseconds) and build the histogram over `[1, max]`.
    pub fn build(mut samples: Vec<u64>) -> Result<Self> {
        samples.sort_unstable();
        let median = median_ns(&samples)?;
        let max = samples.last().copied().unwrap_or(1);

        let mut histogram = Histogram::<u64>::new_with_bounds(1, max.max(2), SIGNIFICANT_DIGITS)
            .map_err(|e| PingBenchError::InvalidConfig(format!("latency histogram: {e}")))?;
        for &sample in &samples {
            histogram
                .record(sample)
                .map_err(|e| PingBenchError::InvalidConfig(format!("latency histogram: {e}")))?;
        }
        Ok(Self { sorted: samples, histogram, median })
    }

    /// Latency at `quantile` percent, `0.0..=100.0`.
    ///
    /// Quantile 0 reports the lower edge of the smallest sample's bucket, every
    /// other quantile the upper edge of its bucket, so the extremes bracket the
    /// samples.
    pub fn value_at_quantile(&self, quantile: f64) -> u64 {
        let quantile = quantile.clamp(0.0, 100.0);
        let value = self.histogram.value_at_percentile(quantile);
        if quantile == 0.0 {
            self.histogram.lowest_equivalent(value)
        } else {
            value
        }
    }

    pub fn min(&self) -> u64 {
        self.sorted.first().copied().unwrap_or_default()
    }

    pub fn max(&self) -> u64 {
        self.sorted.last().copied().unwrap_or_default()
    }

    pub fn median(&self) -> f64 {
        self.median
    }

    pub fn count(&self) -> usize {
        self.sorted.len()
    }

    pub fn sorted(&self) -> &[u64] {
        &self.sorted
    }

    /// Write the percentile table at [`PERCENTILES`], values multiplied by `scale`.
    pub fn write_distribution_file(&self, path: &Path, scale: f64) -> Result<()> {
        let file = File::create(path).map_err(|e| write_failure(path, e))?;
        let mut out = BufWriter::new(file);
        self.write_distribution(&mut out, scale).map_err(|e| write_failure(path, e))
    }

    fn write_distribution(&self, out: &mut impl Write, scale: f64) -> std::io::Result<()> {
        let h = &self.histogram;
        let total = h.len();
        writeln!(out, "{:>12} {:>14} {:>12} {:>18}", "Value", "Percentile", "TotalCount", "1/(1-Percentile)")?;
        writeln!(out)?;
        for &p in &PERCENTILES {
            let value = self.value_at_quantile(p) as f64 * scale;
            let count = ((p / 100.0) * total as f64 + 0.5) as u64;
            let one_by = if p < 100.0 { 1.0 / (1.0 - p / 100.0) } else { f64::INFINITY };
            writeln!(out, "{value:>12.3} {:>14.10} {count:>12} {one_by:>18.2}", p / 100.0)?;
        }
        writeln!(
            out,
            "#[Min     = {:>12.3}, Max            = {:>12.3}]",
            self.min() as f64 * scale,
            self.max() as f64 * scale
        )?;
        writeln!(
            out,
            "#[Mean    = {:>12.3}, StdDeviation   = {:>12.3}]",
            h.mean() * scale,
            h.stdev() * scale
        )?;
        writeln!(out, "#[Total count    = {total:>12}]")?;
        out.flush()
    }
}

/// Median of an ascending sequence; the mean of the two central values when
/// the length is even.
pub fn median_ns(sorted: &[u64]) -> Result<f64> {
    let len = sorted.len();
    if len == 0 {
        return Err(PingBenchError::EmptySampleSet);
    }
    if len % 2 == 0 {
        Ok((sorted[len / 2 - 1] as f64 + sorted[len / 2] as f64) / 2.0)
    } else {
        Ok(sorted[len / 2] as f64)
    }
}

/// Write `samples` in their given order, one millisecond value per line.
pub fn write_raw_file(path: &Path, samples: &[u64]) -> Result<()> {
    let file = File::create(path).map_err(|e| write_failure(path, e))?;
    let mut out = BufWriter::new(file);
    for &ns in samples {
        writeln!(out, "{:.6}", ns_to_ms(ns)).map_err(|e| write_failure(path, e))?;
    }
    out.flush().map_err(|e| write_failure(path, e))
}

/// Persist the raw samples, summarize them and persist the distribution.
///
/// Artifact write failures are logged and do not fail the run.
pub fn aggregate(
    samples: Vec<u64>,
    raw_path: Option<&Path>,
    histogram_path: Option<&Path>,
) -> Result<LatencySummary> {
    if samples.is_empty() {
        return Err(PingBenchError::EmptySampleSet);
    }
    if let Some(path) = raw_path {
        if let Err(e) = write_raw_file(path, &samples) {
            warn!("{}", e);
        }
    }

    let summary = LatencySummary::build(samples)?;

    if let Some(path) = histogram_path {
        if let Err(e) = summary.write_distribution_file(path, NANOS_TO_MILLIS) {
            warn!("{}", e);
        }
    }
    Ok(summary)
}

fn write_failure(path: &Path, err: std::io::Error) -> PingBenchError {
    PingBenchError::ArtifactWriteFailure { path: path.display().to_string(), reason: err.to_string() }
}
