use std::time::Duration;

use crate::rate::achieved_rate;

const BYTE_SUFFIXES: [&str; 5] = ["B", "K", "M", "G", "T"];
const BIT_RATE_SUFFIXES: [&str; 5] = ["Bps", "Kbps", "Mbps", "Gbps", "Tbps"];

/// Human-readable size with base-1024 suffixes, e.g. `8B`, `1.5K`, `10M`.
pub fn byte_size(n: u64) -> String {
    scaled(n, &BYTE_SUFFIXES)
}

/// Human-readable bit rate for `n` bytes per second, e.g. `125Kbps`.
pub fn bps(n: u64) -> String {
    scaled(n.saturating_mul(8), &BIT_RATE_SUFFIXES)
}

fn scaled(n: u64, suffixes: &[&str; 5]) -> String {
    if n < 10 {
        return format!("{n}{}", suffixes[0]);
    }
    let base = 1024_f64;
    let exp = ((n as f64).ln() / base.ln()).floor().min(4.0);
    let val = ((n as f64) / base.powf(exp) * 10.0 + 0.5).floor() / 10.0;
    let suffix = suffixes[exp as usize];
    if val < 10.0 {
        format!("{val:.1}{suffix}")
    } else {
        format!("{val:.0}{suffix}")
    }
}

/// `n` with thousands separators, e.g. `1,234,567`.
pub fn comma_format(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Truncate to whole microseconds for display.
pub fn fmt_dur(d: Duration) -> Duration {
    d - Duration::from_nanos(u64::from(d.subsec_nanos() % 1_000))
}

/// Whole requests per second.
pub fn rps(count: u64, elapsed: Duration) -> u64 {
    achieved_rate(count, elapsed) as u64
}

/// Nanoseconds as fractional milliseconds.
pub fn ns_to_ms(ns: u64) -> f64 {
    ns as f64 / 1_000_000.0
}
