//! Time utilities.
//!
//! Exchange timestamps arrive as fractional Unix seconds; internally every
//! timestamp is **microseconds since Unix epoch**.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as **microseconds** since Unix epoch.
#[inline]
pub fn now_us() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_micros() as u64).unwrap_or_default()
}

/// Current time as **milliseconds** since Unix epoch.
#[inline]
pub fn now_ms() -> u64 {
    now_us() / 1_000
}

/// Convert fractional seconds (e.g. `1534614057.321597`) to microseconds.
///
/// Negative and non-finite inputs map to `None`.
pub fn secs_to_us(secs: f64) -> Option<u64> {
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some((secs * 1_000_000.0).round() as u64)
}
