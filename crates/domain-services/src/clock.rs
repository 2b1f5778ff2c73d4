//! Monotonic microsecond timestamps.
//!
//! Registry timestamps are plain `u64` microseconds since a process-wide
//! epoch so tests can drive liveness and wake ordering with literal values.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Microseconds on the monotonic clock.
pub type Micros = u64;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Current monotonic time in microseconds.
pub fn usec_now() -> Micros {
    let epoch = *EPOCH.get_or_init(Instant::now);
    duration_micros(epoch.elapsed())
}

/// Saturating conversion of a duration to microseconds.
pub fn duration_micros(d: Duration) -> Micros {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}
