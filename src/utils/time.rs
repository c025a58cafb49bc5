//! Monotonic timing helpers.
//!
//! Execution timings are carried as milliseconds with 3 decimal places,
//! always taken from a monotonic clock so branch accumulation never goes
//! backwards under wall-clock adjustments.

use std::time::Instant;

/// Milliseconds elapsed since `origin`, rounded to 3 decimal places.
#[must_use]
pub fn elapsed_ms(origin: Instant) -> f64 {
    round3(origin.elapsed().as_secs_f64() * 1000.0)
}

/// Round a millisecond value to 3 decimal places.
#[must_use]
pub fn round3(ms: f64) -> f64 {
    (ms * 1000.0).round() / 1000.0
}
