//! Millisecond tick counter.
//!
//! Ticks are a `u32` of milliseconds since a process-wide monotonic epoch and
//! wrap roughly every 49.7 days, so every elapsed-time calculation must go
//! through [`calculate_delta`].

use std::sync::OnceLock;
use std::time::Instant;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Current tick value. Truncation to `u32` is the wraparound.
pub fn now_ticks() -> u32 {
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_millis() as u32
}

/// Elapsed milliseconds from `start` to `now`, correct across one wraparound.
pub fn calculate_delta(now: u32, start: u32) -> u32 {
    if now < start {
        (u32::MAX - start) + now + 1
    } else {
        now - start
    }
}

/// Elapsed milliseconds since `start`.
pub fn elapsed_since(start: u32) -> u32 {
    calculate_delta(now_ticks(), start)
}
