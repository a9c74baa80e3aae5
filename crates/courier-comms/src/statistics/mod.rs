//! Statistics for clients and shared resources
//!
//! - `tick`: wrapping millisecond ticks and wraparound-safe deltas
//! - `container`: active counters with batched history
//! - `resource`: per-profile retry tracking and the throttle signal

pub mod container;
pub mod resource;
pub mod tick;

pub use container::{ActiveGuard, BatchStatistics, StatsContainer, StatsCounter, StatsSnapshot};
pub use resource::{
    ResourceRequestResult, ResourceRequestTrack, ResourceRetryReason, ResourceStatistics,
    ResourceStatisticsSnapshot, ResourceTracker,
};
pub use tick::{calculate_delta, now_ticks};
