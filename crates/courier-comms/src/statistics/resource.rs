//! Resource statistics and adaptive throttling.
//!
//! Every throttled operation against a shared resource (a broker namespace, a
//! storage account) is bracketed by [`ResourceStatistics::start`] and
//! [`ResourceStatistics::end`], with [`ResourceStatistics::retry`] signalled
//! on each transient failure in between. The live retry population is turned
//! into a single admission factor:
//!
//! ```text
//! ratio = retry_ratio / rate_limit_cutout_percentage
//! ratio >= 1  -> 0.0   (stop admitting work)
//! ratio <= 0  -> 1.0   (full rate)
//! otherwise   -> 1.0 - ratio
//! ```
//!
//! There is no smoothing: each call recomputes from the current population.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use courier_common::{ResourceProfile, StatsSettings};
use super::container::{StatsContainer, StatsSnapshot};
use super::tick::{calculate_delta, now_ticks};
use crate::comms_metrics;

/// Why an operation had to be retried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResourceRetryReason {
    Timeout,
    Throttle,
    Other,
}

/// How a tracked operation finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResourceRequestResult {
    Success,
    RetryExceeded,
    Exception,
    Timeout,
}

/// Retry and timing record for one in-flight operation.
#[derive(Debug)]
pub struct ResourceRequestTrack {
    pub id: Uuid,
    pub profile_id: String,
    pub name: String,
    pub group: Option<String>,
    pub start: u32,
    retry_count: AtomicU32,
    retry_time_ms: AtomicU64,
    last_reason: Mutex<Option<ResourceRetryReason>>,
}

impl ResourceRequestTrack {
    pub fn new(profile_id: &str, name: &str, group: Option<&str>, start: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            profile_id: profile_id.to_string(),
            name: name.to_string(),
            group: group.map(str::to_string),
            start,
            retry_count: AtomicU32::new(0),
            retry_time_ms: AtomicU64::new(0),
            last_reason: Mutex::new(None),
        }
    }

    pub fn retry_signal(&self, delta_ms: u32, reason: ResourceRetryReason) {
        self.retry_count.fetch_add(1, Ordering::SeqCst);
        self.retry_time_ms.fetch_add(delta_ms as u64, Ordering::SeqCst);
        *self.last_reason.lock() = Some(reason);
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::SeqCst)
    }

    pub fn retry_time_ms(&self) -> u64 {
        self.retry_time_ms.load(Ordering::SeqCst)
    }

    pub fn last_reason(&self) -> Option<ResourceRetryReason> {
        *self.last_reason.lock()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceStatisticsSnapshot {
    pub id: String,
    pub rate_limit_cutout_percentage: f64,
    pub active: usize,
    pub retry_total: u64,
    pub retry_ratio: f64,
    pub rate_limit_adjustment_percentage: f64,
    pub operations: StatsSnapshot,
}

/// Throttle statistics for one resource profile.
pub struct ResourceStatistics {
    id: String,
    rate_limit_cutout_percentage: f64,
    active: DashMap<Uuid, Arc<ResourceRequestTrack>>,
    container: StatsContainer,
}

impl ResourceStatistics {
    pub fn new(id: impl Into<String>, rate_limit_cutout_percentage: f64) -> Self {
        Self::with_stats_settings(id, rate_limit_cutout_percentage, StatsSettings::default())
    }

    pub fn with_stats_settings(
        id: impl Into<String>,
        rate_limit_cutout_percentage: f64,
        settings: StatsSettings,
    ) -> Self {
        let id = id.into();
        let cutout = if rate_limit_cutout_percentage > 0.0 {
            rate_limit_cutout_percentage
        } else {
            warn!(
                profile = %id,
                cutout = rate_limit_cutout_percentage,
                "Non-positive rate limit cutout, using 1.0"
            );
            1.0
        };

        Self {
            id,
            rate_limit_cutout_percentage: cutout,
            active: DashMap::new(),
            container: StatsContainer::new(settings),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn rate_limit_cutout_percentage(&self) -> f64 {
        self.rate_limit_cutout_percentage
    }

    /// Begin tracking an operation. Returns the trace id used by
    /// [`retry`](Self::retry) and [`end`](Self::end).
    pub fn start(&self, name: &str, group: Option<&str>, profile_id: &str) -> Uuid {
        let start = self.container.active_increment();
        let track = Arc::new(ResourceRequestTrack::new(profile_id, name, group, start));
        let id = track.id;
        self.active.insert(id, track);
        id
    }

    /// Signal a transient failure. Unknown trace ids are ignored since the
    /// operation may already have completed.
    pub fn retry(&self, name: &str, trace_id: Uuid, start: u32, reason: ResourceRetryReason) {
        self.container.error_increment();

        match self.active.get(&trace_id) {
            Some(track) => {
                track.retry_signal(calculate_delta(now_ticks(), start), reason);
            }
            None => {
                debug!(
                    profile = %self.id,
                    name = %name,
                    trace_id = %trace_id,
                    "Retry signalled for an operation that is no longer tracked"
                );
            }
        }
    }

    /// Finish tracking an operation. Timing uses the start tick recorded by
    /// [`start`](Self::start); ending an id that is not in flight (never
    /// started or already ended) leaves the counters untouched.
    pub fn end(&self, name: &str, trace_id: Uuid, _start: u32, result: ResourceRequestResult) {
        let Some((_, track)) = self.active.remove(&trace_id) else {
            debug!(profile = %self.id, name = %name, trace_id = %trace_id, "Ended untracked operation");
            return;
        };

        let elapsed = self.container.active_decrement(track.start);
        if result != ResourceRequestResult::Success {
            debug!(
                profile = %self.id,
                name = %name,
                result = ?result,
                retries = track.retry_count(),
                elapsed_ms = elapsed,
                "Tracked operation did not succeed"
            );
        }
    }

    /// Start tick of a tracked operation
    pub fn start_tick(&self, trace_id: Uuid) -> Option<u32> {
        self.active.get(&trace_id).map(|t| t.start)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn retry_total(&self) -> u64 {
        self.active.iter().map(|t| t.retry_count() as u64).sum()
    }

    /// Mean retry count across the operations currently in flight.
    /// Completed operations no longer count. Zero with nothing in flight.
    pub fn retry_ratio(&self) -> f64 {
        let (retries, active) = self
            .active
            .iter()
            .fold((0u64, 0usize), |(r, n), t| (r + t.retry_count() as u64, n + 1));

        if active == 0 {
            return 0.0;
        }
        (retries as f64 / active as f64).max(0.0)
    }

    /// Admission factor in `[0, 1]`.
    pub fn rate_limit_adjustment_percentage(&self) -> f64 {
        adjustment_for(self.retry_ratio(), self.rate_limit_cutout_percentage)
    }

    /// Point-in-time view. Also publishes the adjustment gauge.
    pub fn snapshot(&self) -> ResourceStatisticsSnapshot {
        let retry_ratio = self.retry_ratio();
        let adjustment = adjustment_for(retry_ratio, self.rate_limit_cutout_percentage);
        comms_metrics::set_rate_limit_adjustment(&self.id, adjustment);

        ResourceStatisticsSnapshot {
            id: self.id.clone(),
            rate_limit_cutout_percentage: self.rate_limit_cutout_percentage,
            active: self.active_count(),
            retry_total: self.retry_total(),
            retry_ratio,
            rate_limit_adjustment_percentage: adjustment,
            operations: self.container.snapshot(),
        }
    }
}

fn adjustment_for(retry_ratio: f64, cutout: f64) -> f64 {
    let ratio = retry_ratio / cutout;
    if ratio >= 1.0 {
        0.0
    } else if ratio <= 0.0 {
        1.0
    } else {
        1.0 - ratio
    }
}

/// Shared registry of resource statistics keyed by profile id.
pub struct ResourceTracker {
    profiles: DashMap<String, Arc<ResourceStatistics>>,
    settings: StatsSettings,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::with_stats_settings(StatsSettings::default())
    }

    pub fn with_stats_settings(settings: StatsSettings) -> Self {
        Self {
            profiles: DashMap::new(),
            settings,
        }
    }

    /// Register a profile, returning the existing statistics if already present.
    pub fn register(&self, id: &str, rate_limit_cutout_percentage: f64) -> Arc<ResourceStatistics> {
        self.profiles
            .entry(id.to_string())
            .or_insert_with(|| {
                Arc::new(ResourceStatistics::with_stats_settings(
                    id,
                    rate_limit_cutout_percentage,
                    self.settings,
                ))
            })
            .clone()
    }

    pub fn get(&self, id: &str) -> Option<Arc<ResourceStatistics>> {
        self.profiles.get(id).map(|s| s.clone())
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Most restrictive adjustment across the given profiles. Profiles that
    /// were never registered impose no limit.
    pub fn rate_limit_adjustment_percentage(&self, profiles: &[ResourceProfile]) -> f64 {
        profiles
            .iter()
            .filter_map(|p| self.get(&p.id))
            .map(|s| s.rate_limit_adjustment_percentage())
            .fold(1.0, f64::min)
    }

    pub fn snapshot(&self) -> Vec<ResourceStatisticsSnapshot> {
        let mut snapshots: Vec<_> = self.profiles.iter().map(|s| s.snapshot()).collect();
        snapshots.sort_by(|a, b| a.id.cmp(&b.id));
        snapshots
    }
}

impl Default for ResourceTracker {
    fn default() -> Self {
        Self::new()
    }
}
