//! Active-operation counters with batched latency history.
//!
//! Every completed operation feeds a long-lived counter and a rolling batch.
//! Full batches are stamped with a sequence id and filed into a fixed-size
//! circular history (`id % history_length`), with the slowest and fastest
//! batches by average latency kept alongside.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use courier_common::StatsSettings;
use super::tick::{calculate_delta, now_ticks};

/// Lock-free running totals
#[derive(Debug)]
pub struct StatsCounter {
    count: AtomicU64,
    errors: AtomicU64,
    total_ms: AtomicU64,
    min_ms: AtomicU64,
    max_ms: AtomicU64,
}

impl StatsCounter {
    pub fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            total_ms: AtomicU64::new(0),
            min_ms: AtomicU64::new(u64::MAX),
            max_ms: AtomicU64::new(0),
        }
    }

    pub fn record(&self, delta_ms: u32) {
        let delta = delta_ms as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_ms.fetch_add(delta, Ordering::Relaxed);
        self.min_ms.fetch_min(delta, Ordering::Relaxed);
        self.max_ms.fetch_max(delta, Ordering::Relaxed);
    }

    pub fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn average_ms(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            return 0.0;
        }
        self.total_ms.load(Ordering::Relaxed) as f64 / count as f64
    }

    pub fn min_ms(&self) -> u64 {
        match self.min_ms.load(Ordering::Relaxed) {
            u64::MAX => 0,
            min => min,
        }
    }

    pub fn max_ms(&self) -> u64 {
        self.max_ms.load(Ordering::Relaxed)
    }
}

impl Default for StatsCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// One archived batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchStatistics {
    pub id: u64,
    pub count: u64,
    pub errors: u64,
    pub total_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
}

impl BatchStatistics {
    fn record(&mut self, delta_ms: u32) {
        let delta = delta_ms as u64;
        self.min_ms = if self.count == 0 { delta } else { self.min_ms.min(delta) };
        self.max_ms = self.max_ms.max(delta);
        self.count += 1;
        self.total_ms += delta;
    }

    pub fn average_ms(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.total_ms as f64 / self.count as f64
    }
}

/// Point-in-time view of a [`StatsContainer`]
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub active: i64,
    pub count: u64,
    pub errors: u64,
    pub average_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub batches_archived: u64,
    pub slowest: Option<BatchStatistics>,
    pub fastest: Option<BatchStatistics>,
    /// Archived batches, oldest first
    pub history: Vec<BatchStatistics>,
}

pub struct StatsContainer {
    settings: StatsSettings,
    active: AtomicI64,
    current: StatsCounter,
    batch: Mutex<BatchStatistics>,
    batch_sequence: AtomicU64,
    history: RwLock<Vec<Option<BatchStatistics>>>,
    slowest: RwLock<Option<BatchStatistics>>,
    fastest: RwLock<Option<BatchStatistics>>,
}

impl StatsContainer {
    pub fn new(settings: StatsSettings) -> Self {
        let settings = StatsSettings {
            batch_size: settings.batch_size.max(1),
            history_length: settings.history_length.max(1),
        };

        Self {
            settings,
            active: AtomicI64::new(0),
            current: StatsCounter::new(),
            batch: Mutex::new(BatchStatistics::default()),
            batch_sequence: AtomicU64::new(0),
            history: RwLock::new(vec![None; settings.history_length]),
            slowest: RwLock::new(None),
            fastest: RwLock::new(None),
        }
    }

    /// Register the start of an operation and return its start tick.
    pub fn active_increment(&self) -> u32 {
        self.active.fetch_add(1, Ordering::SeqCst);
        now_ticks()
    }

    /// Register completion of an operation started at `start`.
    /// Returns the elapsed milliseconds.
    pub fn active_decrement(&self, start: u32) -> u32 {
        self.active.fetch_sub(1, Ordering::SeqCst);
        let delta = calculate_delta(now_ticks(), start);
        self.record(delta);
        delta
    }

    /// Increment-now, decrement-on-drop.
    pub fn track(&self) -> ActiveGuard<'_> {
        let start = self.active_increment();
        ActiveGuard { container: self, start }
    }

    pub fn error_increment(&self) {
        self.current.error();
        self.batch.lock().errors += 1;
    }

    pub fn active_count(&self) -> i64 {
        self.active.load(Ordering::SeqCst)
    }

    pub fn error_count(&self) -> u64 {
        self.current.errors()
    }

    pub fn completed_count(&self) -> u64 {
        self.current.count()
    }

    fn record(&self, delta_ms: u32) {
        self.current.record(delta_ms);

        let full = {
            let mut batch = self.batch.lock();
            batch.record(delta_ms);
            if batch.count >= self.settings.batch_size as u64 {
                let mut full = std::mem::take(&mut *batch);
                full.id = self.batch_sequence.fetch_add(1, Ordering::SeqCst);
                Some(full)
            } else {
                None
            }
        };

        if let Some(full) = full {
            self.archive(full);
        }
    }

    fn archive(&self, batch: BatchStatistics) {
        let slot = (batch.id % self.settings.history_length as u64) as usize;
        self.history.write()[slot] = Some(batch.clone());

        {
            let mut slowest = self.slowest.write();
            if slowest.as_ref().map_or(true, |s| batch.average_ms() > s.average_ms()) {
                *slowest = Some(batch.clone());
            }
        }

        let mut fastest = self.fastest.write();
        if fastest.as_ref().map_or(true, |f| batch.average_ms() < f.average_ms()) {
            *fastest = Some(batch);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let mut history: Vec<BatchStatistics> = self
            .history
            .read()
            .iter()
            .flatten()
            .cloned()
            .collect();
        history.sort_by_key(|b| b.id);

        StatsSnapshot {
            active: self.active_count(),
            count: self.current.count(),
            errors: self.current.errors(),
            average_ms: self.current.average_ms(),
            min_ms: self.current.min_ms(),
            max_ms: self.current.max_ms(),
            batches_archived: self.batch_sequence.load(Ordering::SeqCst),
            slowest: self.slowest.read().clone(),
            fastest: self.fastest.read().clone(),
            history,
        }
    }
}

impl Default for StatsContainer {
    fn default() -> Self {
        Self::new(StatsSettings::default())
    }
}

/// Decrements the owning container's active count when dropped.
pub struct ActiveGuard<'a> {
    container: &'a StatsContainer,
    start: u32,
}

impl ActiveGuard<'_> {
    pub fn start(&self) -> u32 {
        self.start
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.container.active_decrement(self.start);
    }
}
