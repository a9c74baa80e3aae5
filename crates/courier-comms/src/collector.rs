//! Data collector - exception and event reporting
//!
//! Provides:
//! - The [`DataCollector`] trait injected into agents
//! - [`EventCollector`], a bounded in-memory event log with severity and
//!   category queries

use std::collections::VecDeque;
use std::error::Error;

use parking_lot::RwLock;
use tracing::debug;

use courier_common::{CollectorEvent, EventCategory, EventSeverity};

/// Sink for exceptions and notable events raised by the dispatch core
pub trait DataCollector: Send + Sync {
    fn event(&self, category: EventCategory, severity: EventSeverity, message: String, source: String);

    fn exception(&self, category: EventCategory, source: &str, error: &dyn Error) {
        self.event(category, EventSeverity::Error, error.to_string(), source.to_string());
    }
}

const DEFAULT_CAPACITY: usize = 1000;

/// Keeps the most recent `capacity` events in arrival order
pub struct EventCollector {
    events: RwLock<VecDeque<CollectorEvent>>,
    capacity: usize,
}

impl EventCollector {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: RwLock::new(VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY))),
            capacity,
        }
    }

    /// Record an event and return its id. The oldest event is dropped when
    /// the log is full.
    pub fn add_event(
        &self,
        category: EventCategory,
        severity: EventSeverity,
        message: String,
        source: String,
    ) -> String {
        let event = CollectorEvent::new(category, severity, message, source);
        let id = event.id.clone();

        let mut events = self.events.write();
        if events.len() >= self.capacity {
            events.pop_front();
        }
        debug!(id = %id, category = ?category, severity = ?severity, "Collected event");
        events.push_back(event);
        id
    }

    /// Every retained event, oldest first
    pub fn get_all(&self) -> Vec<CollectorEvent> {
        self.events.read().iter().cloned().collect()
    }

    pub fn get_by_severity(&self, severity: EventSeverity) -> Vec<CollectorEvent> {
        self.filtered(|e| e.severity == severity)
    }

    pub fn get_by_category(&self, category: EventCategory) -> Vec<CollectorEvent> {
        self.filtered(|e| e.category == category)
    }

    pub fn count(&self) -> usize {
        self.events.read().len()
    }

    pub fn count_by_severity(&self, severity: EventSeverity) -> usize {
        self.events.read().iter().filter(|e| e.severity == severity).count()
    }

    pub fn has_critical(&self) -> bool {
        self.events
            .read()
            .iter()
            .any(|e| e.severity == EventSeverity::Critical)
    }

    fn filtered(&self, predicate: impl Fn(&CollectorEvent) -> bool) -> Vec<CollectorEvent> {
        self.events.read().iter().filter(|e| predicate(e)).cloned().collect()
    }
}

impl Default for EventCollector {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl DataCollector for EventCollector {
    fn event(&self, category: EventCategory, severity: EventSeverity, message: String, source: String) {
        self.add_event(category, severity, message, source);
    }
}
