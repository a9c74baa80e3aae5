//! Metrics for the dispatch core
//!
//! Prometheus-compatible counters and gauges for transmissions, client
//! starts, listener revalidation and throttle signals.

use metrics::{counter, gauge};
use courier_common::Direction;

pub fn record_transmit(channel_id: &str, success: bool) {
    counter!(
        "courier_transmit_total",
        "channel" => channel_id.to_string(),
        "result" => if success { "success" } else { "failure" }
    )
    .increment(1);
}

pub fn record_client_start(channel_id: &str, direction: Direction) {
    counter!(
        "courier_client_starts_total",
        "channel" => channel_id.to_string(),
        "direction" => direction.to_string()
    )
    .increment(1);
}

pub fn record_listener_revalidation(channel_id: &str) {
    counter!(
        "courier_listener_revalidations_total",
        "channel" => channel_id.to_string()
    )
    .increment(1);
}

pub fn record_messages_pulled(channel_id: &str, count: usize) {
    if count == 0 {
        return;
    }
    counter!(
        "courier_messages_pulled_total",
        "channel" => channel_id.to_string()
    )
    .increment(count as u64);
}

pub fn set_rate_limit_adjustment(profile: &str, value: f64) {
    gauge!(
        "courier_rate_limit_adjustment",
        "profile" => profile.to_string()
    )
    .set(value);
}
