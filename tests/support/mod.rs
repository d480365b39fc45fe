//! Shared fixtures for the relay integration tests

use queue_relay::{ReceiveSettings, Route};

/// Receive settings that never long-poll, so empty queues return at once
pub fn no_wait() -> ReceiveSettings {
    ReceiveSettings {
        batch_size: 10,
        wait_time_secs: 0,
    }
}

pub fn route(source: &str, destinations: &[&str], interval_secs: u64) -> Route {
    Route {
        source: source.to_string(),
        destinations: destinations.iter().map(ToString::to_string).collect(),
        interval_secs,
    }
}
