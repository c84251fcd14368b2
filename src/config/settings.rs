use std::time::Duration;

use crate::connection::backoff::{BackoffPolicy, DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_DELAY_MS, DEFAULT_MAX_RECONNECT_ATTEMPTS};
use crate::progress::DEFAULT_TOTAL_EXPECTED_NODES;
use crate::stream::DEFAULT_MAX_EVENTS;
use super::types::SongwatchConfig;

pub const DEFAULT_URL: &str = "ws://localhost:8000/ws/events";
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_PING_INTERVAL_MS: u64 = 30_000;

/// Fully resolved runtime settings.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    pub url: String,
    pub backoff: BackoffPolicy,
    pub connect_timeout: Duration,
    pub ping_interval: Duration,
    pub max_events: usize,
    pub total_expected_nodes: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            backoff: BackoffPolicy::default(),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            ping_interval: Duration::from_millis(DEFAULT_PING_INTERVAL_MS),
            max_events: DEFAULT_MAX_EVENTS,
            total_expected_nodes: DEFAULT_TOTAL_EXPECTED_NODES,
        }
    }
}

impl MonitorSettings {
    pub fn from_config(config: &SongwatchConfig) -> Self {
        let conn = config.connection.clone().unwrap_or_default();
        let stream = config.stream.clone().unwrap_or_default();
        let workflow = config.workflow.clone().unwrap_or_default();

        Self {
            url: conn.url.unwrap_or_else(|| DEFAULT_URL.to_string()),
            backoff: BackoffPolicy {
                base_delay: Duration::from_millis(conn.base_delay_ms.unwrap_or(DEFAULT_BASE_DELAY_MS)),
                max_delay: Duration::from_millis(conn.max_delay_ms.unwrap_or(DEFAULT_MAX_DELAY_MS)),
                max_attempts: conn.max_reconnect_attempts.unwrap_or(DEFAULT_MAX_RECONNECT_ATTEMPTS),
                jitter: Duration::from_millis(conn.jitter_ms.unwrap_or(0)),
            },
            connect_timeout: Duration::from_millis(conn.connect_timeout_ms.unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS)),
            ping_interval: Duration::from_millis(conn.ping_interval_ms.unwrap_or(DEFAULT_PING_INTERVAL_MS)),
            max_events: stream.max_events.unwrap_or(DEFAULT_MAX_EVENTS),
            total_expected_nodes: workflow.total_expected_nodes.unwrap_or(DEFAULT_TOTAL_EXPECTED_NODES),
        }
    }

    /// Apply command-line overrides on top of file/default values.
    pub fn with_overrides(mut self, url: Option<String>, max_events: Option<usize>) -> Self {
        if let Some(url) = url {
            self.url = url;
        }
        if let Some(max_events) = max_events {
            self.max_events = max_events.max(1);
        }
        self
    }
}
