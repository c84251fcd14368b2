use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::models::{ConnectionError, ConnectionState, ConnectionStats, ConnectionStatusView};
use super::backoff::BackoffPolicy;

/// What the driver should do after a failed attempt or a dropped connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { attempt: u32, delay: Duration },
    GiveUp,
}

/// Synchronous core of the connection lifecycle.
///
/// Owns the state, the consecutive-failure counter and the last error. It
/// never touches the transport or timers; the async driver feeds it outcomes
/// and acts on the returned decisions.
#[derive(Debug, Clone)]
pub struct ConnectionStateMachine {
    policy: BackoffPolicy,
    state: ConnectionState,
    attempt: u32,
    last_error: Option<ConnectionError>,
    last_connected: Option<DateTime<Utc>>,
    last_disconnected: Option<DateTime<Utc>>,
    reconnections: u64,
}

impl ConnectionStateMachine {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            state: ConnectionState::Disconnected,
            attempt: 0,
            last_error: None,
            last_connected: None,
            last_disconnected: None,
            reconnections: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn last_error(&self) -> Option<&ConnectionError> {
        self.last_error.as_ref()
    }

    pub fn reconnections(&self) -> u64 {
        self.reconnections
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Move to `connecting`. Returns false when an attempt is already in
    /// flight or the connection is up.
    pub fn begin_connect(&mut self) -> bool {
        if !self.state.accepts_connect() {
            return false;
        }
        self.state = ConnectionState::Connecting;
        true
    }

    pub fn connect_succeeded(&mut self, now: DateTime<Utc>) {
        if self.attempt > 0 {
            self.reconnections += 1;
        }
        self.attempt = 0;
        self.last_error = None;
        self.last_connected = Some(now);
        self.state = ConnectionState::Connected;
    }

    pub fn connect_failed(&mut self, error: ConnectionError) -> RetryDecision {
        self.record_failure(error)
    }

    /// Unexpected drop of an established connection.
    pub fn connection_lost(&mut self, error: ConnectionError, now: DateTime<Utc>) -> RetryDecision {
        self.last_disconnected = Some(now);
        self.record_failure(error)
    }

    /// Explicit disconnect; valid from any state.
    pub fn disconnect(&mut self, now: DateTime<Utc>) {
        if self.state == ConnectionState::Connected {
            self.last_disconnected = Some(now);
        }
        self.attempt = 0;
        self.last_error = None;
        self.state = ConnectionState::Disconnected;
    }

    fn record_failure(&mut self, error: ConnectionError) -> RetryDecision {
        self.attempt = self.attempt.saturating_add(1);
        let retryable = error.retryable;
        self.last_error = Some(error);

        if !retryable || self.policy.attempts_exhausted(self.attempt) {
            self.state = ConnectionState::Failed;
            return RetryDecision::GiveUp;
        }

        self.state = ConnectionState::Reconnecting;
        RetryDecision::Retry {
            attempt: self.attempt,
            delay: self.policy.delay_for_attempt(self.attempt),
        }
    }

    /// Snapshot for observers. `stats.reconnections` is filled in here; the
    /// rest of `stats` comes from the caller.
    pub fn view(&self, mut stats: ConnectionStats) -> ConnectionStatusView {
        stats.reconnections = self.reconnections;
        ConnectionStatusView {
            state: self.state,
            reconnect_attempt: self.attempt,
            last_connected: self.last_connected,
            last_disconnected: self.last_disconnected,
            error: self.last_error.clone(),
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> ConnectionStateMachine {
        ConnectionStateMachine::new(BackoffPolicy::default())
    }

    fn transport_error() -> ConnectionError {
        ConnectionError::new("connection refused")
    }

    #[test]
    fn test_initial_state() {
        let m = machine();
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert_eq!(m.attempt(), 0);
        assert!(m.last_error().is_none());
    }

    #[test]
    fn test_connect_then_success() {
        let mut m = machine();
        assert!(m.begin_connect());
        assert_eq!(m.state(), ConnectionState::Connecting);
        m.connect_succeeded(Utc::now());
        assert_eq!(m.state(), ConnectionState::Connected);
        assert_eq!(m.reconnections(), 0);
    }

    #[test]
    fn test_connect_ignored_while_connected_or_connecting() {
        let mut m = machine();
        assert!(m.begin_connect());
        assert!(!m.begin_connect());
        m.connect_succeeded(Utc::now());
        assert!(!m.begin_connect());
        assert_eq!(m.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_failures_follow_backoff_sequence() {
        let mut m = machine();
        m.begin_connect();
        let mut delays = Vec::new();
        for _ in 0..6 {
            match m.connect_failed(transport_error()) {
                RetryDecision::Retry { delay, .. } => delays.push(delay.as_millis() as u64),
                RetryDecision::GiveUp => panic!("gave up early"),
            }
            assert_eq!(m.state(), ConnectionState::Reconnecting);
            assert!(m.begin_connect());
        }
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000, 16000]);
        assert_eq!(m.attempt(), 6);
    }

    #[test]
    fn test_success_resets_attempt_counter() {
        let mut m = machine();
        m.begin_connect();
        m.connect_succeeded(Utc::now());

        let first = m.connection_lost(transport_error(), Utc::now());
        assert_eq!(first, RetryDecision::Retry { attempt: 1, delay: Duration::from_millis(1000) });
        assert_eq!(m.attempt(), 1);

        m.begin_connect();
        m.connect_succeeded(Utc::now());
        assert_eq!(m.attempt(), 0);
        assert_eq!(m.reconnections(), 1);

        let second = m.connection_lost(transport_error(), Utc::now());
        assert_eq!(second, RetryDecision::Retry { attempt: 1, delay: Duration::from_millis(1000) });
    }

    #[test]
    fn test_manual_connect_keeps_attempt_counter() {
        let mut m = machine();
        m.begin_connect();
        m.connect_failed(transport_error());
        m.begin_connect();
        m.connect_failed(transport_error());
        assert_eq!(m.attempt(), 2);

        // user-initiated retry while reconnecting
        assert!(m.begin_connect());
        let decision = m.connect_failed(transport_error());
        assert_eq!(decision, RetryDecision::Retry { attempt: 3, delay: Duration::from_millis(4000) });
    }

    #[test]
    fn test_gives_up_after_attempt_cap() {
        let mut m = ConnectionStateMachine::new(BackoffPolicy { max_attempts: 2, ..Default::default() });
        m.begin_connect();
        assert!(matches!(m.connect_failed(transport_error()), RetryDecision::Retry { .. }));
        m.begin_connect();
        assert!(matches!(m.connect_failed(transport_error()), RetryDecision::Retry { .. }));
        m.begin_connect();
        assert_eq!(m.connect_failed(transport_error()), RetryDecision::GiveUp);
        assert_eq!(m.state(), ConnectionState::Failed);
        assert_eq!(m.last_error().unwrap().message, "connection refused");

        // failed still permits a manual attempt
        assert!(m.begin_connect());
    }

    #[test]
    fn test_non_retryable_error_fails_immediately() {
        let mut m = machine();
        m.begin_connect();
        let mut err = ConnectionError::new("401 Unauthorized");
        err.retryable = false;
        assert_eq!(m.connect_failed(err), RetryDecision::GiveUp);
        assert_eq!(m.state(), ConnectionState::Failed);
    }

    #[test]
    fn test_disconnect_from_any_state() {
        let mut m = machine();
        m.begin_connect();
        m.connect_failed(transport_error());
        m.disconnect(Utc::now());
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert_eq!(m.attempt(), 0);

        m.begin_connect();
        m.connect_succeeded(Utc::now());
        m.disconnect(Utc::now());
        assert!(m.view(ConnectionStats::default()).last_disconnected.is_some());
    }

    #[test]
    fn test_disconnect_from_failed_clears_error() {
        let mut m = ConnectionStateMachine::new(BackoffPolicy { max_attempts: 1, ..Default::default() });
        m.begin_connect();
        m.connect_failed(transport_error());
        m.begin_connect();
        assert_eq!(m.connect_failed(transport_error()), RetryDecision::GiveUp);
        assert_eq!(m.state(), ConnectionState::Failed);

        m.disconnect(Utc::now());
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert_eq!(m.attempt(), 0);
        assert!(m.last_error().is_none());
        assert!(m.begin_connect());
    }

    #[test]
    fn test_view_carries_error_and_attempt() {
        let mut m = machine();
        m.begin_connect();
        m.connect_failed(transport_error());
        let view = m.view(ConnectionStats { events_processed: 7, ..Default::default() });
        assert_eq!(view.state, ConnectionState::Reconnecting);
        assert_eq!(view.reconnect_attempt, 1);
        assert_eq!(view.stats.events_processed, 7);
        assert!(view.error.is_some());
    }
}
