use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::models::ConnectionState;
use crate::utils::timer::{schedule_repeating, TimerHandle};
use super::backoff::BackoffPolicy;

const TICK: Duration = Duration::from_secs(1);

/// Seconds left until the next reconnect attempt, for display.
///
/// Feed it every `(state, reconnect_attempt)` pair the connection manager
/// publishes. While reconnecting it counts down once per second from the
/// attempt's backoff delay and stops at zero. A new attempt number restarts
/// the count; leaving `Reconnecting` clears it.
pub struct ReconnectCountdown {
    policy: BackoffPolicy,
    tracked_attempt: Option<u32>,
    timer: Option<TimerHandle>,
    remaining: Arc<watch::Sender<Option<u64>>>,
    // Ticks from a replaced timer are ignored
    generation: Arc<AtomicU64>,
}

impl ReconnectCountdown {
    pub fn new(policy: BackoffPolicy) -> Self {
        let (remaining, _) = watch::channel(None);
        Self {
            policy,
            tracked_attempt: None,
            timer: None,
            remaining: Arc::new(remaining),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Must be called from within a tokio runtime while reconnecting.
    pub fn update(&mut self, state: ConnectionState, attempt: u32) {
        if state != ConnectionState::Reconnecting {
            if self.tracked_attempt.take().is_some() {
                self.stop();
                self.remaining.send_replace(None);
            }
            return;
        }

        if self.tracked_attempt == Some(attempt) {
            return;
        }

        self.stop();
        self.tracked_attempt = Some(attempt);
        let seconds = self.policy.countdown_seconds(attempt);
        self.remaining.send_replace(Some(seconds));
        if seconds == 0 {
            return;
        }

        let generation = Arc::clone(&self.generation);
        let expected = generation.load(Ordering::SeqCst);
        let remaining = Arc::clone(&self.remaining);
        self.timer = Some(schedule_repeating(TICK, move || {
            if generation.load(Ordering::SeqCst) != expected {
                return false;
            }
            let mut left = 0;
            remaining.send_modify(|value| {
                if let Some(secs) = value {
                    *secs = secs.saturating_sub(1);
                    left = *secs;
                }
            });
            left > 0
        }));
    }

    pub fn remaining(&self) -> Option<u64> {
        *self.remaining.borrow()
    }

    /// Receiver that sees every tick.
    pub fn watch(&self) -> watch::Receiver<Option<u64>> {
        self.remaining.subscribe()
    }

    fn stop(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }
}

impl Drop for ReconnectCountdown {
    fn drop(&mut self) {
        self.stop();
    }
}
