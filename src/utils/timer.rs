use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Cancel handle for a scheduled callback. Dropping it cancels the timer.
#[derive(Debug)]
pub struct TimerHandle {
    token: CancellationToken,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Run `callback` once after `delay` unless cancelled first.
pub fn schedule_once<F>(delay: Duration, callback: F) -> TimerHandle
where
    F: FnOnce() + Send + 'static,
{
    spawn_cancellable(move |token| async move {
        tokio::select! {
            biased;
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(delay) => callback(),
        }
    })
}

/// Run `callback` every `period`, first after one full period. The timer
/// stops when the callback returns false or the handle is cancelled.
pub fn schedule_repeating<F>(period: Duration, mut callback: F) -> TimerHandle
where
    F: FnMut() -> bool + Send + 'static,
{
    spawn_cancellable(move |token| async move {
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(period) => {
                    if !callback() {
                        break;
                    }
                }
            }
        }
    })
}

fn spawn_cancellable<F, Fut>(body: F) -> TimerHandle
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let token = CancellationToken::new();
    tokio::spawn(body(token.clone()));
    TimerHandle { token }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_schedule_once_fires() {
        let fired = Arc::new(AtomicU32::new(0));
        let f = fired.clone();
        let _handle = schedule_once(Duration::from_secs(2), move || { f.fetch_add(1, Ordering::SeqCst); });

        tokio::time::sleep(Duration::from_millis(1900)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let fired = Arc::new(AtomicU32::new(0));
        let f = fired.clone();
        let handle = schedule_once(Duration::from_secs(1), move || { f.fetch_add(1, Ordering::SeqCst); });
        handle.cancel();
        assert!(handle.is_cancelled());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeating_stops_when_callback_returns_false() {
        let ticks = Arc::new(AtomicU32::new(0));
        let t = ticks.clone();
        let _handle = schedule_repeating(Duration::from_secs(1), move || {
            t.fetch_add(1, Ordering::SeqCst) + 1 < 3
        });

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_cancels() {
        let ticks = Arc::new(AtomicU32::new(0));
        let t = ticks.clone();
        let handle = schedule_repeating(Duration::from_secs(1), move || {
            t.fetch_add(1, Ordering::SeqCst);
            true
        });
        tokio::time::sleep(Duration::from_millis(2500)).await;
        drop(handle);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
    }
}
