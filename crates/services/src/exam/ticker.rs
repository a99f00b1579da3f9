use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;

/// Cancellable countdown clock.
///
/// Emits `on_tick(n)` once per period for `n = 1..=ticks`, then `on_exhausted`
/// exactly once. Ticks are scheduled on the Tokio timer, so nothing runs
/// between them. After `cancel` no callback fires again.
#[derive(Debug, Default)]
pub struct Ticker {
    cancel: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start emitting ticks. Must be called from within a Tokio runtime.
    ///
    /// Returns `false` without doing anything if this ticker was already
    /// started; a cancelled or exhausted ticker is never restarted.
    pub fn start<T, E>(
        &mut self,
        period: Duration,
        ticks: u32,
        mut on_tick: T,
        on_exhausted: E,
    ) -> bool
    where
        T: FnMut(u32) + Send + 'static,
        E: FnOnce() + Send + 'static,
    {
        if self.was_started() {
            return false;
        }

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let handle = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            for tick in 1..=ticks {
                tokio::select! {
                    biased;
                    () = cancelled.cancelled() => return,
                    _ = interval.tick() => {}
                }
                if cancelled.is_cancelled() {
                    return;
                }
                on_tick(tick);
            }
            if !cancelled.is_cancelled() {
                on_exhausted();
            }
        });

        self.cancel = Some(token);
        self.handle = Some(handle);
        true
    }

    /// Stop emission. Safe before `start` and after exhaustion.
    pub fn cancel(&mut self) {
        if let Some(token) = &self.cancel {
            token.cancel();
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        let live_token = self.cancel.as_ref().is_some_and(|t| !t.is_cancelled());
        let live_task = self.handle.as_ref().is_some_and(|h| !h.is_finished());
        live_token && live_task
    }

    #[must_use]
    pub fn was_started(&self) -> bool {
        self.cancel.is_some()
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    fn counters() -> (Arc<AtomicU32>, Arc<AtomicBool>) {
        (Arc::new(AtomicU32::new(0)), Arc::new(AtomicBool::new(false)))
    }

    #[tokio::test(start_paused = true)]
    async fn emits_every_tick_then_exhausts_once() {
        let (ticks, exhausted) = counters();
        let mut ticker = Ticker::new();
        let (t, e) = (Arc::clone(&ticks), Arc::clone(&exhausted));
        ticker.start(
            Duration::from_secs(1),
            3,
            move |_| {
                t.fetch_add(1, Ordering::SeqCst);
            },
            move || e.store(true, Ordering::SeqCst),
        );

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
        assert!(!exhausted.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert!(exhausted.load(Ordering::SeqCst));
        assert!(!ticker.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_ignored() {
        let (ticks, _) = counters();
        let mut ticker = Ticker::new();
        let first = Arc::clone(&ticks);
        let second = Arc::clone(&ticks);

        assert!(ticker.start(
            Duration::from_secs(1),
            5,
            move |_| {
                first.fetch_add(1, Ordering::SeqCst);
            },
            || {},
        ));
        assert!(!ticker.start(
            Duration::from_secs(1),
            5,
            move |_| {
                second.fetch_add(100, Ordering::SeqCst);
            },
            || {},
        ));

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_ticks_and_exhaustion() {
        let (ticks, exhausted) = counters();
        let mut ticker = Ticker::new();
        let (t, e) = (Arc::clone(&ticks), Arc::clone(&exhausted));
        ticker.start(
            Duration::from_secs(1),
            2,
            move |_| {
                t.fetch_add(1, Ordering::SeqCst);
            },
            move || e.store(true, Ordering::SeqCst),
        );

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        ticker.cancel();
        assert!(!ticker.is_running());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        assert!(!exhausted.load(Ordering::SeqCst));
    }

    #[test]
    fn cancel_before_start_is_a_no_op() {
        let mut ticker = Ticker::new();
        ticker.cancel();
        ticker.cancel();
        assert!(!ticker.was_started());
        assert!(!ticker.is_running());
    }
}
