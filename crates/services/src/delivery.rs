//! Hand-off of finalized snapshots to the submission sink.
//!
//! Delivery runs on its own task: the session is already `Submitted` when it
//! starts and stays so whatever the sink answers. Failed deliveries are
//! retried with backoff and then parked in the outbox for a later
//! [`drain_outbox`].

use std::sync::Arc;
use std::time::Duration;

use exam_core::model::SubmissionSnapshot;
use storage::repository::{Ack, SinkError, StorageError, SubmissionOutbox, SubmissionSink};
use tokio::sync::watch;

/// Bounded exponential backoff for sink calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total calls per delivery, including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// A policy that calls the sink once and never waits.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based), capped at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.backoff_factor.max(1.0).powi(exponent);
        let delay = self.initial_delay.as_secs_f64() * factor;
        if !delay.is_finite() || delay >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(delay)
        }
    }
}

/// Where a snapshot stands on its way to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Pending,
    Delivered(Ack),
    /// Gave up for now; the snapshot waits in the outbox.
    Queued { attempts: u32, error: String },
    /// Gave up and there is no outbox (or the outbox write failed too).
    Failed { attempts: u32, error: String },
}

impl DeliveryStatus {
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, DeliveryStatus::Pending)
    }
}

/// Sends snapshots to the sink with retry, falling back to the outbox.
#[derive(Clone)]
pub struct SubmissionDelivery {
    sink: Arc<dyn SubmissionSink>,
    outbox: Option<Arc<dyn SubmissionOutbox>>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for SubmissionDelivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionDelivery")
            .field("outbox", &self.outbox.is_some())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl SubmissionDelivery {
    #[must_use]
    pub fn new(sink: Arc<dyn SubmissionSink>) -> Self {
        Self {
            sink,
            outbox: None,
            policy: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_outbox(mut self, outbox: Arc<dyn SubmissionOutbox>) -> Self {
        self.outbox = Some(outbox);
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Deliver on a background task and return a handle to watch progress.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn dispatch(&self, snapshot: SubmissionSnapshot) -> watch::Receiver<DeliveryStatus> {
        let (tx, rx) = watch::channel(DeliveryStatus::Pending);
        let delivery = self.clone();
        tokio::spawn(async move {
            let status = delivery.deliver(&snapshot).await;
            // Nobody watching is fine; the outcome is already logged.
            let _ = tx.send(status);
        });
        rx
    }

    /// Deliver `snapshot`, retrying transient failures.
    pub async fn deliver(&self, snapshot: &SubmissionSnapshot) -> DeliveryStatus {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts = 0;
        let last_error = loop {
            attempts += 1;
            match self.sink.submit_answers(snapshot).await {
                Ok(ack) => {
                    tracing::info!(
                        submission_id = %snapshot.submission_id(),
                        receipt = %ack.receipt,
                        attempts,
                        "submission delivered"
                    );
                    return DeliveryStatus::Delivered(ack);
                }
                Err(err) if err.is_retryable() && attempts < max_attempts => {
                    let delay = self.policy.delay_for(attempts);
                    tracing::debug!(
                        submission_id = %snapshot.submission_id(),
                        attempts,
                        ?delay,
                        error = %err,
                        "submission attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => break err,
            }
        };

        self.park(snapshot, attempts, &last_error).await
    }

    async fn park(
        &self,
        snapshot: &SubmissionSnapshot,
        attempts: u32,
        error: &SinkError,
    ) -> DeliveryStatus {
        let error_text = error.to_string();
        tracing::warn!(
            submission_id = %snapshot.submission_id(),
            attempts,
            error = %error_text,
            "submission could not be delivered"
        );

        let Some(outbox) = &self.outbox else {
            return DeliveryStatus::Failed {
                attempts,
                error: error_text,
            };
        };
        if !error.is_retryable() {
            // A rejected snapshot would be rejected again on redelivery.
            return DeliveryStatus::Failed {
                attempts,
                error: error_text,
            };
        }

        match outbox.enqueue(snapshot, attempts, &error_text).await {
            Ok(()) => DeliveryStatus::Queued {
                attempts,
                error: error_text,
            },
            Err(outbox_err) => {
                tracing::error!(
                    submission_id = %snapshot.submission_id(),
                    error = %outbox_err,
                    "submission outbox write failed"
                );
                DeliveryStatus::Failed {
                    attempts,
                    error: format!("{error_text}; outbox: {outbox_err}"),
                }
            }
        }
    }
}

/// Outcome of one [`drain_outbox`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub still_queued: usize,
    /// Entries the sink rejected for good; they were removed from the outbox.
    pub dropped: usize,
}

/// Try once more to deliver up to `limit` queued snapshots.
///
/// An entry leaves the outbox when the sink acknowledges it or rejects it
/// with a non-retryable error. Only retryable failures stay queued.
///
/// # Errors
///
/// Returns `StorageError` if the outbox cannot be read or updated.
pub async fn drain_outbox(
    outbox: &dyn SubmissionOutbox,
    sink: &dyn SubmissionSink,
    limit: u32,
) -> Result<DrainReport, StorageError> {
    let mut report = DrainReport::default();
    for entry in outbox.pending(limit).await? {
        let submission_id = entry.snapshot.submission_id();
        match sink.submit_answers(&entry.snapshot).await {
            Ok(ack) => {
                outbox.remove(submission_id).await?;
                tracing::info!(%submission_id, receipt = %ack.receipt, "queued submission delivered");
                report.delivered += 1;
            }
            Err(err) if err.is_retryable() => {
                outbox.enqueue(&entry.snapshot, 1, &err.to_string()).await?;
                report.still_queued += 1;
            }
            Err(err) => {
                outbox.remove(submission_id).await?;
                tracing::warn!(
                    %submission_id,
                    attempts = entry.attempts.saturating_add(1),
                    error = %err,
                    "queued submission rejected; dropped from outbox"
                );
                report.dropped += 1;
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use exam_core::model::{AnswerRecord, ExamId, SubmissionReason};
    use exam_core::time::{Clock, fixed_clock, fixed_now};
    use std::sync::atomic::{AtomicU32, Ordering};
    use storage::repository::InMemoryRepository;

    /// Fails the first `failures` calls, then delegates to an in-memory sink.
    struct FlakySink {
        failures: u32,
        calls: AtomicU32,
        error: fn() -> SinkError,
        inner: InMemoryRepository,
    }

    impl FlakySink {
        fn new(failures: u32, error: fn() -> SinkError) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                error,
                inner: InMemoryRepository::new(),
            }
        }
    }

    #[async_trait]
    impl SubmissionSink for FlakySink {
        async fn submit_answers(&self, snapshot: &SubmissionSnapshot) -> Result<Ack, SinkError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err((self.error)());
            }
            self.inner.submit_answers(snapshot).await
        }
    }

    fn unavailable() -> SinkError {
        SinkError::Unavailable("connection refused".into())
    }

    fn rejected() -> SinkError {
        SinkError::Rejected { status: 422 }
    }

    fn snapshot() -> SubmissionSnapshot {
        SubmissionSnapshot::new(
            ExamId::new(1),
            AnswerRecord::new(),
            SubmissionReason::Timeout,
            fixed_now(),
            fixed_now(),
            0,
        )
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_secs(1));
        assert_eq!(policy.delay_for(3), Duration::from_secs(2));
        assert_eq!(policy.delay_for(40), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_is_retried() {
        let sink = Arc::new(FlakySink::new(2, unavailable));
        let delivery = SubmissionDelivery::new(sink.clone());

        let status = delivery.deliver(&snapshot()).await;

        assert!(matches!(status, DeliveryStatus::Delivered(_)));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_park_snapshot_in_outbox() {
        let sink = Arc::new(FlakySink::new(u32::MAX, unavailable));
        let outbox = InMemoryRepository::new();
        let delivery = SubmissionDelivery::new(sink.clone()).with_outbox(Arc::new(outbox.clone()));
        let snapshot = snapshot();

        let status = delivery.deliver(&snapshot).await;

        assert!(matches!(status, DeliveryStatus::Queued { attempts: 3, .. }));
        let pending = outbox.pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].snapshot, snapshot);
    }

    #[tokio::test]
    async fn rejection_is_not_retried_or_queued() {
        let sink = Arc::new(FlakySink::new(u32::MAX, rejected));
        let outbox = InMemoryRepository::new();
        let delivery = SubmissionDelivery::new(sink.clone()).with_outbox(Arc::new(outbox.clone()));

        let status = delivery.deliver(&snapshot()).await;

        assert!(matches!(status, DeliveryStatus::Failed { attempts: 1, .. }));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        assert!(outbox.pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dispatch_reports_through_watch_channel() {
        let sink = InMemoryRepository::new();
        let delivery = SubmissionDelivery::new(Arc::new(sink.clone()));

        let mut rx = delivery.dispatch(snapshot());
        let status = rx.wait_for(|s| !s.is_pending()).await.unwrap().clone();

        assert!(matches!(status, DeliveryStatus::Delivered(_)));
        assert_eq!(sink.submissions().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn drain_delivers_and_removes_queued_snapshots() {
        let repo = InMemoryRepository::new();
        let snapshot = snapshot();
        repo.enqueue(&snapshot, 3, "connection refused").await.unwrap();

        let report = drain_outbox(&repo, &repo, 10).await.unwrap();

        assert_eq!(
            report,
            DrainReport {
                delivered: 1,
                still_queued: 0,
                dropped: 0,
            }
        );
        assert!(repo.pending(10).await.unwrap().is_empty());
        assert_eq!(repo.submissions().unwrap(), vec![snapshot]);
    }

    #[tokio::test]
    async fn drain_keeps_entries_the_sink_refuses() {
        let outbox = InMemoryRepository::new();
        let sink = FlakySink::new(u32::MAX, unavailable);
        outbox.enqueue(&snapshot(), 3, "timeout").await.unwrap();

        let report = drain_outbox(&outbox, &sink, 10).await.unwrap();

        assert_eq!(report.still_queued, 1);
        assert_eq!(outbox.pending(10).await.unwrap()[0].attempts, 4);
    }

    /// Rejects one snapshot for good and accepts everything else.
    struct RejectingSink {
        rejected: SubmissionSnapshot,
        inner: InMemoryRepository,
    }

    #[async_trait]
    impl SubmissionSink for RejectingSink {
        async fn submit_answers(&self, snapshot: &SubmissionSnapshot) -> Result<Ack, SinkError> {
            if snapshot.submission_id() == self.rejected.submission_id() {
                return Err(rejected());
            }
            self.inner.submit_answers(snapshot).await
        }
    }

    #[tokio::test]
    async fn rejected_entry_does_not_block_later_ones() {
        let outbox = InMemoryRepository::new().with_clock(fixed_clock());
        let bad = snapshot();
        let good = snapshot();
        outbox.enqueue(&bad, 3, "timeout").await.unwrap();
        outbox
            .clone()
            .with_clock(Clock::fixed(fixed_now() + chrono::Duration::seconds(60)))
            .enqueue(&good, 3, "timeout")
            .await
            .unwrap();
        let sink = RejectingSink {
            rejected: bad.clone(),
            inner: InMemoryRepository::new(),
        };

        let first = drain_outbox(&outbox, &sink, 1).await.unwrap();
        assert_eq!(
            first,
            DrainReport {
                delivered: 0,
                still_queued: 0,
                dropped: 1,
            }
        );

        let second = drain_outbox(&outbox, &sink, 1).await.unwrap();
        assert_eq!(second.delivered, 1);
        assert!(outbox.pending(10).await.unwrap().is_empty());
        assert_eq!(sink.inner.submissions().unwrap(), vec![good]);
    }
}
