use chrono::{DateTime, Utc};
use exam_core::model::{SessionStatus, SubmissionReason, SubmissionSnapshot};
use tokio::sync::watch;

use super::session::ExamSession;
use super::ticker::Ticker;
use crate::delivery::{DeliveryStatus, SubmissionDelivery};

/// Result of the one submission a session ever makes.
#[derive(Debug, Clone)]
pub struct SubmissionReceipt {
    pub snapshot: SubmissionSnapshot,
    /// Progress of the background hand-off to the sink.
    pub delivery: watch::Receiver<DeliveryStatus>,
}

impl SubmissionReceipt {
    #[must_use]
    pub fn reason(&self) -> SubmissionReason {
        self.snapshot.reason()
    }

    #[must_use]
    pub fn delivery_status(&self) -> DeliveryStatus {
        self.delivery.borrow().clone()
    }
}

/// Single exit from `InProgress`.
///
/// Manual submission and timeout both come through here, so whichever
/// arrives first wins and the other becomes a no-op.
#[derive(Debug, Clone)]
pub struct SubmissionGate {
    delivery: SubmissionDelivery,
}

impl SubmissionGate {
    #[must_use]
    pub fn new(delivery: SubmissionDelivery) -> Self {
        Self { delivery }
    }

    /// Finalize `session` and hand the snapshot to the sink.
    ///
    /// Stops the ticker before the status changes so no tick lands on a
    /// submitted session. Returns `None` if the session is not in progress.
    pub fn submit(
        &self,
        session: &mut ExamSession,
        ticker: &mut Ticker,
        reason: SubmissionReason,
        at: DateTime<Utc>,
    ) -> Option<SubmissionReceipt> {
        if session.status() != SessionStatus::InProgress {
            tracing::debug!(status = %session.status(), %reason, "submission ignored");
            return None;
        }

        ticker.cancel();
        let snapshot = session.finalize(reason, at)?;
        tracing::info!(
            submission_id = %snapshot.submission_id(),
            exam_id = %snapshot.exam_id(),
            %reason,
            answered = snapshot.answers().len(),
            remaining_seconds = snapshot.remaining_seconds(),
            "exam submitted"
        );

        let delivery = self.delivery.dispatch(snapshot.clone());
        Some(SubmissionReceipt { snapshot, delivery })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::fixtures::demo_exam;
    use exam_core::model::{AnswerValue, QuestionId};
    use exam_core::time::fixed_now;
    use std::sync::Arc;
    use std::time::Duration;
    use storage::repository::InMemoryRepository;

    fn gate(sink: &InMemoryRepository) -> SubmissionGate {
        SubmissionGate::new(SubmissionDelivery::new(Arc::new(sink.clone())))
    }

    #[tokio::test]
    async fn second_submission_is_a_no_op() {
        let sink = InMemoryRepository::new();
        let gate = gate(&sink);
        let mut session = ExamSession::new(Arc::new(demo_exam().unwrap()));
        let mut ticker = Ticker::new();
        session.begin(fixed_now());
        session
            .answer_question(QuestionId::new(3), AnswerValue::choice(3))
            .unwrap();

        let mut receipt = gate
            .submit(&mut session, &mut ticker, SubmissionReason::Manual, fixed_now())
            .unwrap();
        assert!(
            gate.submit(&mut session, &mut ticker, SubmissionReason::Timeout, fixed_now())
                .is_none()
        );

        receipt
            .delivery
            .wait_for(|status| !status.is_pending())
            .await
            .unwrap();
        let stored = sink.submissions().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].reason(), SubmissionReason::Manual);
        assert_eq!(session.status(), SessionStatus::Submitted);
    }

    #[tokio::test]
    async fn loading_session_cannot_be_submitted() {
        let sink = InMemoryRepository::new();
        let mut session = ExamSession::new(Arc::new(demo_exam().unwrap()));
        let mut ticker = Ticker::new();

        let receipt = gate(&sink).submit(
            &mut session,
            &mut ticker,
            SubmissionReason::Manual,
            fixed_now(),
        );

        assert!(receipt.is_none());
        assert_eq!(session.status(), SessionStatus::Loading);
    }

    #[tokio::test(start_paused = true)]
    async fn submission_stops_the_ticker() {
        let sink = InMemoryRepository::new();
        let mut session = ExamSession::new(Arc::new(demo_exam().unwrap()));
        let mut ticker = Ticker::new();
        session.begin(fixed_now());
        ticker.start(Duration::from_secs(1), 10, |_| {}, || {});

        gate(&sink)
            .submit(&mut session, &mut ticker, SubmissionReason::Manual, fixed_now())
            .unwrap();

        assert!(!ticker.is_running());
    }
}
