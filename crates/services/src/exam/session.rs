use std::num::NonZeroUsize;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use exam_core::model::{
    AnswerRecord, AnswerValue, ExamDefinition, Question, QuestionId, SessionStatus,
    SubmissionReason, SubmissionSnapshot,
};

use super::answers::AnswerStore;
use super::navigator::Navigator;
use crate::error::SessionError;

/// Mutable state of one exam attempt.
///
/// Status only moves `Loading -> InProgress -> Submitted`. Once submitted,
/// nothing changes any more; `submitted_at` is set in the same step as the
/// status. The transitions are private to the `exam` module: `begin` is
/// driven by the controller and `finalize` only by the submission gate.
#[derive(Debug, Clone)]
pub struct ExamSession {
    definition: Arc<ExamDefinition>,
    status: SessionStatus,
    remaining_seconds: u32,
    navigator: Navigator,
    answers: AnswerStore,
    started_at: Option<DateTime<Utc>>,
    submitted_at: Option<DateTime<Utc>>,
    reason: Option<SubmissionReason>,
}

impl ExamSession {
    #[must_use]
    pub fn new(definition: Arc<ExamDefinition>) -> Self {
        // Definitions are validated to hold at least one question.
        let count = NonZeroUsize::new(definition.question_count()).unwrap_or(NonZeroUsize::MIN);
        Self {
            remaining_seconds: definition.duration_seconds(),
            navigator: Navigator::new(count),
            answers: AnswerStore::new(Arc::clone(&definition)),
            definition,
            status: SessionStatus::Loading,
            started_at: None,
            submitted_at: None,
            reason: None,
        }
    }

    #[must_use]
    pub fn definition(&self) -> &ExamDefinition {
        &self.definition
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.navigator.current()
    }

    #[must_use]
    pub fn is_last_question(&self) -> bool {
        self.navigator.is_last()
    }

    #[must_use]
    pub fn current_question(&self) -> &Question {
        let index = self.navigator.current();
        &self.definition.questions()[index]
    }

    #[must_use]
    pub fn answers(&self) -> &AnswerRecord {
        self.answers.record()
    }

    #[must_use]
    pub fn answer(&self, question: QuestionId) -> Option<&AnswerValue> {
        self.answers.get(question)
    }

    #[must_use]
    pub fn is_answered(&self, question: QuestionId) -> bool {
        self.answers.is_answered(question)
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    #[must_use]
    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    #[must_use]
    pub fn reason(&self) -> Option<SubmissionReason> {
        self.reason
    }

    fn ensure_in_progress(&self) -> Result<(), SessionError> {
        if self.status == SessionStatus::InProgress {
            Ok(())
        } else {
            Err(SessionError::InvalidSessionState {
                status: self.status,
            })
        }
    }

    /// Record an answer for `question`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidSessionState` outside `InProgress`, or
    /// `SessionError::Answer` if the value does not fit the question.
    pub fn answer_question(
        &mut self,
        question: QuestionId,
        value: AnswerValue,
    ) -> Result<(), SessionError> {
        self.ensure_in_progress()?;
        self.answers.set(question, value)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `SessionError::InvalidSessionState` outside `InProgress`.
    pub fn next(&mut self) -> Result<usize, SessionError> {
        self.ensure_in_progress()?;
        Ok(self.navigator.next())
    }

    /// # Errors
    ///
    /// Returns `SessionError::InvalidSessionState` outside `InProgress`.
    pub fn previous(&mut self) -> Result<usize, SessionError> {
        self.ensure_in_progress()?;
        Ok(self.navigator.previous())
    }

    /// # Errors
    ///
    /// Returns `SessionError::InvalidSessionState` outside `InProgress`, or
    /// `SessionError::IndexOutOfRange` for an index past the last question.
    pub fn go_to(&mut self, index: usize) -> Result<usize, SessionError> {
        self.ensure_in_progress()?;
        self.navigator.go_to(index)
    }

    /// `Loading -> InProgress`. Returns `false` if the session had already left `Loading`.
    pub(super) fn begin(&mut self, at: DateTime<Utc>) -> bool {
        if self.status != SessionStatus::Loading {
            return false;
        }
        self.status = SessionStatus::InProgress;
        self.started_at = Some(at);
        true
    }

    /// Count down one second. Never goes below zero.
    pub(super) fn record_tick(&mut self) -> u32 {
        if self.status == SessionStatus::InProgress {
            self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        }
        self.remaining_seconds
    }

    /// Time is up: the countdown is at zero whatever ticks were lost.
    pub(super) fn expire(&mut self) {
        if self.status == SessionStatus::InProgress {
            self.remaining_seconds = 0;
        }
    }

    /// `InProgress -> Submitted`, returning the snapshot for the sink.
    ///
    /// Returns `None` if the session is not in progress.
    pub(super) fn finalize(
        &mut self,
        reason: SubmissionReason,
        at: DateTime<Utc>,
    ) -> Option<SubmissionSnapshot> {
        if self.status != SessionStatus::InProgress {
            return None;
        }
        self.status = SessionStatus::Submitted;
        self.submitted_at = Some(at);
        self.reason = Some(reason);

        Some(SubmissionSnapshot::new(
            self.definition.id(),
            self.answers.record().clone(),
            reason,
            self.started_at.unwrap_or(at),
            at,
            self.remaining_seconds,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::fixtures::demo_exam;
    use exam_core::time::fixed_now;

    fn session() -> ExamSession {
        ExamSession::new(Arc::new(demo_exam().unwrap()))
    }

    #[test]
    fn loading_session_rejects_mutations() {
        let mut session = session();
        assert_eq!(session.status(), SessionStatus::Loading);

        let err = session.next().unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidSessionState {
                status: SessionStatus::Loading
            }
        ));
        assert!(
            session
                .answer_question(QuestionId::new(1), AnswerValue::choice(1))
                .is_err()
        );
        assert_eq!(session.current_index(), 0);
    }

    #[test]
    fn begin_happens_once() {
        let mut session = session();
        assert!(session.begin(fixed_now()));
        assert!(!session.begin(fixed_now()));
        assert_eq!(session.status(), SessionStatus::InProgress);
    }

    #[test]
    fn countdown_stops_at_zero() {
        let exam = ExamDefinition::new(
            exam_core::model::ExamId::new(2),
            "Short",
            2,
            vec![Question::essay(1, "Explain", 10)],
        )
        .unwrap();
        let mut session = ExamSession::new(Arc::new(exam));
        session.begin(fixed_now());

        assert_eq!(session.record_tick(), 1);
        assert_eq!(session.record_tick(), 0);
        assert_eq!(session.record_tick(), 0);
    }

    #[test]
    fn submitted_session_is_frozen() {
        let mut session = session();
        session.begin(fixed_now());
        session
            .answer_question(QuestionId::new(1), AnswerValue::choice(1))
            .unwrap();
        session.go_to(2).unwrap();

        let snapshot = session.finalize(SubmissionReason::Manual, fixed_now()).unwrap();
        assert_eq!(snapshot.answer(QuestionId::new(1)), Some(&AnswerValue::choice(1)));
        assert!(session.finalize(SubmissionReason::Timeout, fixed_now()).is_none());

        let remaining = session.remaining_seconds();
        assert_eq!(session.record_tick(), remaining);
        assert!(session.previous().is_err());
        assert!(session.go_to(0).is_err());
        assert!(
            session
                .answer_question(QuestionId::new(2), AnswerValue::choice(1))
                .is_err()
        );
        assert_eq!(session.current_index(), 2);
        assert_eq!(session.reason(), Some(SubmissionReason::Manual));
        assert_eq!(session.answers().len(), 1);
    }
}
