use chrono::{DateTime, Utc};
use exam_core::model::{
    AnswerRecord, AnswerValue, ExamId, Question, SessionStatus, SubmissionReason,
};

use super::session::ExamSession;

/// Owned copy of everything a host needs to render one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub exam_id: ExamId,
    pub title: String,
    pub status: SessionStatus,
    pub remaining_seconds: u32,
    pub current_index: usize,
    pub question_count: usize,
    pub current_question: Question,
    pub answers: AnswerRecord,
    /// One flag per question, in exam order.
    pub answered: Vec<bool>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reason: Option<SubmissionReason>,
}

impl SessionView {
    #[must_use]
    pub fn from_session(session: &ExamSession) -> Self {
        let definition = session.definition();
        let answers = session.answers().clone();
        let answered = definition
            .questions()
            .iter()
            .map(|question| session.is_answered(question.id()))
            .collect();

        Self {
            exam_id: definition.id(),
            title: definition.title().to_owned(),
            status: session.status(),
            remaining_seconds: session.remaining_seconds(),
            current_index: session.current_index(),
            question_count: definition.question_count(),
            current_question: session.current_question().clone(),
            answers,
            answered,
            submitted_at: session.submitted_at(),
            reason: session.reason(),
        }
    }

    #[must_use]
    pub fn countdown(&self) -> String {
        format_countdown(self.remaining_seconds)
    }

    #[must_use]
    pub fn progress(&self) -> f64 {
        progress_ratio(self.current_index, self.question_count)
    }

    /// The host offers "Submit" instead of "Next" here.
    #[must_use]
    pub fn is_last_question(&self) -> bool {
        self.current_index + 1 == self.question_count
    }

    /// True once the attempt is over and the success screen applies.
    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.status.is_terminal()
    }

    #[must_use]
    pub fn current_answer(&self) -> Option<&AnswerValue> {
        self.answers.get(&self.current_question.id())
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answered.iter().filter(|answered| **answered).count()
    }
}

/// `MM:SS`, with minutes allowed past 99.
#[must_use]
pub fn format_countdown(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Share of the exam reached, counting the current question as reached.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn progress_ratio(index: usize, count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    (index.min(count - 1) + 1) as f64 / count as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::fixtures::demo_exam;
    use exam_core::model::QuestionId;
    use exam_core::time::fixed_now;
    use std::sync::Arc;

    #[test]
    fn countdown_is_zero_padded() {
        assert_eq!(format_countdown(3_600), "60:00");
        assert_eq!(format_countdown(65), "01:05");
        assert_eq!(format_countdown(0), "00:00");
        assert_eq!(format_countdown(6_000), "100:00");
    }

    #[test]
    fn progress_counts_current_question() {
        assert!((progress_ratio(0, 4) - 0.25).abs() < f64::EPSILON);
        assert!((progress_ratio(3, 4) - 1.0).abs() < f64::EPSILON);
        assert!(progress_ratio(0, 0).abs() < f64::EPSILON);
    }

    #[test]
    fn view_reflects_loading_session() {
        let session = ExamSession::new(Arc::new(demo_exam().unwrap()));

        let view = SessionView::from_session(&session);

        assert_eq!(view.status, SessionStatus::Loading);
        assert_eq!(view.countdown(), "60:00");
        assert_eq!(view.question_count, 4);
        assert_eq!(view.current_question.id(), QuestionId::new(1));
        assert_eq!(view.answered, vec![false; 4]);
        assert!(!view.is_last_question());
        assert_eq!(view.current_answer(), None);
    }

    #[test]
    fn view_marks_answers_and_submission() {
        let mut session = ExamSession::new(Arc::new(demo_exam().unwrap()));
        session.begin(fixed_now());
        session
            .answer_question(QuestionId::new(1), AnswerValue::choice(2))
            .unwrap();
        assert!(!SessionView::from_session(&session).is_submitted());

        session.finalize(SubmissionReason::Manual, fixed_now()).unwrap();
        let view = SessionView::from_session(&session);

        assert!(view.is_submitted());
        assert_eq!(view.answered, vec![true, false, false, false]);
        assert_eq!(view.answered_count(), 1);
        assert_eq!(view.reason, Some(SubmissionReason::Manual));
    }
}
