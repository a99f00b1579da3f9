use std::sync::Arc;

use exam_core::model::{AnswerError, AnswerRecord, AnswerValue, ExamDefinition, QuestionId};

/// Recorded answers for one attempt.
///
/// Every stored value has been validated against its question, so the
/// record never holds an essay answer for a multiple-choice question or an
/// over-long essay.
#[derive(Debug, Clone)]
pub struct AnswerStore {
    definition: Arc<ExamDefinition>,
    answers: AnswerRecord,
}

impl AnswerStore {
    #[must_use]
    pub fn new(definition: Arc<ExamDefinition>) -> Self {
        Self {
            definition,
            answers: AnswerRecord::new(),
        }
    }

    /// Validate and store `value`, replacing any earlier answer.
    ///
    /// Returns the replaced value, if any.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError` if the question is unknown or `value` does not
    /// fit it. The stored answers are unchanged in that case.
    pub fn set(
        &mut self,
        question: QuestionId,
        value: AnswerValue,
    ) -> Result<Option<AnswerValue>, AnswerError> {
        let target = self
            .definition
            .find_question(question)
            .ok_or(AnswerError::UnknownQuestion(question))?;
        target.validate_answer(&value)?;
        Ok(self.answers.insert(question, value))
    }

    /// The stored answer, or `None` if the question is unanswered.
    #[must_use]
    pub fn get(&self, question: QuestionId) -> Option<&AnswerValue> {
        self.answers.get(&question)
    }

    #[must_use]
    pub fn is_answered(&self, question: QuestionId) -> bool {
        self.answers.contains_key(&question)
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    #[must_use]
    pub fn record(&self) -> &AnswerRecord {
        &self.answers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::fixtures::demo_exam;
    use proptest::prelude::*;

    fn store() -> AnswerStore {
        AnswerStore::new(Arc::new(demo_exam().unwrap()))
    }

    #[test]
    fn overwrites_previous_answer() {
        let mut answers = store();
        let q1 = QuestionId::new(1);

        assert_eq!(answers.set(q1, AnswerValue::choice(2)).unwrap(), None);
        assert_eq!(
            answers.set(q1, AnswerValue::choice(1)).unwrap(),
            Some(AnswerValue::choice(2))
        );
        assert_eq!(answers.get(q1), Some(&AnswerValue::choice(1)));
        assert_eq!(answers.answered_count(), 1);
    }

    #[test]
    fn unknown_question_is_rejected() {
        let mut answers = store();
        let err = answers
            .set(QuestionId::new(99), AnswerValue::choice(1))
            .unwrap_err();
        assert_eq!(err, AnswerError::UnknownQuestion(QuestionId::new(99)));
        assert_eq!(answers.answered_count(), 0);
    }

    #[test]
    fn essay_over_limit_keeps_earlier_text() {
        let mut answers = store();
        let q4 = QuestionId::new(4);
        answers.set(q4, AnswerValue::text("short")).unwrap();

        let err = answers
            .set(q4, AnswerValue::text("x".repeat(501)))
            .unwrap_err();

        assert!(matches!(err, AnswerError::AnswerTooLong { max: 500, actual: 501, .. }));
        assert_eq!(answers.get(q4), Some(&AnswerValue::text("short")));
    }

    proptest! {
        #[test]
        fn valid_essay_is_read_back(text in "\\PC{0,500}") {
            let mut answers = store();
            let q4 = QuestionId::new(4);
            answers.set(q4, AnswerValue::text(text.clone())).unwrap();
            prop_assert_eq!(answers.get(q4), Some(&AnswerValue::Text(text)));
        }

        #[test]
        fn rejected_choice_leaves_store_untouched(prior in 1_u64..=4, bad in 5_u64..1_000) {
            let mut answers = store();
            let q2 = QuestionId::new(2);
            answers.set(q2, AnswerValue::choice(prior)).unwrap();
            prop_assert!(answers.set(q2, AnswerValue::choice(bad)).is_err());
            prop_assert_eq!(answers.get(q2), Some(&AnswerValue::choice(prior)));
        }
    }
}
