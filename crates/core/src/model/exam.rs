use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::model::ids::{ExamId, OptionId, QuestionId};
use crate::model::question::Question;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExamError {
    #[error("exam title cannot be empty")]
    EmptyTitle,

    #[error("exam duration must be > 0 seconds")]
    ZeroDuration,

    #[error("exam duration of {minutes} minutes does not fit in seconds")]
    DurationOverflow { minutes: u32 },

    #[error("exam must contain at least one question")]
    NoQuestions,

    #[error("question id {0} appears more than once")]
    DuplicateQuestionId(QuestionId),

    #[error("multiple-choice question {0} has no options")]
    NoOptions(QuestionId),

    #[error("question {question} lists option {option} more than once")]
    DuplicateOptionId {
        question: QuestionId,
        option: OptionId,
    },

    #[error("correct option {option} of question {question} is not one of its options")]
    UnknownCorrectOption {
        question: QuestionId,
        option: OptionId,
    },

    #[error("essay question {0} must allow at least one character")]
    ZeroMaxLength(QuestionId),
}

//
// ─── DEFINITION ────────────────────────────────────────────────────────────────
//

/// Immutable description of an exam: its questions, in display order, and
/// the time allowed to answer them.
///
/// Every constructor (including deserialization) validates the definition,
/// so a value of this type always has at least one question, unique
/// question ids and well-formed options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawExamDefinition", rename_all = "camelCase")]
pub struct ExamDefinition {
    id: ExamId,
    title: String,
    duration_seconds: u32,
    questions: Vec<Question>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawExamDefinition {
    id: ExamId,
    title: String,
    duration_seconds: u32,
    questions: Vec<Question>,
}

impl TryFrom<RawExamDefinition> for ExamDefinition {
    type Error = ExamError;

    fn try_from(raw: RawExamDefinition) -> Result<Self, Self::Error> {
        Self::new(raw.id, raw.title, raw.duration_seconds, raw.questions)
    }
}

impl ExamDefinition {
    /// Creates a validated exam definition.
    ///
    /// # Errors
    ///
    /// Returns `ExamError` if the title is blank, the duration is zero, there
    /// are no questions, or any question is malformed.
    pub fn new(
        id: ExamId,
        title: impl Into<String>,
        duration_seconds: u32,
        questions: Vec<Question>,
    ) -> Result<Self, ExamError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(ExamError::EmptyTitle);
        }
        if duration_seconds == 0 {
            return Err(ExamError::ZeroDuration);
        }
        if questions.is_empty() {
            return Err(ExamError::NoQuestions);
        }

        let mut seen = HashSet::with_capacity(questions.len());
        for question in &questions {
            if !seen.insert(question.id()) {
                return Err(ExamError::DuplicateQuestionId(question.id()));
            }
            validate_question(question)?;
        }

        Ok(Self {
            id,
            title,
            duration_seconds,
            questions,
        })
    }

    /// Creates a definition whose duration is given in minutes, as exam
    /// content is usually authored.
    ///
    /// # Errors
    ///
    /// Same as [`ExamDefinition::new`], plus `ExamError::DurationOverflow`.
    pub fn from_minutes(
        id: ExamId,
        title: impl Into<String>,
        duration_minutes: u32,
        questions: Vec<Question>,
    ) -> Result<Self, ExamError> {
        let seconds = duration_minutes
            .checked_mul(60)
            .ok_or(ExamError::DurationOverflow {
                minutes: duration_minutes,
            })?;
        Self::new(id, title, seconds, questions)
    }

    #[must_use]
    pub fn id(&self) -> ExamId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn duration_seconds(&self) -> u32 {
        self.duration_seconds
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Number of questions; always at least one.
    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn find_question(&self, id: QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id() == id)
    }
}

fn validate_question(question: &Question) -> Result<(), ExamError> {
    match question {
        Question::MultipleChoice {
            id,
            options,
            correct_option_id,
            ..
        } => {
            if options.is_empty() {
                return Err(ExamError::NoOptions(*id));
            }
            let mut seen = HashSet::with_capacity(options.len());
            for option in options {
                if !seen.insert(option.id) {
                    return Err(ExamError::DuplicateOptionId {
                        question: *id,
                        option: option.id,
                    });
                }
            }
            if !seen.contains(correct_option_id) {
                return Err(ExamError::UnknownCorrectOption {
                    question: *id,
                    option: *correct_option_id,
                });
            }
            Ok(())
        }
        Question::Essay { id, max_length, .. } => {
            if *max_length == 0 {
                return Err(ExamError::ZeroMaxLength(*id));
            }
            Ok(())
        }
    }
}
