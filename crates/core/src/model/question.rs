use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::ids::{OptionId, QuestionId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Reasons an answer is refused before it reaches the answer record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnswerError {
    #[error("question {0} is not part of this exam")]
    UnknownQuestion(QuestionId),

    #[error("option {option} is not a choice of question {question}")]
    InvalidOptionId {
        question: QuestionId,
        option: OptionId,
    },

    #[error("answer to question {question} has {actual} characters, limit is {max}")]
    AnswerTooLong {
        question: QuestionId,
        max: u32,
        actual: usize,
    },

    #[error("question {question} is {expected} and cannot take this answer")]
    AnswerKindMismatch {
        question: QuestionId,
        expected: QuestionKind,
    },
}

//
// ─── ANSWER VALUE ──────────────────────────────────────────────────────────────
//

/// A candidate answer. Serializes untagged: a number is a chosen option,
/// a string is essay text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Choice(OptionId),
    Text(String),
}

impl AnswerValue {
    #[must_use]
    pub fn choice(id: u64) -> Self {
        Self::Choice(OptionId::new(id))
    }

    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuestionKind {
    MultipleChoice,
    Essay,
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionKind::MultipleChoice => f.write_str("multiple choice"),
            QuestionKind::Essay => f.write_str("essay"),
        }
    }
}

/// One selectable option of a multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub id: OptionId,
    pub text: String,
}

impl ChoiceOption {
    #[must_use]
    pub fn new(id: u64, text: impl Into<String>) -> Self {
        Self {
            id: OptionId::new(id),
            text: text.into(),
        }
    }
}

/// A single exam question.
///
/// The variant decides which `AnswerValue` shape is accepted for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Question {
    MultipleChoice {
        id: QuestionId,
        text: String,
        options: Vec<ChoiceOption>,
        correct_option_id: OptionId,
    },
    Essay {
        id: QuestionId,
        text: String,
        max_length: u32,
    },
}

impl Question {
    #[must_use]
    pub fn multiple_choice(
        id: u64,
        text: impl Into<String>,
        options: Vec<ChoiceOption>,
        correct_option_id: u64,
    ) -> Self {
        Self::MultipleChoice {
            id: QuestionId::new(id),
            text: text.into(),
            options,
            correct_option_id: OptionId::new(correct_option_id),
        }
    }

    #[must_use]
    pub fn essay(id: u64, text: impl Into<String>, max_length: u32) -> Self {
        Self::Essay {
            id: QuestionId::new(id),
            text: text.into(),
            max_length,
        }
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        match self {
            Question::MultipleChoice { id, .. } | Question::Essay { id, .. } => *id,
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Question::MultipleChoice { text, .. } | Question::Essay { text, .. } => text,
        }
    }

    #[must_use]
    pub fn kind(&self) -> QuestionKind {
        match self {
            Question::MultipleChoice { .. } => QuestionKind::MultipleChoice,
            Question::Essay { .. } => QuestionKind::Essay,
        }
    }

    /// Options of a multiple-choice question; empty for essays.
    #[must_use]
    pub fn options(&self) -> &[ChoiceOption] {
        match self {
            Question::MultipleChoice { options, .. } => options,
            Question::Essay { .. } => &[],
        }
    }

    #[must_use]
    pub fn max_length(&self) -> Option<u32> {
        match self {
            Question::Essay { max_length, .. } => Some(*max_length),
            Question::MultipleChoice { .. } => None,
        }
    }

    /// Check that `value` has the shape this question accepts.
    ///
    /// Essay length is measured in characters, not bytes. Over-long text is
    /// refused rather than truncated.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError::InvalidOptionId`, `AnswerError::AnswerTooLong` or
    /// `AnswerError::AnswerKindMismatch`.
    pub fn validate_answer(&self, value: &AnswerValue) -> Result<(), AnswerError> {
        match (self, value) {
            (Question::MultipleChoice { id, options, .. }, AnswerValue::Choice(option)) => {
                if options.iter().any(|o| o.id == *option) {
                    Ok(())
                } else {
                    Err(AnswerError::InvalidOptionId {
                        question: *id,
                        option: *option,
                    })
                }
            }
            (Question::Essay { id, max_length, .. }, AnswerValue::Text(text)) => {
                let actual = text.chars().count();
                if actual > *max_length as usize {
                    Err(AnswerError::AnswerTooLong {
                        question: *id,
                        max: *max_length,
                        actual,
                    })
                } else {
                    Ok(())
                }
            }
            _ => Err(AnswerError::AnswerKindMismatch {
                question: self.id(),
                expected: self.kind(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choice_question() -> Question {
        Question::multiple_choice(
            1,
            "Which method adds new elements to the end of an array?",
            vec![
                ChoiceOption::new(1, "push()"),
                ChoiceOption::new(2, "pop()"),
            ],
            1,
        )
    }

    #[test]
    fn choice_must_be_listed_option() {
        let q = choice_question();
        assert!(q.validate_answer(&AnswerValue::choice(2)).is_ok());
        assert_eq!(
            q.validate_answer(&AnswerValue::choice(9)),
            Err(AnswerError::InvalidOptionId {
                question: QuestionId::new(1),
                option: OptionId::new(9),
            })
        );
    }

    #[test]
    fn essay_length_counts_characters() {
        let q = Question::essay(4, "Explain closures.", 3);
        assert!(q.validate_answer(&AnswerValue::text("äöü")).is_ok());
        assert_eq!(
            q.validate_answer(&AnswerValue::text("abcd")),
            Err(AnswerError::AnswerTooLong {
                question: QuestionId::new(4),
                max: 3,
                actual: 4,
            })
        );
    }

    #[test]
    fn wrong_variant_is_rejected() {
        let q = choice_question();
        assert_eq!(
            q.validate_answer(&AnswerValue::text("push()")),
            Err(AnswerError::AnswerKindMismatch {
                question: QuestionId::new(1),
                expected: QuestionKind::MultipleChoice,
            })
        );

        let essay = Question::essay(2, "Explain.", 10);
        assert!(matches!(
            essay.validate_answer(&AnswerValue::choice(1)),
            Err(AnswerError::AnswerKindMismatch { .. })
        ));
    }

    #[test]
    fn question_uses_legacy_json_shape() {
        let json = r#"{
            "type": "essay",
            "id": 4,
            "text": "Explain the concept of closures in JavaScript.",
            "maxLength": 500
        }"#;
        let q: Question = serde_json::from_str(json).unwrap();
        assert_eq!(q.kind(), QuestionKind::Essay);
        assert_eq!(q.max_length(), Some(500));

        let value = serde_json::to_value(choice_question()).unwrap();
        assert_eq!(value["type"], "multiple_choice");
        assert_eq!(value["correctOptionId"], 1);
    }

    #[test]
    fn answer_value_is_untagged() {
        let choice: AnswerValue = serde_json::from_str("2").unwrap();
        assert_eq!(choice, AnswerValue::choice(2));
        let text: AnswerValue = serde_json::from_str("\"closures\"").unwrap();
        assert_eq!(text, AnswerValue::text("closures"));
    }
}
