mod exam;
mod ids;
mod question;
mod submission;

pub use ids::{ExamCode, ExamCodeError, ExamId, OptionId, ParseIdError, QuestionId};

pub use exam::{ExamDefinition, ExamError};
pub use question::{AnswerError, AnswerValue, ChoiceOption, Question, QuestionKind};
pub use submission::{AnswerRecord, SessionStatus, SubmissionReason, SubmissionSnapshot};
