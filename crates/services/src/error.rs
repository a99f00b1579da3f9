//! Shared error types for the services crate.

use thiserror::Error;

use exam_core::model::{AnswerError, ExamCode, SessionStatus};
use storage::repository::StorageError;

/// Errors emitted by exam session operations.
///
/// Every variant leaves the session exactly as it was before the call.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("no exam found for code {code}")]
    NotFound { code: ExamCode },

    #[error("operation not allowed while the session is {status}")]
    InvalidSessionState { status: SessionStatus },

    #[error("the exam session was closed")]
    Closed,

    #[error("question index {index} is out of range (exam has {count} questions)")]
    IndexOutOfRange { index: usize, count: usize },

    #[error(transparent)]
    Answer(#[from] AnswerError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

