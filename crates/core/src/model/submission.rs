use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::model::ids::{ExamId, QuestionId};
use crate::model::question::AnswerValue;

/// Recorded answers keyed by question. A question without an entry is
/// unanswered.
pub type AnswerRecord = BTreeMap<QuestionId, AnswerValue>;

/// Lifecycle of an exam attempt. Only moves forward:
/// `Loading -> InProgress -> Submitted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Loading,
    InProgress,
    Submitted,
}

impl SessionStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Submitted)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Loading => f.write_str("loading"),
            SessionStatus::InProgress => f.write_str("in progress"),
            SessionStatus::Submitted => f.write_str("submitted"),
        }
    }
}

/// Why an attempt was finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionReason {
    /// The candidate pressed submit.
    Manual,
    /// The countdown reached zero.
    Timeout,
}

impl SubmissionReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionReason::Manual => "manual",
            SubmissionReason::Timeout => "timeout",
        }
    }
}

impl fmt::Display for SubmissionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of a finalized attempt, handed to the submission sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionSnapshot {
    submission_id: Uuid,
    exam_id: ExamId,
    answers: AnswerRecord,
    reason: SubmissionReason,
    started_at: DateTime<Utc>,
    submitted_at: DateTime<Utc>,
    remaining_seconds: u32,
}

impl SubmissionSnapshot {
    /// Creates a snapshot with a fresh submission id.
    #[must_use]
    pub fn new(
        exam_id: ExamId,
        answers: AnswerRecord,
        reason: SubmissionReason,
        started_at: DateTime<Utc>,
        submitted_at: DateTime<Utc>,
        remaining_seconds: u32,
    ) -> Self {
        Self {
            submission_id: Uuid::new_v4(),
            exam_id,
            answers,
            reason,
            started_at,
            submitted_at,
            remaining_seconds,
        }
    }

    /// Stable id used to deduplicate redeliveries.
    #[must_use]
    pub fn submission_id(&self) -> Uuid {
        self.submission_id
    }

    #[must_use]
    pub fn exam_id(&self) -> ExamId {
        self.exam_id
    }

    #[must_use]
    pub fn answers(&self) -> &AnswerRecord {
        &self.answers
    }

    #[must_use]
    pub fn answer(&self, question: QuestionId) -> Option<&AnswerValue> {
        self.answers.get(&question)
    }

    #[must_use]
    pub fn reason(&self) -> SubmissionReason {
        self.reason
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    #[must_use]
    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }
}
