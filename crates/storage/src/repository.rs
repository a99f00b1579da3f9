use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exam_core::Clock;
use exam_core::model::{ExamCode, ExamDefinition, SubmissionSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Errors surfaced by a submission sink.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SinkError {
    #[error("submission rejected with status {status}")]
    Rejected { status: u16 },

    #[error("submission sink unavailable: {0}")]
    Unavailable(String),

    #[error("unexpected sink response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SinkError {
    /// Whether sending the same snapshot again may succeed.
    ///
    /// Client errors are final, except request timeouts and rate limiting.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            SinkError::Rejected { status } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            SinkError::Unavailable(_) => true,
            SinkError::InvalidResponse(_) => false,
            SinkError::Storage(err) => matches!(err, StorageError::Connection(_)),
        }
    }
}

/// Acknowledgement returned by a sink once it holds the submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    pub receipt: String,
    pub received_at: DateTime<Utc>,
}

/// A snapshot that could not be delivered and waits for another attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    pub snapshot: SubmissionSnapshot,
    pub last_error: String,
    pub attempts: u32,
    pub queued_at: DateTime<Utc>,
}

/// Source of exam content, looked up by the code a candidate enters.
#[async_trait]
pub trait ExamContentProvider: Send + Sync {
    /// Fetch an exam definition by its access code.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no exam uses this code, or other
    /// storage errors.
    async fn fetch_exam_definition(&self, code: &ExamCode)
    -> Result<ExamDefinition, StorageError>;
}

/// Write side of exam content, used for seeding.
#[async_trait]
pub trait ExamCatalog: Send + Sync {
    /// Persist or replace the exam stored under `code`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the exam cannot be stored.
    async fn upsert_exam(&self, code: &ExamCode, exam: &ExamDefinition)
    -> Result<(), StorageError>;

    /// List stored exam codes in ascending order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failure.
    async fn list_exam_codes(&self) -> Result<Vec<ExamCode>, StorageError>;
}

/// Receiver of finalized attempts.
///
/// Implementations must treat a repeated `submission_id` as the same
/// submission and acknowledge it again instead of storing a duplicate.
#[async_trait]
pub trait SubmissionSink: Send + Sync {
    /// Hand over a finalized snapshot.
    ///
    /// # Errors
    ///
    /// Returns `SinkError` if the sink did not accept the snapshot.
    async fn submit_answers(&self, snapshot: &SubmissionSnapshot) -> Result<Ack, SinkError>;
}

/// Durable queue of snapshots whose delivery failed.
#[async_trait]
pub trait SubmissionOutbox: Send + Sync {
    /// Queue a snapshot, or bump its attempt count if already queued.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the entry cannot be stored.
    async fn enqueue(
        &self,
        snapshot: &SubmissionSnapshot,
        attempts: u32,
        last_error: &str,
    ) -> Result<(), StorageError>;

    /// Oldest queued entries first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failure.
    async fn pending(&self, limit: u32) -> Result<Vec<OutboxEntry>, StorageError>;

    /// Drop an entry after it has been acknowledged.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if nothing is queued under this id.
    async fn remove(&self, submission_id: Uuid) -> Result<(), StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    clock: Clock,
    exams: Arc<Mutex<HashMap<ExamCode, ExamDefinition>>>,
    submissions: Arc<Mutex<Vec<(SubmissionSnapshot, Ack)>>>,
    outbox: Arc<Mutex<BTreeMap<Uuid, OutboxEntry>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Snapshots accepted so far, in arrival order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn submissions(&self) -> Result<Vec<SubmissionSnapshot>, StorageError> {
        let guard = self
            .submissions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.iter().map(|(snapshot, _)| snapshot.clone()).collect())
    }
}

#[async_trait]
impl ExamContentProvider for InMemoryRepository {
    async fn fetch_exam_definition(
        &self,
        code: &ExamCode,
    ) -> Result<ExamDefinition, StorageError> {
        let guard = self
            .exams
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.get(code).cloned().ok_or(StorageError::NotFound)
    }
}

#[async_trait]
impl ExamCatalog for InMemoryRepository {
    async fn upsert_exam(
        &self,
        code: &ExamCode,
        exam: &ExamDefinition,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .exams
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(code.clone(), exam.clone());
        Ok(())
    }

    async fn list_exam_codes(&self) -> Result<Vec<ExamCode>, StorageError> {
        let guard = self
            .exams
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut codes: Vec<ExamCode> = guard.keys().cloned().collect();
        codes.sort();
        Ok(codes)
    }
}

#[async_trait]
impl SubmissionSink for InMemoryRepository {
    async fn submit_answers(&self, snapshot: &SubmissionSnapshot) -> Result<Ack, SinkError> {
        let mut guard = self
            .submissions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        if let Some((_, ack)) = guard
            .iter()
            .find(|(stored, _)| stored.submission_id() == snapshot.submission_id())
        {
            return Ok(ack.clone());
        }
        let ack = Ack {
            receipt: snapshot.submission_id().to_string(),
            received_at: self.clock.now(),
        };
        guard.push((snapshot.clone(), ack.clone()));
        Ok(ack)
    }
}

#[async_trait]
impl SubmissionOutbox for InMemoryRepository {
    async fn enqueue(
        &self,
        snapshot: &SubmissionSnapshot,
        attempts: u32,
        last_error: &str,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .outbox
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let queued_at = self.clock.now();
        guard
            .entry(snapshot.submission_id())
            .and_modify(|entry| {
                entry.attempts = entry.attempts.saturating_add(attempts);
                entry.last_error = last_error.to_owned();
            })
            .or_insert_with(|| OutboxEntry {
                snapshot: snapshot.clone(),
                last_error: last_error.to_owned(),
                attempts,
                queued_at,
            });
        Ok(())
    }

    async fn pending(&self, limit: u32) -> Result<Vec<OutboxEntry>, StorageError> {
        let guard = self
            .outbox
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut entries: Vec<OutboxEntry> = guard.values().cloned().collect();
        entries.sort_by_key(|entry| entry.queued_at);
        entries.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(entries)
    }

    async fn remove(&self, submission_id: Uuid) -> Result<(), StorageError> {
        let mut guard = self
            .outbox
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard
            .remove(&submission_id)
            .map(|_| ())
            .ok_or(StorageError::NotFound)
    }
}

/// Aggregates the exam collaborators behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub exams: Arc<dyn ExamContentProvider>,
    pub catalog: Arc<dyn ExamCatalog>,
    pub sink: Arc<dyn SubmissionSink>,
    pub outbox: Arc<dyn SubmissionOutbox>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            exams: Arc::new(repo.clone()),
            catalog: Arc::new(repo.clone()),
            sink: Arc::new(repo.clone()),
            outbox: Arc::new(repo),
        }
    }
}
