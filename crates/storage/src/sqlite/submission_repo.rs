use chrono::{DateTime, Utc};
use exam_core::model::{ExamId, SubmissionSnapshot};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, exam_id_to_i64, parse_reason, ser};
use crate::repository::{Ack, SinkError, StorageError, SubmissionSink};

impl SqliteRepository {
    /// Acknowledged submissions for one exam, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read or decode failure.
    pub async fn submissions_for_exam(
        &self,
        exam_id: ExamId,
    ) -> Result<Vec<SubmissionSnapshot>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT reason, payload
                FROM submissions
                WHERE exam_id = ?1
                ORDER BY submitted_at ASC, submission_id ASC
            ",
        )
        .bind(exam_id_to_i64(exam_id)?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter()
            .map(|row| {
                let payload: String = row.try_get("payload").map_err(ser)?;
                let snapshot: SubmissionSnapshot = serde_json::from_str(&payload).map_err(ser)?;
                let reason = parse_reason(&row.try_get::<String, _>("reason").map_err(ser)?)?;
                if reason != snapshot.reason() {
                    return Err(StorageError::Serialization(format!(
                        "reason column {reason} disagrees with payload"
                    )));
                }
                Ok(snapshot)
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl SubmissionSink for SqliteRepository {
    async fn submit_answers(&self, snapshot: &SubmissionSnapshot) -> Result<Ack, SinkError> {
        let submission_id = snapshot.submission_id().to_string();
        let payload = serde_json::to_string(snapshot).map_err(ser)?;

        sqlx::query(
            r"
                INSERT INTO submissions (
                    submission_id, exam_id, reason, submitted_at, received_at, payload
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(submission_id) DO NOTHING
            ",
        )
        .bind(submission_id.as_str())
        .bind(exam_id_to_i64(snapshot.exam_id())?)
        .bind(snapshot.reason().as_str())
        .bind(snapshot.submitted_at())
        .bind(self.clock.now())
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        // A redelivery keeps the first receipt time.
        let received_at: DateTime<Utc> =
            sqlx::query("SELECT received_at FROM submissions WHERE submission_id = ?1")
                .bind(submission_id.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(conn)?
                .try_get("received_at")
                .map_err(ser)?;

        Ok(Ack {
            receipt: submission_id,
            received_at,
        })
    }
}
