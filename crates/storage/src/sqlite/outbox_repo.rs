use exam_core::model::SubmissionSnapshot;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use super::SqliteRepository;
use super::mapping::{conn, parse_uuid, ser, u32_from_i64};
use crate::repository::{OutboxEntry, StorageError, SubmissionOutbox};

fn map_outbox_row(row: &SqliteRow) -> Result<OutboxEntry, StorageError> {
    let submission_id = parse_uuid(&row.try_get::<String, _>("submission_id").map_err(ser)?)?;
    let payload: String = row.try_get("payload").map_err(ser)?;
    let snapshot: SubmissionSnapshot = serde_json::from_str(&payload).map_err(ser)?;
    if snapshot.submission_id() != submission_id {
        return Err(StorageError::Serialization(format!(
            "outbox row {submission_id} holds another submission"
        )));
    }

    Ok(OutboxEntry {
        snapshot,
        last_error: row.try_get("last_error").map_err(ser)?,
        attempts: u32_from_i64("attempts", row.try_get::<i64, _>("attempts").map_err(ser)?)?,
        queued_at: row.try_get("queued_at").map_err(ser)?,
    })
}

#[async_trait::async_trait]
impl SubmissionOutbox for SqliteRepository {
    async fn enqueue(
        &self,
        snapshot: &SubmissionSnapshot,
        attempts: u32,
        last_error: &str,
    ) -> Result<(), StorageError> {
        let payload = serde_json::to_string(snapshot).map_err(ser)?;

        sqlx::query(
            r"
                INSERT INTO submission_outbox (submission_id, payload, attempts, last_error, queued_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(submission_id) DO UPDATE SET
                    attempts = submission_outbox.attempts + excluded.attempts,
                    last_error = excluded.last_error
            ",
        )
        .bind(snapshot.submission_id().to_string())
        .bind(payload)
        .bind(i64::from(attempts))
        .bind(last_error)
        .bind(self.clock.now())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        tracing::warn!(
            submission_id = %snapshot.submission_id(),
            attempts,
            last_error,
            "submission queued for redelivery"
        );
        Ok(())
    }

    async fn pending(&self, limit: u32) -> Result<Vec<OutboxEntry>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT submission_id, payload, attempts, last_error, queued_at
                FROM submission_outbox
                ORDER BY queued_at ASC, submission_id ASC
                LIMIT ?1
            ",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_outbox_row).collect()
    }

    async fn remove(&self, submission_id: Uuid) -> Result<(), StorageError> {
        let res = sqlx::query("DELETE FROM submission_outbox WHERE submission_id = ?1")
            .bind(submission_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}
