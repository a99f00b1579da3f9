use exam_core::model::{ExamCode, ExamDefinition, Question};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::SqliteRepository;
use super::mapping::{conn, exam_id_from_i64, exam_id_to_i64, ser, u32_from_i64};
use crate::repository::{ExamCatalog, ExamContentProvider, StorageError};

fn map_exam_row(row: &SqliteRow) -> Result<ExamDefinition, StorageError> {
    let exam_id = exam_id_from_i64(row.try_get::<i64, _>("exam_id").map_err(ser)?)?;
    let title: String = row.try_get("title").map_err(ser)?;
    let duration_seconds = u32_from_i64(
        "duration_seconds",
        row.try_get::<i64, _>("duration_seconds").map_err(ser)?,
    )?;
    let questions_json: String = row.try_get("questions").map_err(ser)?;
    let questions: Vec<Question> = serde_json::from_str(&questions_json).map_err(ser)?;

    ExamDefinition::new(exam_id, title, duration_seconds, questions).map_err(ser)
}

#[async_trait::async_trait]
impl ExamContentProvider for SqliteRepository {
    async fn fetch_exam_definition(
        &self,
        code: &ExamCode,
    ) -> Result<ExamDefinition, StorageError> {
        let row = sqlx::query(
            r"
                SELECT exam_id, title, duration_seconds, questions
                FROM exams
                WHERE code = ?1
            ",
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        map_exam_row(&row)
    }
}

#[async_trait::async_trait]
impl ExamCatalog for SqliteRepository {
    async fn upsert_exam(
        &self,
        code: &ExamCode,
        exam: &ExamDefinition,
    ) -> Result<(), StorageError> {
        let questions = serde_json::to_string(exam.questions()).map_err(ser)?;

        sqlx::query(
            r"
                INSERT INTO exams (code, exam_id, title, duration_seconds, questions, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(code) DO UPDATE SET
                    exam_id = excluded.exam_id,
                    title = excluded.title,
                    duration_seconds = excluded.duration_seconds,
                    questions = excluded.questions,
                    updated_at = excluded.updated_at
            ",
        )
        .bind(code.as_str())
        .bind(exam_id_to_i64(exam.id())?)
        .bind(exam.title())
        .bind(i64::from(exam.duration_seconds()))
        .bind(questions)
        .bind(self.clock.now())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        tracing::debug!(code = %code, exam_id = %exam.id(), "exam stored");
        Ok(())
    }

    async fn list_exam_codes(&self) -> Result<Vec<ExamCode>, StorageError> {
        let rows = sqlx::query("SELECT code FROM exams ORDER BY code ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        rows.iter()
            .map(|row| {
                let code: String = row.try_get("code").map_err(ser)?;
                ExamCode::parse(code).map_err(ser)
            })
            .collect()
    }
}
