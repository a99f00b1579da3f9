use exam_core::fixtures::demo_exam;
use exam_core::model::{
    AnswerRecord, AnswerValue, ExamCode, QuestionId, SubmissionReason, SubmissionSnapshot,
};
use exam_core::time::{fixed_clock, fixed_now};
use storage::repository::{
    ExamCatalog, ExamContentProvider, StorageError, SubmissionOutbox, SubmissionSink,
};
use storage::sqlite::SqliteRepository;

async fn repo(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url)
        .await
        .expect("connect")
        .with_clock(fixed_clock());
    repo.migrate().await.expect("migrate");
    repo
}

fn snapshot(reason: SubmissionReason) -> SubmissionSnapshot {
    let mut answers = AnswerRecord::new();
    answers.insert(QuestionId::new(1), AnswerValue::choice(1));
    answers.insert(QuestionId::new(4), AnswerValue::text("functions capture scope"));
    SubmissionSnapshot::new(
        demo_exam().unwrap().id(),
        answers,
        reason,
        fixed_now(),
        fixed_now(),
        120,
    )
}

#[tokio::test]
async fn sqlite_stores_and_fetches_exam_by_code() {
    let repo = repo("memdb_exams").await;
    let exam = demo_exam().unwrap();
    let code = ExamCode::parse("exam1").unwrap();

    repo.upsert_exam(&code, &exam).await.unwrap();
    // Re-seeding the same code replaces instead of failing.
    repo.upsert_exam(&code, &exam).await.unwrap();

    let fetched = repo.fetch_exam_definition(&code).await.unwrap();
    assert_eq!(fetched, exam);
    assert_eq!(repo.list_exam_codes().await.unwrap(), vec![code]);

    let missing = ExamCode::parse("exam2").unwrap();
    assert!(matches!(
        repo.fetch_exam_definition(&missing).await,
        Err(StorageError::NotFound)
    ));
}

#[tokio::test]
async fn sqlite_sink_deduplicates_by_submission_id() {
    let repo = repo("memdb_submissions").await;
    let snapshot = snapshot(SubmissionReason::Manual);

    let first = repo.submit_answers(&snapshot).await.unwrap();
    let again = repo.submit_answers(&snapshot).await.unwrap();
    assert_eq!(first, again);
    assert_eq!(first.receipt, snapshot.submission_id().to_string());

    let stored = repo.submissions_for_exam(snapshot.exam_id()).await.unwrap();
    assert_eq!(stored, vec![snapshot]);
}

#[tokio::test]
async fn sqlite_outbox_keeps_snapshot_until_removed() {
    let repo = repo("memdb_outbox").await;
    let snapshot = snapshot(SubmissionReason::Timeout);

    repo.enqueue(&snapshot, 3, "connection refused").await.unwrap();
    repo.enqueue(&snapshot, 2, "503").await.unwrap();

    let pending = repo.pending(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].snapshot, snapshot);
    assert_eq!(pending[0].attempts, 5);
    assert_eq!(pending[0].last_error, "503");

    repo.remove(snapshot.submission_id()).await.unwrap();
    assert!(repo.pending(10).await.unwrap().is_empty());
}
