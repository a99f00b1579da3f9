use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use exam_core::fixtures::{DEMO_EXAM_CODE, demo_exam};
use exam_core::model::ExamCode;
use services::{
    DrainReport, ExamApiClient, RetryPolicy, SessionConfig, SubmissionDelivery, SubmissionGate,
    drain_outbox,
};
use storage::repository::{ExamCatalog, Storage, StorageError, SubmissionOutbox, SubmissionSink};
use tracing_subscriber::EnvFilter;

mod input;
mod take;

const DEFAULT_LOG_FILTER: &str = "app=info,services=info,storage=warn";

/// How long `take` spends redelivering queued submissions before the exam opens.
const STARTUP_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(name = "app", version, about = "Timed exams in the terminal")]
struct Cli {
    /// SQLite database holding exams and undelivered submissions
    #[arg(
        long = "db",
        env = "EXAM_DB_URL",
        default_value = "sqlite://exam.sqlite3",
        global = true
    )]
    db_url: String,

    /// Remote exam API; when set, exams are fetched from and submitted to it
    #[arg(long = "api", env = "EXAM_API_URL", global = true)]
    api_url: Option<String>,

    /// Length of one countdown second, in milliseconds
    #[arg(
        long,
        env = "EXAM_TICK_MILLIS",
        default_value_t = 1_000,
        value_parser = clap::value_parser!(u64).range(1..),
        global = true
    )]
    tick_millis: u64,

    /// Delivery attempts before a submission is parked in the outbox
    #[arg(
        long,
        env = "EXAM_SUBMIT_ATTEMPTS",
        default_value_t = 3,
        value_parser = clap::value_parser!(u32).range(1..),
        global = true
    )]
    max_attempts: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Take the exam stored under CODE
    Take { code: ExamCode },

    /// Store the demo exam under code `exam1`
    Seed,

    /// Retry submissions that could not be delivered
    Outbox {
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
}

fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == "sqlite::memory:" || trimmed.contains("mode=memory") {
        return trimmed.to_owned();
    }

    let rest = trimmed
        .strip_prefix("sqlite://")
        .or_else(|| trimmed.strip_prefix("sqlite:"))
        .unwrap_or(trimmed);
    let (path_str, query) = match rest.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (rest, None),
    };

    let path = Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };

    match query {
        Some(query) => format!("sqlite://{}?{query}", absolute.display()),
        None => format!("sqlite://{}", absolute.display()),
    }
}

fn prepare_sqlite_file(db_url: &str) -> Result<()> {
    let Some(path) = db_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or(path);
    anyhow::ensure!(!path.is_empty(), "invalid --db value: {db_url}");

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("creating {}", path.display()))?;
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("EXAM_LOG")
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn open_storage(cli: &Cli) -> Result<Storage> {
    let db_url = normalize_sqlite_url(&cli.db_url);
    prepare_sqlite_file(&db_url)?;
    let mut storage = Storage::sqlite(&db_url)
        .await
        .with_context(|| format!("opening database {db_url}"))?;
    tracing::debug!(%db_url, "database ready");

    // Submissions that fail against the API still queue in the local outbox.
    if let Some(api_url) = &cli.api_url {
        let client = Arc::new(ExamApiClient::new(api_url.as_str()));
        storage.exams = client.clone();
        storage.sink = client;
        tracing::info!(%api_url, "using remote exam api");
    }
    Ok(storage)
}

/// Redeliver queued submissions, giving up after `timeout` so the exam still opens.
///
/// Returns `None` when the drain did not finish in time.
async fn drain_before_exam(
    outbox: &dyn SubmissionOutbox,
    sink: &dyn SubmissionSink,
    timeout: Duration,
) -> Result<Option<DrainReport>, StorageError> {
    match tokio::time::timeout(timeout, drain_outbox(outbox, sink, 50)).await {
        Ok(report) => {
            let report = report?;
            if report.delivered > 0 || report.dropped > 0 {
                tracing::info!(
                    delivered = report.delivered,
                    dropped = report.dropped,
                    "drained queued submissions"
                );
            }
            Ok(Some(report))
        }
        Err(_) => {
            tracing::warn!(
                timeout_secs = timeout.as_secs(),
                "outbox drain is slow; remaining entries stay queued"
            );
            Ok(None)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let storage = open_storage(&cli).await?;

    match &cli.command {
        Command::Take { code } => {
            drain_before_exam(
                storage.outbox.as_ref(),
                storage.sink.as_ref(),
                STARTUP_DRAIN_TIMEOUT,
            )
            .await
            .context("checking the submission outbox")?;

            let policy = RetryPolicy {
                max_attempts: cli.max_attempts,
                ..RetryPolicy::default()
            };
            let delivery = SubmissionDelivery::new(Arc::clone(&storage.sink))
                .with_outbox(Arc::clone(&storage.outbox))
                .with_retry_policy(policy);
            let config = SessionConfig::default()
                .with_tick_period(Duration::from_millis(cli.tick_millis));

            take::run(
                storage.exams.as_ref(),
                code,
                SubmissionGate::new(delivery),
                config,
            )
            .await
        }
        Command::Seed => {
            let code = ExamCode::parse(DEMO_EXAM_CODE)?;
            let exam = demo_exam()?;
            storage.catalog.upsert_exam(&code, &exam).await?;
            let codes = storage.catalog.list_exam_codes().await?;
            println!(
                "seeded `{code}` ({}, {} questions)",
                exam.title(),
                exam.question_count()
            );
            println!(
                "available exams: {}",
                codes
                    .iter()
                    .map(ExamCode::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            Ok(())
        }
        Command::Outbox { limit } => {
            let queued = storage.outbox.pending(*limit).await?;
            if queued.is_empty() {
                println!("outbox is empty");
                return Ok(());
            }
            let report =
                drain_outbox(storage.outbox.as_ref(), storage.sink.as_ref(), *limit).await?;
            println!(
                "delivered {}, still queued {}, rejected and dropped {}",
                report.delivered, report.still_queued, report.dropped
            );
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        // Printed once here; lower layers only return errors.
        eprintln!("error: {err:#}");
        std::process::exit(2);
    }
}
