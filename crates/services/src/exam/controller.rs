use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use exam_core::Clock;
use exam_core::model::{
    AnswerValue, ExamCode, ExamDefinition, QuestionId, SessionStatus, SubmissionReason,
};
use storage::repository::{ExamContentProvider, StorageError};
use tokio::sync::mpsc;

use super::gate::{SubmissionGate, SubmissionReceipt};
use super::session::ExamSession;
use super::ticker::Ticker;
use super::view::SessionView;
use crate::error::SessionError;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Identifies one controller instance; clock events from any other
/// generation are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionGeneration(u64);

impl SessionGeneration {
    fn next() -> Self {
        Self(NEXT_GENERATION.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEventKind {
    /// The n-th elapsed period, starting at 1.
    Tick(u32),
    Exhausted,
}

/// Message from the ticker task to the controller's event queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockEvent {
    pub generation: SessionGeneration,
    pub kind: ClockEventKind,
}

impl ClockEvent {
    #[must_use]
    pub fn tick(generation: SessionGeneration, n: u32) -> Self {
        Self {
            generation,
            kind: ClockEventKind::Tick(n),
        }
    }

    #[must_use]
    pub fn exhausted(generation: SessionGeneration) -> Self {
        Self {
            generation,
            kind: ClockEventKind::Exhausted,
        }
    }
}

/// What applying one clock event did to the session.
#[derive(Debug, Clone)]
pub enum ClockOutcome {
    Ticked { remaining: u32 },
    TimedOut(SubmissionReceipt),
    /// Stale, or the session is no longer in progress.
    Discarded,
    /// No more clock events will arrive.
    Stopped,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Wall time per countdown second. One second outside demos and tests.
    pub tick_period: Duration,
    pub clock: Clock,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_secs(1),
            clock: Clock::System,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn with_tick_period(mut self, tick_period: Duration) -> Self {
        self.tick_period = tick_period;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

/// Owns one exam attempt and serializes every change to it.
///
/// All mutation goes through `&mut self`, so ticks, navigation, answers and
/// submission never interleave. Ticks reach the session only through
/// [`ExamSessionController::pump`] (or `apply_clock_event`), on the same
/// task that handles user input.
pub struct ExamSessionController {
    session: ExamSession,
    ticker: Ticker,
    gate: SubmissionGate,
    config: SessionConfig,
    generation: SessionGeneration,
    events_tx: Option<mpsc::UnboundedSender<ClockEvent>>,
    events_rx: mpsc::UnboundedReceiver<ClockEvent>,
    receipt: Option<SubmissionReceipt>,
    closed: bool,
}

impl fmt::Debug for ExamSessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExamSessionController")
            .field("generation", &self.generation)
            .field("status", &self.session.status())
            .field("remaining_seconds", &self.session.remaining_seconds())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl ExamSessionController {
    /// Build a controller in `Loading`. Nothing runs until [`start`](Self::start).
    #[must_use]
    pub fn new(
        definition: Arc<ExamDefinition>,
        gate: SubmissionGate,
        config: SessionConfig,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            session: ExamSession::new(definition),
            ticker: Ticker::new(),
            gate,
            config,
            generation: SessionGeneration::next(),
            events_tx: Some(events_tx),
            events_rx,
            receipt: None,
            closed: false,
        }
    }

    /// Resolve `code` and start the attempt.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound` if no exam uses `code`, or
    /// `SessionError::Storage` if the provider failed.
    pub async fn load(
        provider: &dyn ExamContentProvider,
        code: &ExamCode,
        gate: SubmissionGate,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let definition = provider
            .fetch_exam_definition(code)
            .await
            .map_err(|err| match err {
                StorageError::NotFound => SessionError::NotFound { code: code.clone() },
                other => SessionError::Storage(other),
            })?;
        tracing::debug!(%code, exam_id = %definition.id(), "exam definition resolved");

        let mut controller = Self::new(Arc::new(definition), gate, config);
        controller.start();
        Ok(controller)
    }

    /// `Loading -> InProgress`, and start the countdown.
    ///
    /// Returns `false` if the session already started or the controller was
    /// closed. Must be called from within a Tokio runtime.
    pub fn start(&mut self) -> bool {
        if self.closed || !self.session.begin(self.config.clock.now()) {
            return false;
        }
        let Some(tx) = self.events_tx.take() else {
            return false;
        };

        let generation = self.generation;
        let exhausted_tx = tx.clone();
        self.ticker.start(
            self.config.tick_period,
            self.session.remaining_seconds(),
            move |n| {
                let _ = tx.send(ClockEvent::tick(generation, n));
            },
            move || {
                let _ = exhausted_tx.send(ClockEvent::exhausted(generation));
            },
        );

        tracing::info!(
            exam_id = %self.session.definition().id(),
            %generation,
            duration_seconds = self.session.remaining_seconds(),
            "exam session started"
        );
        true
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `SessionError::Closed` after [`close`](Self::close),
    /// `SessionError::InvalidSessionState` outside `InProgress`, or
    /// `SessionError::Answer` if `value` does not fit the question.
    pub fn answer(&mut self, question: QuestionId, value: AnswerValue) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.session.answer_question(question, value)
    }

    /// Answer whichever question is on screen.
    ///
    /// # Errors
    ///
    /// Same as [`answer`](Self::answer).
    pub fn answer_current(&mut self, value: AnswerValue) -> Result<(), SessionError> {
        let question = self.session.current_question().id();
        self.answer(question, value)
    }

    /// # Errors
    ///
    /// Returns `SessionError::Closed` after [`close`](Self::close), or
    /// `SessionError::InvalidSessionState` outside `InProgress`.
    pub fn next(&mut self) -> Result<usize, SessionError> {
        self.ensure_open()?;
        self.session.next()
    }

    /// # Errors
    ///
    /// Same as [`next`](Self::next).
    pub fn previous(&mut self) -> Result<usize, SessionError> {
        self.ensure_open()?;
        self.session.previous()
    }

    /// # Errors
    ///
    /// Same as [`next`](Self::next), or `SessionError::IndexOutOfRange` past
    /// the last question.
    pub fn go_to(&mut self, index: usize) -> Result<usize, SessionError> {
        self.ensure_open()?;
        self.session.go_to(index)
    }

    /// Submit now. `None` if the session is not in progress, including when
    /// a timeout already submitted it, or if the controller was closed.
    ///
    /// Must be called from within a Tokio runtime: delivery runs on a
    /// spawned task.
    pub fn submit(&mut self) -> Option<SubmissionReceipt> {
        self.finish(SubmissionReason::Manual)
    }

    fn finish(&mut self, reason: SubmissionReason) -> Option<SubmissionReceipt> {
        if self.closed {
            tracing::debug!(%reason, "submit ignored on closed session");
            return None;
        }
        let receipt = self.gate.submit(
            &mut self.session,
            &mut self.ticker,
            reason,
            self.config.clock.now(),
        )?;
        self.receipt = Some(receipt.clone());
        Some(receipt)
    }

    /// Apply one event from the ticker.
    ///
    /// Must be called from within a Tokio runtime, since a timeout submits.
    pub fn apply_clock_event(&mut self, event: ClockEvent) -> ClockOutcome {
        if self.closed || event.generation != self.generation {
            tracing::debug!(
                event_generation = %event.generation,
                generation = %self.generation,
                closed = self.closed,
                "stale clock event discarded"
            );
            return ClockOutcome::Discarded;
        }
        if self.session.status() != SessionStatus::InProgress {
            tracing::debug!(status = %self.session.status(), kind = ?event.kind, "clock event ignored");
            return ClockOutcome::Discarded;
        }

        match event.kind {
            ClockEventKind::Tick(n) => {
                let remaining = self.session.record_tick();
                tracing::debug!(tick = n, remaining, "tick");
                if remaining == 0 {
                    return self.time_out();
                }
                ClockOutcome::Ticked { remaining }
            }
            ClockEventKind::Exhausted => {
                self.session.expire();
                self.time_out()
            }
        }
    }

    fn time_out(&mut self) -> ClockOutcome {
        match self.finish(SubmissionReason::Timeout) {
            Some(receipt) => ClockOutcome::TimedOut(receipt),
            None => ClockOutcome::Discarded,
        }
    }

    /// Wait for the next clock event and apply it.
    ///
    /// Returns `Stopped` straight away once the session has left
    /// `InProgress`. Cancel-safe, so it can sit in a `tokio::select!` next
    /// to user input.
    pub async fn pump(&mut self) -> ClockOutcome {
        if self.closed || self.session.status() != SessionStatus::InProgress {
            return ClockOutcome::Stopped;
        }
        match self.events_rx.recv().await {
            Some(event) => self.apply_clock_event(event),
            None => ClockOutcome::Stopped,
        }
    }

    /// Tear down: the ticker stops before this returns and anything still
    /// queued is discarded.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.ticker.cancel();
        self.events_rx.close();
        tracing::debug!(generation = %self.generation, status = %self.session.status(), "exam session closed");
    }

    #[must_use]
    pub fn view(&self) -> SessionView {
        SessionView::from_session(&self.session)
    }

    #[must_use]
    pub fn session(&self) -> &ExamSession {
        &self.session
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    #[must_use]
    pub fn remaining_seconds(&self) -> u32 {
        self.session.remaining_seconds()
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.session.current_index()
    }

    #[must_use]
    pub fn generation(&self) -> SessionGeneration {
        self.generation
    }

    /// The receipt of the submission, once there is one.
    #[must_use]
    pub fn receipt(&self) -> Option<&SubmissionReceipt> {
        self.receipt.as_ref()
    }

    #[must_use]
    pub fn is_clock_running(&self) -> bool {
        self.ticker.is_running()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for ExamSessionController {
    fn drop(&mut self) {
        self.close();
    }
}
