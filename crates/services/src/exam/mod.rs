//! The exam-session core: one attempt from start to submission.

mod answers;
mod controller;
mod gate;
mod navigator;
mod session;
mod ticker;
mod view;

pub use answers::AnswerStore;
pub use controller::{
    ClockEvent, ClockEventKind, ClockOutcome, ExamSessionController, SessionConfig,
    SessionGeneration,
};
pub use gate::{SubmissionGate, SubmissionReceipt};
pub use navigator::Navigator;
pub use session::ExamSession;
pub use ticker::Ticker;
pub use view::{SessionView, format_countdown, progress_ratio};
