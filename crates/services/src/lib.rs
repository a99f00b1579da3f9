#![forbid(unsafe_code)]

pub mod delivery;
pub mod error;
pub mod exam;
pub mod http;

pub use exam_core::Clock;

pub use delivery::{DeliveryStatus, DrainReport, RetryPolicy, SubmissionDelivery, drain_outbox};
pub use error::SessionError;
pub use exam::{
    ClockOutcome, ExamSessionController, SessionConfig, SessionView, SubmissionGate,
    SubmissionReceipt,
};
pub use http::ExamApiClient;
