use exam_core::model::{ExamId, SubmissionReason};
use uuid::Uuid;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn exam_id_to_i64(id: ExamId) -> Result<i64, StorageError> {
    i64::try_from(id.value()).map_err(|_| StorageError::Serialization("exam_id overflow".into()))
}

pub(crate) fn exam_id_from_i64(v: i64) -> Result<ExamId, StorageError> {
    u64::try_from(v)
        .map(ExamId::new)
        .map_err(|_| StorageError::Serialization("exam_id sign overflow".into()))
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn parse_reason(s: &str) -> Result<SubmissionReason, StorageError> {
    match s {
        "manual" => Ok(SubmissionReason::Manual),
        "timeout" => Ok(SubmissionReason::Timeout),
        _ => Err(StorageError::Serialization(format!("invalid reason: {s}"))),
    }
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, StorageError> {
    Uuid::parse_str(s).map_err(ser)
}
