//! Client for a remote exam API.

use async_trait::async_trait;
use exam_core::model::{ExamCode, ExamDefinition, SubmissionSnapshot};
use reqwest::{Client, StatusCode};
use storage::repository::{Ack, ExamContentProvider, SinkError, StorageError, SubmissionSink};

/// Talks to `GET {base}/exams/{code}` and `POST {base}/exams/{id}/submissions`.
#[derive(Clone, Debug)]
pub struct ExamApiClient {
    client: Client,
    base_url: String,
}

impl ExamApiClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    #[must_use]
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { client, base_url }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ExamContentProvider for ExamApiClient {
    async fn fetch_exam_definition(
        &self,
        code: &ExamCode,
    ) -> Result<ExamDefinition, StorageError> {
        let url = format!("{}/exams/{}", self.base_url, code.as_str());
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(StorageError::NotFound),
            status if !status.is_success() => {
                return Err(StorageError::Connection(format!(
                    "exam api returned {status}"
                )));
            }
            _ => {}
        }

        response
            .json::<ExamDefinition>()
            .await
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl SubmissionSink for ExamApiClient {
    async fn submit_answers(&self, snapshot: &SubmissionSnapshot) -> Result<Ack, SinkError> {
        let url = format!(
            "{}/exams/{}/submissions",
            self.base_url,
            snapshot.exam_id()
        );
        let response = self
            .client
            .post(url)
            .header("Idempotency-Key", snapshot.submission_id().to_string())
            .json(snapshot)
            .send()
            .await
            .map_err(|e| SinkError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Rejected {
                status: status.as_u16(),
            });
        }

        response
            .json::<Ack>()
            .await
            .map_err(|e| SinkError::InvalidResponse(e.to_string()))
    }
}
