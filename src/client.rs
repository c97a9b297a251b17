use std::fmt;

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::ClientError;
use crate::models::{Job, Task};
use crate::payload::ReportedOperation;

pub const API_KEY_HEADER: &str = "X-API-KEY";

/// `/jobs[/:jobId/tasks[/:taskId/operations]]`, depending on which ids are known.
pub fn endpoint(job_id: Option<&str>, task_id: Option<&str>) -> String {
  match (job_id, task_id) {
    (Some(job_id), Some(task_id)) => format!("/jobs/{}/tasks/{}/operations", job_id, task_id),
    (Some(job_id), None) => format!("/jobs/{}/tasks", job_id),
    (None, _) => "/jobs".to_string(),
  }
}

/// POSTs records to the E18 API. Failures are returned as-is, never retried.
#[derive(Clone)]
pub struct E18Client {
  base_url: String,
  key: String,
  http: Client,
}

impl fmt::Debug for E18Client {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("E18Client")
      .field("base_url", &self.base_url)
      .field("key", &"<redacted>")
      .finish_non_exhaustive()
  }
}

impl E18Client {
  pub fn new(base_url: impl Into<String>, key: impl Into<String>) -> Self {
    Self::with_http_client(base_url, key, Client::new())
  }

  pub fn with_http_client(base_url: impl Into<String>, key: impl Into<String>, http: Client) -> Self {
    Self {
      base_url: base_url.into().trim_end_matches('/').to_string(),
      key: key.into(),
      http,
    }
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  pub async fn post<B: Serialize + ?Sized>(&self, path: &str, payload: &B) -> Result<Value, ClientError> {
    self.send(path, payload).await.map(|(_, body)| body)
  }

  pub async fn create_job(&self, job: &Job) -> Result<Value, ClientError> {
    self.post(&endpoint(None, None), job).await
  }

  /// Creates a task under `job_id` and returns the id E18 assigned along with the record.
  pub async fn create_task(&self, job_id: &str, task: &Task) -> Result<(String, Value), ClientError> {
    let (status, body) = self.send(&endpoint(Some(job_id), None), task).await?;
    match body.get("_id").and_then(Value::as_str) {
      Some(id) => Ok((id.to_string(), body)),
      None => Err(ClientError::MissingId { status, body }),
    }
  }

  pub async fn create_operation(
    &self,
    job_id: &str,
    task_id: &str,
    operation: &ReportedOperation,
  ) -> Result<Value, ClientError> {
    self.post(&endpoint(Some(job_id), Some(task_id)), operation).await
  }

  async fn send<B: Serialize + ?Sized>(&self, path: &str, payload: &B) -> Result<(u16, Value), ClientError> {
    let url = format!("{}{}", self.base_url, path);
    debug!("E18 POST {}", url);
    let response = self
      .http
      .post(&url)
      .header(API_KEY_HEADER, &self.key)
      .json(payload)
      .send()
      .await?;

    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
      return Err(ClientError::Status {
        status: status.as_u16(),
        body: parse_error_body(text),
      });
    }
    if text.trim().is_empty() {
      return Ok((status.as_u16(), Value::Null));
    }
    serde_json::from_str(&text)
      .map(|body| (status.as_u16(), body))
      .map_err(|e| ClientError::Decode {
        status: status.as_u16(),
        reason: e.to_string(),
      })
  }
}

// Error bodies are usually JSON but proxies in front of the API answer with plain text.
fn parse_error_body(text: String) -> Value {
  serde_json::from_str(&text).unwrap_or(Value::String(text))
}
