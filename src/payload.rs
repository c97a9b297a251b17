use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PayloadError, ReportError};
use crate::models::{Job, Operation, Status, Task};
use crate::presence::{has_data, has_meaningful_data};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OperationInput {
  pub status: Option<Status>,
  pub message: Option<String>,
  pub data: Option<Value>,
  pub error: Option<Value>,
  pub created_timestamp: Option<DateTime<Utc>>,
  pub modified_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaskInput {
  pub job_id: Option<String>,
  pub system: Option<String>,
  pub method: Option<String>,
  pub status: Option<Status>,
  pub retries: Option<u32>,
  pub data: Option<Value>,
  pub dependency_tag: Option<String>,
  pub dependencies: Option<Vec<Value>>,
  pub operations: Option<Vec<OperationInput>>,
  pub created_timestamp: Option<DateTime<Utc>>,
  pub modified_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JobInput {
  pub job_id: Option<String>,
  pub system: Option<String>,
  #[serde(rename = "type")]
  pub job_type: Option<String>,
  pub project_id: Option<i64>,
  pub status: Option<Status>,
  pub tasks: Option<Vec<TaskInput>>,
}

pub fn build_operation(input: OperationInput) -> Result<Operation, PayloadError> {
  if input.data.is_some() && input.error.is_some() {
    return Err(PayloadError::DataAndError);
  }
  let status = input.status.ok_or(PayloadError::MissingField("status"))?;
  let now = Utc::now();

  Ok(Operation {
    status,
    message: input.message.filter(|message| !message.is_empty()),
    data: input.data,
    error: input.error,
    created_timestamp: input.created_timestamp.unwrap_or(now),
    modified_timestamp: input.modified_timestamp.unwrap_or(now),
  })
}

pub fn build_task(input: TaskInput) -> Result<Task, PayloadError> {
  let system = required(input.system, "system")?;
  let method = required(input.method, "method")?;
  let operations = input
    .operations
    .map(|operations| operations.into_iter().map(build_operation).collect::<Result<Vec<_>, _>>())
    .transpose()?;
  let now = Utc::now();

  Ok(Task {
    job_id: input.job_id,
    system,
    method,
    status: input.status,
    retries: input.retries,
    data: input.data,
    dependency_tag: input.dependency_tag,
    dependencies: input.dependencies,
    operations,
    created_timestamp: input.created_timestamp.unwrap_or(now),
    modified_timestamp: input.modified_timestamp.unwrap_or(now),
  })
}

/// Full job description as accepted by `POST /jobs`; every job-level field is required.
pub fn build_job_stats_object(input: JobInput) -> Result<Job, PayloadError> {
  if input.system.as_deref().is_none_or(str::is_empty) {
    return Err(PayloadError::MissingField("system"));
  }
  if input.job_type.as_deref().is_none_or(str::is_empty) {
    return Err(PayloadError::MissingField("type"));
  }
  if input.project_id.is_none() {
    return Err(PayloadError::MissingField("projectId"));
  }
  if input.status.is_none() {
    return Err(PayloadError::MissingField("status"));
  }
  build_job(input)
}

/// Job created only to hold a task when the caller supplied no job context.
/// Job-level identity is carried when known and omitted otherwise.
pub fn build_empty_job(input: JobInput) -> Result<Job, PayloadError> {
  build_job(input)
}

fn build_job(input: JobInput) -> Result<Job, PayloadError> {
  let tasks = input
    .tasks
    .ok_or(PayloadError::MissingField("tasks"))?
    .into_iter()
    .map(build_task)
    .collect::<Result<Vec<_>, _>>()?;
  let now = Utc::now();

  Ok(Job {
    job_id: input.job_id,
    system: input.system,
    job_type: input.job_type,
    project_id: input.project_id,
    status: input.status,
    tasks,
    created_timestamp: now,
    modified_timestamp: now,
  })
}

fn required(value: Option<String>, field: &'static str) -> Result<String, PayloadError> {
  value
    .filter(|value| !value.is_empty())
    .ok_or(PayloadError::MissingField(field))
}

/// What a caller hands in as the outcome of the work being reported.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResultLike {
  pub status: Option<String>,
  pub message: Option<Value>,
  pub data: Option<Value>,
  pub error: Option<Value>,
}

impl ResultLike {
  pub fn completed(data: Value) -> Self {
    Self {
      status: Some(Status::Completed.to_string()),
      data: Some(data),
      ..Default::default()
    }
  }

  pub fn failed(error: Value) -> Self {
    Self {
      status: Some(Status::Failed.to_string()),
      error: Some(error),
      ..Default::default()
    }
  }

  pub fn with_message(mut self, message: impl Into<String>) -> Self {
    self.message = Some(Value::String(message.into()));
    self
  }
}

/// Operation body posted to `/jobs/:jobId/tasks/:taskId/operations`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportedOperation {
  pub status: Status,
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub data: Option<Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<Value>,
}

impl ReportedOperation {
  pub fn from_result(result: Option<&ResultLike>) -> Result<Self, ReportError> {
    let result = result.ok_or(ReportError::MissingStatus)?;
    let status = result
      .status
      .as_deref()
      .filter(|status| !status.is_empty())
      .map(Status::from)
      .ok_or(ReportError::MissingStatus)?;

    let error = match &result.error {
      Some(error) if status.is_failed() && has_meaningful_data(error) => Some(error_details(error)),
      _ => None,
    };
    let data = match &result.data {
      Some(data) if !status.is_failed() && has_meaningful_data(data) => Some(data.clone()),
      _ => None,
    };

    Ok(Self {
      message: result_message(result),
      status,
      data,
      error,
    })
  }

  pub fn to_input(&self) -> OperationInput {
    OperationInput {
      status: Some(self.status.clone()),
      message: Some(self.message.clone()),
      data: self.data.clone(),
      error: self.error.clone(),
      ..Default::default()
    }
  }
}

fn result_message(result: &ResultLike) -> String {
  let error = result.error.as_ref();
  let candidates = [
    result.message.as_ref(),
    error.and_then(|error| error.get("message")),
    error.and_then(|error| error.pointer("/body/message")),
  ];
  candidates
    .into_iter()
    .find(|candidate| has_data(*candidate))
    .flatten()
    .map(|message| match message {
      Value::String(text) => text.clone(),
      other => other.to_string(),
    })
    .unwrap_or_default()
}

// HTTP client errors carry the useful part in `response.data`, thrown errors in `stack`.
fn error_details(error: &Value) -> Value {
  [error.pointer("/response/data"), error.get("stack")]
    .into_iter()
    .find(|candidate| has_data(*candidate))
    .flatten()
    .unwrap_or(error)
    .clone()
}
