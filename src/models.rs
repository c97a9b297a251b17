use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state shared by jobs, tasks and operations.
///
/// Operations only ever report `completed` or `failed`, but callers may hand in
/// any string; unknown values travel as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Status {
  Running,
  Completed,
  Failed,
  Suspended,
  Waiting,
  Other(String),
}

impl Status {
  pub fn as_str(&self) -> &str {
    match self {
      Status::Running => "running",
      Status::Completed => "completed",
      Status::Failed => "failed",
      Status::Suspended => "suspended",
      Status::Waiting => "waiting",
      Status::Other(other) => other,
    }
  }

  pub fn is_failed(&self) -> bool {
    matches!(self, Status::Failed)
  }
}

impl From<&str> for Status {
  fn from(value: &str) -> Self {
    match value {
      "running" => Status::Running,
      "completed" => Status::Completed,
      "failed" => Status::Failed,
      "suspended" => Status::Suspended,
      "waiting" => Status::Waiting,
      other => Status::Other(other.to_string()),
    }
  }
}

impl From<String> for Status {
  fn from(value: String) -> Self {
    Status::from(value.as_str())
  }
}

impl From<Status> for String {
  fn from(status: Status) -> Self {
    status.as_str().to_string()
  }
}

impl fmt::Display for Status {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
  pub status: Status,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub data: Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<Value>,
  #[serde(with = "iso_millis")]
  pub created_timestamp: DateTime<Utc>,
  #[serde(with = "iso_millis")]
  pub modified_timestamp: DateTime<Utc>,
}

// Field order below is the order E18 shows them in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub job_id: Option<String>,
  pub system: String,
  pub method: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub status: Option<Status>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub retries: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub data: Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub dependency_tag: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub dependencies: Option<Vec<Value>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub operations: Option<Vec<Operation>>,
  #[serde(with = "iso_millis")]
  pub created_timestamp: DateTime<Utc>,
  #[serde(with = "iso_millis")]
  pub modified_timestamp: DateTime<Utc>,
}

/// Top-level statistics record. `system`, `type` and `projectId` may be absent
/// on an empty job created only to hold a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub job_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub system: Option<String>,
  #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
  pub job_type: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub project_id: Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub status: Option<Status>,
  pub tasks: Vec<Task>,
  #[serde(with = "iso_millis")]
  pub created_timestamp: DateTime<Utc>,
  #[serde(with = "iso_millis")]
  pub modified_timestamp: DateTime<Utc>,
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
pub mod iso_millis {
  use chrono::{DateTime, SecondsFormat, Utc};
  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&raw)
      .map(|parsed| parsed.with_timezone(&Utc))
      .map_err(serde::de::Error::custom)
  }
}
