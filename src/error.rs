use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PayloadError {
  #[error("missing \"{0}\" property")]
  MissingField(&'static str),
  #[error("Operation can not have both \"data\" and \"error\"")]
  DataAndError,
}

/// Why a reporting call ended without creating its operation.
///
/// The `Display` text is what lands in the `error` field of the returned record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReportError {
  #[error("missing url to E18")]
  MissingUrl,
  #[error("missing key to E18")]
  MissingKey,
  #[error("missing \"system\" property")]
  MissingSystem,
  #[error("missing \"method\" property")]
  MissingMethod,
  #[error("missing data for E18")]
  MissingData,
  #[error("missing result status")]
  MissingStatus,
  #[error("UserAgent excluded")]
  UserAgentExcluded,
  #[error(transparent)]
  Payload(#[from] PayloadError),
  #[error("{message}")]
  Remote { message: String },
}

impl ReportError {
  /// Configuration, validation and exclusion failures; none of them touch the network.
  pub fn is_local(&self) -> bool {
    !matches!(self, ReportError::Remote { .. })
  }
}

#[derive(Debug, Error)]
pub enum ClientError {
  #[error("E18 responded with {status}: {body}")]
  Status { status: u16, body: Value },
  #[error("request to E18 failed: {0}")]
  Transport(#[from] reqwest::Error),
  #[error("failed to decode E18 response ({status}): {reason}")]
  Decode { status: u16, reason: String },
  #[error("missing \"_id\" in response")]
  MissingId { status: u16, body: Value },
}

const DEFAULT_STATUS_CODE: u16 = 500;

impl ClientError {
  /// HTTP status of the failed call, 500 when the request never got an answer.
  pub fn status_code(&self) -> u16 {
    match self {
      ClientError::Status { status, .. }
      | ClientError::Decode { status, .. }
      | ClientError::MissingId { status, .. } => *status,
      ClientError::Transport(e) => e.status().map(|s| s.as_u16()).unwrap_or(DEFAULT_STATUS_CODE),
    }
  }

  /// Human readable reason, preferring the `message` the API put in its error body.
  pub fn message(&self) -> String {
    match self {
      ClientError::Status { status, body } => body_message(body).unwrap_or_else(|| format!("HTTP {status}")),
      other => other.to_string(),
    }
  }
}

fn body_message(body: &Value) -> Option<String> {
  let candidate = match body {
    Value::String(text) => Some(text.as_str()),
    Value::Object(map) => ["message", "error"]
      .iter()
      .find_map(|key| map.get(*key).and_then(Value::as_str)),
    _ => None,
  };
  candidate
    .map(str::trim)
    .filter(|text| !text.is_empty())
    .map(str::to_string)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn display_texts_match_wire_errors() {
    assert_eq!(ReportError::MissingUrl.to_string(), "missing url to E18");
    assert_eq!(ReportError::MissingSystem.to_string(), "missing \"system\" property");
    assert_eq!(ReportError::UserAgentExcluded.to_string(), "UserAgent excluded");
    assert_eq!(
      ReportError::from(PayloadError::DataAndError).to_string(),
      "Operation can not have both \"data\" and \"error\""
    );
    assert!(!ReportError::Remote { message: "conflict".into() }.is_local());
  }

  #[test]
  fn status_error_prefers_body_message() {
    let err = ClientError::Status { status: 409, body: json!({ "message": "Task already exists" }) };
    assert_eq!(err.status_code(), 409);
    assert_eq!(err.message(), "Task already exists");
  }

  #[test]
  fn status_error_falls_back_when_body_has_no_message() {
    let err = ClientError::Status { status: 502, body: json!({ "detail": [] }) };
    assert_eq!(err.message(), "HTTP 502");

    let err = ClientError::Status { status: 400, body: json!("bad payload") };
    assert_eq!(err.message(), "bad payload");
  }
}
