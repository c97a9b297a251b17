use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::ReportError;
use crate::models::Status;
use crate::payload::TaskInput;
use crate::presence::{has_data, has_meaningful_data};

const IDENTITY_HEADERS: [&str; 4] = ["e18jobid", "e18jobsystem", "e18jobtype", "e18jobprojectid"];

const OPTION_KEYS: [&str; 12] = [
  "jobId",
  "taskId",
  "system",
  "method",
  "jobSystem",
  "jobType",
  "jobProjectId",
  "status",
  "retries",
  "data",
  "dependencyTag",
  "dependencies",
];

/// Header map with case-insensitive names. Values stay JSON so proxies that
/// forward structured headers (an object in `e18task`) are handled too.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "BTreeMap<String, Value>")]
pub struct Headers(BTreeMap<String, Value>);

impl Headers {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, name: &str, value: impl Into<Value>) {
    self.0.insert(name.to_ascii_lowercase(), value.into());
  }

  pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
    self.insert(name, value);
    self
  }

  pub fn get(&self, name: &str) -> Option<&Value> {
    self.0.get(&name.to_ascii_lowercase())
  }

  pub fn get_str(&self, name: &str) -> Option<&str> {
    self.get(name).and_then(Value::as_str)
  }
}

impl From<BTreeMap<String, Value>> for Headers {
  fn from(raw: BTreeMap<String, Value>) -> Self {
    raw.into_iter().collect()
  }
}

impl<K: AsRef<str>, V: Into<Value>> FromIterator<(K, V)> for Headers {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    let mut headers = Headers::new();
    for (name, value) in iter {
      headers.insert(name.as_ref(), value);
    }
    headers
  }
}

/// Anything a caller can report from: an HTTP request (`body`, `headers`) or a
/// plain options object whose fields sit at the top level.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RequestLike {
  #[serde(default)]
  pub body: Value,
  #[serde(default)]
  pub headers: Headers,
  #[serde(flatten)]
  pub options: Map<String, Value>,
}

impl RequestLike {
  pub fn from_body(body: Value) -> Self {
    Self { body, ..Default::default() }
  }

  pub fn from_headers(headers: Headers) -> Self {
    Self { headers, ..Default::default() }
  }

  /// Direct options; non-object values yield an empty request.
  pub fn from_options(options: Value) -> Self {
    match options {
      Value::Object(options) => Self { options, ..Default::default() },
      _ => Self::default(),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecutionContext {
  pub function_name: Option<String>,
}

/// Ambient execution context of the caller, e.g. the serverless function being run.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Context {
  pub execution_context: ExecutionContext,
}

impl Context {
  pub fn for_function(name: impl Into<String>) -> Self {
    Self {
      execution_context: ExecutionContext { function_name: Some(name.into()) },
    }
  }

  pub fn function_name(&self) -> Option<&str> {
    self.execution_context.function_name.as_deref().filter(|name| !name.is_empty())
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InfoSource {
  Body,
  Headers,
  Options,
  #[default]
  None,
}

impl fmt::Display for InfoSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      InfoSource::Body => "body",
      InfoSource::Headers => "headers",
      InfoSource::Options => "options",
      InfoSource::None => "none",
    };
    f.write_str(name)
  }
}

/// Job and task identity found on one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedInfo {
  pub source: InfoSource,
  pub job_id: Option<String>,
  pub task_id: Option<String>,
  pub job_system: Option<String>,
  pub job_type: Option<String>,
  pub job_project_id: Option<i64>,
  pub system: Option<String>,
  pub method: Option<String>,
  pub status: Option<Status>,
  pub retries: Option<u32>,
  pub data: Option<Value>,
  pub dependency_tag: Option<String>,
  pub dependencies: Option<Vec<Value>>,
}

impl ResolvedInfo {
  fn from_fields(source: InfoSource, fields: &Map<String, Value>) -> Self {
    Self {
      source,
      job_id: text(fields.get("jobId")),
      task_id: text(fields.get("taskId")),
      job_system: text(fields.get("jobSystem")),
      job_type: text(fields.get("jobType")),
      job_project_id: fields.get("jobProjectId").and_then(project_id),
      system: text(fields.get("system")),
      method: text(fields.get("method")),
      status: text(fields.get("status")).map(Status::from),
      retries: fields
        .get("retries")
        .and_then(Value::as_u64)
        .and_then(|retries| u32::try_from(retries).ok()),
      data: fields.get("data").filter(|data| has_meaningful_data(data)).cloned(),
      dependency_tag: text(fields.get("dependencyTag")),
      dependencies: fields.get("dependencies").and_then(Value::as_array).cloned(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.source == InfoSource::None
  }

  /// Task description under the given identity, carrying whatever task fields were supplied.
  pub fn task_input(&self, identity: &TaskIdentity) -> TaskInput {
    TaskInput {
      system: Some(identity.system.clone()),
      method: Some(identity.method.clone()),
      status: self.status.clone(),
      retries: self.retries,
      data: self.data.clone(),
      dependency_tag: self.dependency_tag.clone(),
      dependencies: self.dependencies.clone(),
      ..Default::default()
    }
  }
}

/// Finds E18 context on a request: `body.e18` first, then the `e18*` headers,
/// then top-level option fields.
pub fn resolve_info(request: &RequestLike) -> ResolvedInfo {
  if let Some(e18) = request.body.get("e18").filter(|e18| has_meaningful_data(e18)) {
    match structured(e18) {
      Some(fields) => return ResolvedInfo::from_fields(InfoSource::Body, &fields),
      None => {
        warn!("Ignoring body.e18, expected an object but got {}", e18);
        return ResolvedInfo { source: InfoSource::Body, ..Default::default() };
      }
    }
  }

  if IDENTITY_HEADERS.iter().any(|name| has_data(request.headers.get(name))) {
    return from_headers(&request.headers);
  }

  if OPTION_KEYS.iter().any(|key| has_data(request.options.get(*key))) {
    return ResolvedInfo::from_fields(InfoSource::Options, &request.options);
  }

  debug!("No E18 context found on request");
  ResolvedInfo::default()
}

fn from_headers(headers: &Headers) -> ResolvedInfo {
  let task = headers
    .get("e18task")
    .filter(|task| has_meaningful_data(task))
    .and_then(|task| {
      let fields = structured(task);
      if fields.is_none() {
        warn!("Ignoring e18task header, not a JSON object");
      }
      fields
    })
    .unwrap_or_default();

  let mut info = ResolvedInfo::from_fields(InfoSource::Headers, &task);
  info.job_id = text(headers.get("e18jobid")).or(info.job_id);
  info.task_id = text(headers.get("e18taskid")).or(info.task_id);
  info.job_system = text(headers.get("e18jobsystem")).or(info.job_system);
  info.job_type = text(headers.get("e18jobtype")).or(info.job_type);
  info.job_project_id = headers.get("e18jobprojectid").and_then(project_id).or(info.job_project_id);
  info
}

// Accepts an object as-is or a string holding a serialized object.
fn structured(value: &Value) -> Option<Map<String, Value>> {
  match value {
    Value::Object(fields) => Some(fields.clone()),
    Value::String(raw) => match serde_json::from_str(raw) {
      Ok(Value::Object(fields)) => Some(fields),
      _ => None,
    },
    _ => None,
  }
}

fn text(value: Option<&Value>) -> Option<String> {
  match value? {
    Value::String(text) if !text.is_empty() => Some(text.clone()),
    Value::Number(number) => Some(number.to_string()),
    _ => None,
  }
}

// Integer prefix of a number or numeric string, the way `parseInt` reads it.
fn project_id(value: &Value) -> Option<i64> {
  match value {
    Value::Number(number) => number.as_i64().or_else(|| number.as_f64().map(|n| n.trunc() as i64)),
    Value::String(raw) => {
      let raw = raw.trim();
      let sign_len = usize::from(raw.starts_with(['-', '+']));
      let digits = raw[sign_len..].chars().take_while(char::is_ascii_digit).count();
      if digits == 0 {
        return None;
      }
      raw[..sign_len + digits].parse().ok()
    }
    _ => None,
  }
}

/// Which side wins when both the ambient environment and the payload name the task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Precedence {
  /// `E18_SYSTEM` and the context function name override the payload.
  #[default]
  AmbientWins,
  /// Payload values override the environment and context.
  PayloadWins,
}

impl Precedence {
  pub fn pick<T>(self, ambient: Option<T>, payload: Option<T>) -> Option<T> {
    match self {
      Precedence::AmbientWins => ambient.or(payload),
      Precedence::PayloadWins => payload.or(ambient),
    }
  }
}

impl FromStr for Precedence {
  type Err = String;

  fn from_str(raw: &str) -> Result<Self, Self::Err> {
    match raw.trim().to_ascii_lowercase().as_str() {
      "ambient" => Ok(Precedence::AmbientWins),
      "payload" => Ok(Precedence::PayloadWins),
      other => Err(format!("unknown precedence '{}', expected 'ambient' or 'payload'", other)),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskIdentity {
  pub system: String,
  pub method: String,
}

/// Settles `system` and `method` for the task being reported.
pub fn resolve_task_identity(
  info: &ResolvedInfo,
  env_system: Option<&str>,
  context: Option<&Context>,
  precedence: Precedence,
) -> Result<TaskIdentity, ReportError> {
  let system = precedence
    .pick(env_system.filter(|system| !system.is_empty()), info.system.as_deref())
    .ok_or(ReportError::MissingSystem)?;
  let context_method = context.and_then(Context::function_name).map(str::to_lowercase);
  let method = precedence
    .pick(context_method, info.method.clone())
    .ok_or(ReportError::MissingMethod)?;

  Ok(TaskIdentity {
    system: system.to_string(),
    method,
  })
}
