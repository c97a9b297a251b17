use anyhow::Context as _;
use reqwest::Client;
use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::client::E18Client;
use crate::config::Config;
use crate::error::{ClientError, PayloadError, ReportError};
use crate::models::{Job, Task};
use crate::payload::{
  build_empty_job, build_job_stats_object, build_task, JobInput, ReportedOperation, ResultLike, TaskInput,
};
use crate::presence::has_meaningful_data;
use crate::resolver::{resolve_info, resolve_task_identity, Context, RequestLike, ResolvedInfo};
use crate::user_agent::is_excluded;

/// Outcome of one reporting call. Serializes to the plain record callers inspect.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Report {
  /// No job was known, so one was created holding the task and its operation.
  /// Carries the record E18 returned.
  JobCreated(Value),
  OperationCreated(OperationReport),
  Failed(ReportFailure),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationReport {
  pub job_id: String,
  pub task_id: String,
  pub task: Task,
  pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportFailure {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub job_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub task_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub job: Option<Job>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub task: Option<Task>,
  #[serde(serialize_with = "display")]
  pub error: ReportError,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status_code: Option<u16>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
}

impl ReportFailure {
  fn remote(err: &ClientError) -> Self {
    let message = err.message();
    Self {
      error: ReportError::Remote { message: message.clone() },
      status_code: Some(err.status_code()),
      message: Some(message),
      job_id: None,
      task_id: None,
      job: None,
      task: None,
    }
  }
}

impl From<PayloadError> for ReportFailure {
  fn from(error: PayloadError) -> Self {
    Self::from(ReportError::from(error))
  }
}

impl From<ReportError> for ReportFailure {
  fn from(error: ReportError) -> Self {
    Self {
      job_id: None,
      task_id: None,
      job: None,
      task: None,
      error,
      status_code: None,
      message: None,
    }
  }
}

fn display<S: Serializer>(error: &ReportError, serializer: S) -> Result<S::Ok, S::Error> {
  serializer.collect_str(error)
}

impl Report {
  pub fn is_ok(&self) -> bool {
    !matches!(self, Report::Failed(_))
  }

  pub fn error(&self) -> Option<&ReportError> {
    match self {
      Report::Failed(failure) => Some(&failure.error),
      _ => None,
    }
  }

  pub fn job_id(&self) -> Option<&str> {
    match self {
      Report::JobCreated(record) => record.get("_id").and_then(Value::as_str),
      Report::OperationCreated(report) => Some(&report.job_id),
      Report::Failed(failure) => failure.job_id.as_deref(),
    }
  }

  pub fn task(&self) -> Option<&Task> {
    match self {
      Report::JobCreated(_) => None,
      Report::OperationCreated(report) => Some(&report.task),
      Report::Failed(failure) => failure.task.as_ref(),
    }
  }
}

/// Reports task outcomes to E18, creating the job and task on the way when needed.
#[derive(Debug, Clone)]
pub struct Reporter {
  config: Config,
  http: Client,
}

impl Reporter {
  pub fn new(config: Config) -> Self {
    Self::with_http_client(config, Client::new())
  }

  pub fn with_http_client(config: Config, http: Client) -> Self {
    Self { config, http }
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  /// Records `result` as a new operation for the task described by `request`.
  ///
  /// Never fails outright: configuration, validation and remote errors all come
  /// back as [`Report::Failed`]. At most three POSTs are made, in order: job,
  /// task, operation.
  pub async fn create(&self, request: &RequestLike, result: Option<&ResultLike>, context: Option<&Context>) -> Report {
    match self.report(request, result, context).await {
      Ok(report) => report,
      Err(failure) => {
        if failure.error.is_local() {
          warn!("E18 report not sent: {}", failure.error);
        }
        Report::Failed(failure)
      }
    }
  }

  /// Submits a fully described job in one call.
  pub async fn add_stats(&self, input: JobInput) -> anyhow::Result<bool> {
    let client = self.client()?;
    let job = build_job_stats_object(input)?;
    let record = client
      .create_job(&job)
      .await
      .context("failed to submit job statistics to E18")?;
    info!("Job statistics for {} submitted", job.system.as_deref().unwrap_or_default());
    Ok(has_meaningful_data(&record))
  }

  fn client(&self) -> Result<E18Client, ReportError> {
    let url = self.config.url.as_deref().ok_or(ReportError::MissingUrl)?;
    let key = self.config.key.as_deref().ok_or(ReportError::MissingKey)?;
    Ok(E18Client::with_http_client(url, key, self.http.clone()))
  }

  async fn report(
    &self,
    request: &RequestLike,
    result: Option<&ResultLike>,
    context: Option<&Context>,
  ) -> Result<Report, ReportFailure> {
    let client = self.client()?;

    let info = resolve_info(request);
    if is_excluded(&request.headers) {
      return Err(ReportError::UserAgentExcluded.into());
    }
    let identity = resolve_task_identity(&info, self.config.system.as_deref(), context, self.config.precedence)?;
    debug!(
      "E18 context from {}: system={} method={} job={:?} task={:?}",
      info.source, identity.system, identity.method, info.job_id, info.task_id
    );

    if info.job_id.is_none() && !self.config.empty_job {
      return Err(ReportError::MissingData.into());
    }
    let operation = ReportedOperation::from_result(result)?;

    let mut task_input = info.task_input(&identity);
    task_input.status.get_or_insert_with(|| operation.status.clone());

    let Some(job_id) = info.job_id.clone() else {
      task_input.operations = Some(vec![operation.to_input()]);
      return self.create_job(&client, &info, task_input, &operation).await;
    };

    task_input.job_id = Some(job_id.clone());
    let task = build_task(task_input)?;
    let task_id = match &info.task_id {
      Some(task_id) => task_id.clone(),
      None => self.create_task(&client, &job_id, &task).await?,
    };
    self.create_operation(&client, job_id, task_id, task, &operation).await
  }

  async fn create_job(
    &self,
    client: &E18Client,
    info: &ResolvedInfo,
    task_input: TaskInput,
    operation: &ReportedOperation,
  ) -> Result<Report, ReportFailure> {
    let job = build_empty_job(JobInput {
      system: info.job_system.clone(),
      job_type: info.job_type.clone(),
      project_id: info.job_project_id,
      status: Some(operation.status.clone()),
      tasks: Some(vec![task_input]),
      ..Default::default()
    })?;

    match client.create_job(&job).await {
      Ok(record) => {
        let id = record.get("_id").and_then(Value::as_str).unwrap_or("<unknown>");
        info!("Job {} created with its task and operation", id);
        Ok(Report::JobCreated(record))
      }
      Err(e) => {
        error!("Failed to create job: {} ({})", e.message(), e.status_code());
        Err(ReportFailure {
          job: Some(job),
          ..ReportFailure::remote(&e)
        })
      }
    }
  }

  async fn create_task(&self, client: &E18Client, job_id: &str, task: &Task) -> Result<String, ReportFailure> {
    match client.create_task(job_id, task).await {
      Ok((task_id, _)) => {
        info!("Task {} created for job {}", task_id, job_id);
        Ok(task_id)
      }
      Err(e) => {
        error!("Failed to create task for job {}: {} ({})", job_id, e.message(), e.status_code());
        Err(ReportFailure {
          job_id: Some(job_id.to_string()),
          task: Some(task.clone()),
          ..ReportFailure::remote(&e)
        })
      }
    }
  }

  async fn create_operation(
    &self,
    client: &E18Client,
    job_id: String,
    task_id: String,
    task: Task,
    operation: &ReportedOperation,
  ) -> Result<Report, ReportFailure> {
    match client.create_operation(&job_id, &task_id, operation).await {
      Ok(data) => {
        info!("Operation ({}) added to task {} in job {}", operation.status, task_id, job_id);
        Ok(Report::OperationCreated(OperationReport { job_id, task_id, task, data }))
      }
      Err(e) => {
        error!(
          "Failed to add operation to task {} in job {}: {} ({})",
          task_id,
          job_id,
          e.message(),
          e.status_code()
        );
        Err(ReportFailure {
          job_id: Some(job_id),
          task_id: Some(task_id),
          task: Some(task),
          ..ReportFailure::remote(&e)
        })
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn configured() -> Config {
    Config::default().with_url("http://127.0.0.1:9").with_key("key").with_system("p360")
  }

  #[tokio::test]
  async fn missing_url_is_reported_before_key() {
    let report = Reporter::new(Config::default()).create(&RequestLike::default(), None, None).await;
    assert_eq!(serde_json::to_value(&report).unwrap(), json!({ "error": "missing url to E18" }));

    let config = Config::default().with_url("http://127.0.0.1:9");
    let report = Reporter::new(config).create(&RequestLike::default(), None, None).await;
    assert_eq!(report.error(), Some(&ReportError::MissingKey));
  }

  #[tokio::test]
  async fn validation_order_matches_state_machine() {
    let reporter = Reporter::new(configured().with_empty_job(false));
    let context = Context::for_function("SyncElevmappe");

    let report = reporter.create(&RequestLike::default(), None, None).await;
    assert_eq!(report.error(), Some(&ReportError::MissingMethod));

    let report = reporter.create(&RequestLike::default(), Some(&ResultLike::default()), Some(&context)).await;
    assert_eq!(report.error(), Some(&ReportError::MissingData));

    let request = RequestLike::from_body(json!({ "e18": { "jobId": "j1", "taskId": "t1" } }));
    let report = reporter.create(&request, None, Some(&context)).await;
    assert_eq!(report.error(), Some(&ReportError::MissingStatus));
  }

  #[test]
  fn remote_failure_serializes_status_and_message() {
    let err = ClientError::Status { status: 409, body: json!({ "message": "duplicate" }) };
    let failure = ReportFailure {
      job_id: Some("j1".into()),
      ..ReportFailure::remote(&err)
    };
    assert_eq!(
      serde_json::to_value(Report::Failed(failure)).unwrap(),
      json!({ "jobId": "j1", "error": "duplicate", "statusCode": 409, "message": "duplicate" })
    );
  }

  #[test]
  fn job_created_report_exposes_remote_id() {
    let report = Report::JobCreated(json!({ "_id": "61af5b42", "system": "vigo" }));
    assert!(report.is_ok());
    assert_eq!(report.job_id(), Some("61af5b42"));
    assert_eq!(report.task(), None);
  }
}
