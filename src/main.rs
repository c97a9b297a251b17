use anyhow::Context as _;
use clap::Parser;
use e18::{Config, Context, Reporter, RequestLike, ResultLike};
use tracing_subscriber::EnvFilter;

/// Report one task outcome to E18 using the E18_* environment.
#[derive(Parser, Debug)]
#[command(name = "e18_report")]
struct Args {
  /// Request as JSON: `{"body": {"e18": {...}}, "headers": {...}}` or direct options
  #[arg(long, default_value = "{}")]
  request: String,
  /// Outcome as JSON, e.g. `{"status": "completed", "data": {...}}`
  #[arg(long)]
  result: Option<String>,
  /// Function being reported, used as the task method
  #[arg(long, env = "E18_FUNCTION_NAME")]
  function: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  let request: RequestLike = serde_json::from_str(&args.request).context("--request is not valid JSON")?;
  let result: Option<ResultLike> = args
    .result
    .as_deref()
    .map(serde_json::from_str)
    .transpose()
    .context("--result is not valid JSON")?;
  let context = args.function.map(Context::for_function);

  let report = Reporter::new(Config::from_env())
    .create(&request, result.as_ref(), context.as_ref())
    .await;
  println!("{}", serde_json::to_string_pretty(&report)?);

  if !report.is_ok() {
    std::process::exit(1);
  }
  Ok(())
}
