use std::env;
use std::fmt;

use tracing::warn;

use crate::resolver::Precedence;

/// Everything the reporter reads from its environment, captured once.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
  pub url: Option<String>,
  pub key: Option<String>,
  pub system: Option<String>,
  pub empty_job: bool,
  pub precedence: Precedence,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      url: None,
      key: None,
      system: None,
      empty_job: true,
      precedence: Precedence::default(),
    }
  }
}

impl fmt::Debug for Config {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Config")
      .field("url", &self.url)
      .field("key", &self.key.as_ref().map(|_| "<redacted>"))
      .field("system", &self.system)
      .field("empty_job", &self.empty_job)
      .field("precedence", &self.precedence)
      .finish()
  }
}

impl Config {
  pub fn from_env() -> Self {
    Self::from_vars(env::vars())
  }

  /// Builds from `E18_*` variables; unrelated entries are ignored.
  pub fn from_vars<I, K, V>(vars: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
  {
    let mut config = Self::default();
    for (name, value) in vars {
      let value = value.into();
      match name.as_ref() {
        "E18_URL" => config.url = base_url(value),
        "E18_KEY" => config.key = non_empty(value),
        "E18_SYSTEM" => config.system = non_empty(value),
        "E18_EMPTY_JOB" => {
          if let Some(value) = non_empty(value) {
            config.empty_job = value.eq_ignore_ascii_case("true");
          }
        }
        "E18_PRECEDENCE" => {
          config.precedence = value.parse().unwrap_or_else(|e| {
            warn!("{}, using default", e);
            Precedence::default()
          })
        }
        _ => {}
      }
    }
    config
  }

  pub fn with_url(mut self, url: impl Into<String>) -> Self {
    self.url = base_url(url.into());
    self
  }

  pub fn with_key(mut self, key: impl Into<String>) -> Self {
    self.key = non_empty(key.into());
    self
  }

  pub fn with_system(mut self, system: impl Into<String>) -> Self {
    self.system = non_empty(system.into());
    self
  }

  pub fn with_empty_job(mut self, allowed: bool) -> Self {
    self.empty_job = allowed;
    self
  }

  pub fn with_precedence(mut self, precedence: Precedence) -> Self {
    self.precedence = precedence;
    self
  }
}

fn base_url(value: String) -> Option<String> {
  non_empty(value).map(|url| url.trim_end_matches('/').to_string())
}

fn non_empty(value: String) -> Option<String> {
  let trimmed = value.trim();
  (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
  use super::*;
  use rstest::rstest;

  #[test]
  fn reads_e18_variables() {
    let config = Config::from_vars([
      ("E18_URL", "https://e18.example.com/api/v1/"),
      ("E18_KEY", "secret"),
      ("E18_SYSTEM", "p360"),
      ("PATH", "/usr/bin"),
    ]);
    assert_eq!(config.url.as_deref(), Some("https://e18.example.com/api/v1"));
    assert_eq!(config.key.as_deref(), Some("secret"));
    assert_eq!(config.system.as_deref(), Some("p360"));
    assert!(config.empty_job);
    assert_eq!(config.precedence, Precedence::AmbientWins);
  }

  #[test]
  fn blank_values_count_as_missing() {
    let config = Config::from_vars([("E18_URL", "  "), ("E18_KEY", "")]);
    assert_eq!(config.url, None);
    assert_eq!(config.key, None);
  }

  #[rstest]
  #[case("true", true)]
  #[case(" TRUE ", true)]
  #[case("false", false)]
  #[case("yes", false)]
  #[case("", true)]
  #[case("   ", true)]
  fn empty_job_is_only_allowed_for_true(#[case] raw: &str, #[case] allowed: bool) {
    let config = Config::from_vars([("E18_EMPTY_JOB", raw)]);
    assert_eq!(config.empty_job, allowed);
  }

  #[test]
  fn debug_output_hides_the_key() {
    let config = Config::default().with_url("https://e18.example.com").with_key("s3cr3t-key");
    let printed = format!("{:?}", config);
    assert!(!printed.contains("s3cr3t-key"), "{}", printed);
    assert!(printed.contains("<redacted>"));
    assert!(printed.contains("https://e18.example.com"));
  }

  #[test]
  fn precedence_falls_back_to_ambient() {
    let config = Config::from_vars([("E18_PRECEDENCE", "payload")]);
    assert_eq!(config.precedence, Precedence::PayloadWins);

    let config = Config::from_vars([("E18_PRECEDENCE", "whatever")]);
    assert_eq!(config.precedence, Precedence::AmbientWins);
  }
}
