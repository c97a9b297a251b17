use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

use crate::resolver::Headers;

/// Interactive API clients whose calls are never reported.
pub const DENY_LIST: [&str; 2] = ["insomnia", "postman"];

static DENIED: LazyLock<Regex> = LazyLock::new(|| {
  let pattern = DENY_LIST.map(regex::escape).join("|");
  RegexBuilder::new(&pattern)
    .case_insensitive(true)
    .build()
    .expect("deny list is escaped literals")
});

pub fn is_excluded(headers: &Headers) -> bool {
  headers
    .get_str("user-agent")
    .is_some_and(|agent| DENIED.is_match(agent))
}

#[cfg(test)]
mod tests {
  use super::*;
  use rstest::rstest;

  #[rstest]
  #[case("insomnia/2021.7.2", true)]
  #[case("PostmanRuntime/7.28.4", true)]
  #[case("Mozilla/5.0 (Insomnia)", true)]
  #[case("axios/0.24.0", false)]
  #[case("", false)]
  fn matches_deny_list_case_insensitively(#[case] agent: &str, #[case] excluded: bool) {
    let headers = Headers::new().with("User-Agent", agent);
    assert_eq!(is_excluded(&headers), excluded);
  }

  #[test]
  fn missing_user_agent_is_not_excluded() {
    assert!(!is_excluded(&Headers::new()));
  }
}
