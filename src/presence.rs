use serde_json::Value;

/// Whether a value carries anything worth shipping to E18.
///
/// `false` is meaningful; `null`, `""`, `[]` and `{}` are not. An object whose
/// only key is `length` counts as empty.
pub fn has_meaningful_data(value: &Value) -> bool {
  match value {
    Value::Null => false,
    Value::Bool(_) => true,
    Value::Number(_) => true,
    Value::String(s) => !s.is_empty(),
    Value::Array(items) => !items.is_empty(),
    Value::Object(map) => map.keys().any(|key| key != "length"),
  }
}

pub fn has_data(value: Option<&Value>) -> bool {
  value.is_some_and(has_meaningful_data)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn empty_values_are_not_data() {
    assert!(!has_meaningful_data(&Value::Null));
    assert!(!has_meaningful_data(&json!("")));
    assert!(!has_meaningful_data(&json!([])));
    assert!(!has_meaningful_data(&json!({})));
    assert!(!has_meaningful_data(&json!({ "length": 3 })));
    assert!(!has_data(None));
  }

  #[test]
  fn booleans_numbers_and_content_are_data() {
    assert!(has_meaningful_data(&json!(false)));
    assert!(has_meaningful_data(&json!(0)));
    assert!(has_meaningful_data(&json!(" ")));
    assert!(has_meaningful_data(&json!([null])));
    assert!(has_meaningful_data(&json!({ "length": 1, "x": 1 })));
    assert!(has_data(Some(&json!({ "x": 1 }))));
  }
}
