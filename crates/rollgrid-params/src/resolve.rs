//! Resolving parameters into the key/value map handed to the automation tool.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::expr::Parameter;
use crate::validate::sanitize;

/// Render a context value the way it should appear on a command line.
///
/// Strings are used verbatim, booleans become `true`/`false`, `null`
/// becomes the empty string, and arrays/objects are rendered as JSON.
pub fn stringify_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Build extra vars from parsed parameters.
///
/// Explicit parameters contribute their sanitized literal. Dynamic
/// parameters look their name up in `context`; a missing name is left out
/// unless `skip_empty` is false, in which case it maps to `""`.
pub fn to_extra_vars(
    parameters: &[Parameter],
    context: &Map<String, Value>,
    skip_empty: bool,
) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();

    for param in parameters {
        match param {
            Parameter::Explicit { name, value } => {
                vars.insert(name.clone(), sanitize(value));
            }
            Parameter::Dynamic { name } => match context.get(name) {
                Some(value) => {
                    vars.insert(name.clone(), stringify_value(value));
                }
                None if !skip_empty => {
                    vars.insert(name.clone(), String::new());
                }
                None => {
                    tracing::debug!(param = %name, "dynamic parameter missing from context");
                }
            },
        }
    }

    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse;
    use serde_json::json;

    fn ctx(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn extra_vars_for_update_playbook() {
        let parsed = parse("/etc/ansible/update.yml {server} {app} {unpack=true}");
        let vars = to_extra_vars(
            &parsed.parameters,
            &ctx(json!({"server": "web01", "app": "myapp"})),
            true,
        );

        let expected: BTreeMap<String, String> = [
            ("server", "web01"),
            ("app", "myapp"),
            ("unpack", "true"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(vars, expected);
    }

    #[test]
    fn missing_dynamic_is_skipped_by_default() {
        let params = vec![Parameter::dynamic("server"), Parameter::dynamic("app")];
        let vars = to_extra_vars(&params, &ctx(json!({"server": "web01"})), true);
        assert_eq!(vars.len(), 1);
        assert!(!vars.contains_key("app"));
    }

    #[test]
    fn missing_dynamic_becomes_empty_when_not_skipping() {
        let params = vec![Parameter::dynamic("app")];
        let vars = to_extra_vars(&params, &Map::new(), false);
        assert_eq!(vars.get("app").map(String::as_str), Some(""));
    }

    #[test]
    fn context_values_are_stringified() {
        let params = vec![
            Parameter::dynamic("flag"),
            Parameter::dynamic("count"),
            Parameter::dynamic("ratio"),
            Parameter::dynamic("hosts"),
        ];
        let vars = to_extra_vars(
            &params,
            &ctx(json!({"flag": false, "count": 3, "ratio": 0.5, "hosts": ["a", "b"]})),
            true,
        );
        assert_eq!(vars["flag"], "false");
        assert_eq!(vars["count"], "3");
        assert_eq!(vars["ratio"], "0.5");
        assert_eq!(vars["hosts"], r#"["a","b"]"#);
    }

    #[test]
    fn explicit_values_are_sanitized() {
        let params = vec![Parameter::explicit("cmd", "echo $HOME")];
        let vars = to_extra_vars(&params, &Map::new(), true);
        assert_eq!(vars["cmd"], r"echo \$HOME");
    }

    #[test]
    fn stringify_null_is_empty() {
        assert_eq!(stringify_value(&Value::Null), "");
        assert_eq!(stringify_value(&json!("plain")), "plain");
    }
}
