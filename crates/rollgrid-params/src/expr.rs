//! Parsing and building parameterized playbook paths.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::resolve::stringify_value;

/// Matches one `{...}` group (no nesting).
static GROUP_RE: OnceLock<Regex> = OnceLock::new();

fn group_regex() -> &'static Regex {
    GROUP_RE.get_or_init(|| Regex::new(r"\{([^{}]*)\}").expect("group pattern is valid"))
}

/// One parameter extracted from a path string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Parameter {
    /// `{name}`: resolved later from a context.
    Dynamic { name: String },
    /// `{name=value}`: literal value baked into the path.
    Explicit { name: String, value: String },
}

impl Parameter {
    pub fn dynamic(name: impl Into<String>) -> Self {
        Parameter::Dynamic { name: name.into() }
    }

    pub fn explicit(name: impl Into<String>, value: impl Into<String>) -> Self {
        Parameter::Explicit {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Parameter::Dynamic { name } | Parameter::Explicit { name, .. } => name,
        }
    }

    /// Literal value for explicit parameters.
    pub fn value(&self) -> Option<&str> {
        match self {
            Parameter::Dynamic { .. } => None,
            Parameter::Explicit { value, .. } => Some(value),
        }
    }
}

/// Result of [`parse`]: the path with all groups removed, plus the groups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedPath {
    pub path: String,
    pub parameters: Vec<Parameter>,
}

impl ParsedPath {
    /// Explicit parameters as `(name, value)` pairs, in order.
    pub fn explicit(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parameters.iter().filter_map(|p| match p {
            Parameter::Explicit { name, value } => Some((name.as_str(), value.as_str())),
            Parameter::Dynamic { .. } => None,
        })
    }

    /// File-name portion of the clean path (`/a/b/update.yml` → `update.yml`).
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }
}

/// Split `text` into its clean path and the `{...}` parameters it carries.
///
/// Empty groups (`{}`) are dropped. Explicit values of `true`/`false` are
/// lowercased whatever their input case.
pub fn parse(text: &str) -> ParsedPath {
    let mut parameters = Vec::new();

    for caps in group_regex().captures_iter(text) {
        let body = caps.get(1).map_or("", |m| m.as_str()).trim();
        if body.is_empty() {
            continue;
        }
        match body.split_once('=') {
            Some((name, value)) => {
                parameters.push(Parameter::explicit(
                    name.trim(),
                    normalize_bool(value.trim()),
                ));
            }
            None => parameters.push(Parameter::dynamic(body)),
        }
    }

    let stripped = group_regex().replace_all(text, " ");
    ParsedPath {
        path: collapse_whitespace(&stripped),
        parameters,
    }
}

/// Inverse of [`parse`]: append `{name=value}` for every explicit parameter,
/// then `{name}` for every dynamic name, space separated.
pub fn build_path<N: AsRef<str>>(
    base_path: &str,
    explicit: &[(String, Value)],
    dynamic_names: &[N],
) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(1 + explicit.len() + dynamic_names.len());
    let base = base_path.trim();
    if !base.is_empty() {
        parts.push(base.to_string());
    }
    for (name, value) in explicit {
        parts.push(format!("{{{name}={}}}", stringify_value(value)));
    }
    for name in dynamic_names {
        parts.push(format!("{{{}}}", name.as_ref()));
    }
    parts.join(" ")
}

fn normalize_bool(value: &str) -> String {
    if value.eq_ignore_ascii_case("true") {
        "true".to_string()
    } else if value.eq_ignore_ascii_case("false") {
        "false".to_string()
    } else {
        value.to_string()
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
