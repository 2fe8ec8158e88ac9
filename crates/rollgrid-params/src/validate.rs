//! Parameter validation and shell sanitizing.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::expr::Parameter;

static NAME_RE: OnceLock<Regex> = OnceLock::new();
static VALUE_RE: OnceLock<Regex> = OnceLock::new();

fn name_regex() -> &'static Regex {
    NAME_RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("name pattern is valid"))
}

fn value_regex() -> &'static Regex {
    VALUE_RE
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9\-./:@= ]*$").expect("value pattern is valid"))
}

/// Variables the orchestration layer knows how to resolve.
pub const BUILTIN_VARIABLES: &[&str] = &[
    "app",
    "app_instances",
    "app_name",
    "distr_url",
    "drain_delay",
    "haproxy_api_url",
    "haproxy_backend",
    "host",
    "image_url",
    "instance",
    "instance_number",
    "port",
    "server",
    "task_id",
    "update_playbook",
];

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParamError {
    #[error("invalid parameter name: {name:?}")]
    InvalidName { name: String },

    #[error("invalid value for parameter {name:?}: {value:?}")]
    InvalidValue { name: String, value: String },

    #[error("unknown variable: {name:?}")]
    UnknownVariable { name: String },
}

/// Outcome of [`validate`]: every violation found, not just the first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<ParamError>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Error messages, one per violation.
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

/// Registry of variable names accepted by strict validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownVariables {
    names: BTreeSet<String>,
}

impl Default for KnownVariables {
    fn default() -> Self {
        Self {
            names: BUILTIN_VARIABLES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl KnownVariables {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            names: BTreeSet::new(),
        }
    }

    /// Built-in names plus `extra`.
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut known = Self::default();
        known.names.extend(extra.into_iter().map(Into::into));
        known
    }

    pub fn insert(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// Validate against the built-in registry.
pub fn validate(parameters: &[Parameter], strict: bool) -> ValidationReport {
    validate_with(parameters, strict, &KnownVariables::default())
}

/// Validate names and explicit values. In `strict` mode a dynamic
/// parameter with a well-formed name that `known` does not contain is
/// also reported.
pub fn validate_with(
    parameters: &[Parameter],
    strict: bool,
    known: &KnownVariables,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    for param in parameters {
        let name = param.name();
        let name_ok = name_regex().is_match(name);
        if !name_ok {
            report.errors.push(ParamError::InvalidName {
                name: name.to_string(),
            });
        }

        match param {
            Parameter::Explicit { value, .. } => {
                if !value_regex().is_match(value) {
                    report.errors.push(ParamError::InvalidValue {
                        name: name.to_string(),
                        value: value.clone(),
                    });
                }
            }
            Parameter::Dynamic { .. } => {
                if strict && name_ok && !known.contains(name) {
                    report.errors.push(ParamError::UnknownVariable {
                        name: name.to_string(),
                    });
                }
            }
        }
    }

    if !report.is_ok() {
        tracing::debug!(errors = report.errors.len(), "parameter validation failed");
    }
    report
}

/// Escape `\`, `"`, `$` and `` ` `` with a single backslash each.
pub fn sanitize(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '"' | '$' | '`') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
