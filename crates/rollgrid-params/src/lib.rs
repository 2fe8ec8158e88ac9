//! rollgrid-params: the parameter expression model.
//!
//! Automation playbook paths carry their parameters inline:
//!
//! ```text
//! /etc/ansible/update.yml {server} {app} {unpack=true}
//! ```
//!
//! `{name}` is a **dynamic** parameter, resolved at invocation time from a
//! context; `{name=value}` is an **explicit** parameter with a literal value.
//! Everything here is a pure function of its inputs.
//!
//! # Components
//!
//! - **`expr`**: parse a path string / build one back
//! - **`resolve`**: turn parameters + context into extra vars
//! - **`validate`**: name/value allow-lists, known-variable registry, shell sanitizing

pub mod expr;
pub mod resolve;
pub mod validate;

pub use expr::{Parameter, ParsedPath, build_path, parse};
pub use resolve::{stringify_value, to_extra_vars};
pub use validate::{KnownVariables, ParamError, ValidationReport, sanitize, validate, validate_with};
