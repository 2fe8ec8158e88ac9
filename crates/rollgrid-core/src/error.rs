//! Error categories shared across rollgrid crates.

use serde::Serialize;

/// Coarse classification of a failure, used by outer layers (CLI exit
/// codes) without matching on every error variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// A referenced instance, server, entity or mapping does not exist.
    NotFound,
    /// Input violates an allow-list or naming rule.
    Validation,
    /// Anything else: storage, serialization, I/O.
    Internal,
}

impl ErrorCategory {
    /// Process exit code used by the `rollgrid` binary.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorCategory::NotFound => 3,
            ErrorCategory::Validation => 2,
            ErrorCategory::Internal => 1,
        }
    }
}
