//! Rollout error types.

use rollgrid_core::ErrorCategory;
use rollgrid_state::{InstanceId, ServerId, StateError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("instance not found: {0}")]
    InstanceNotFound(InstanceId),

    #[error("server not found: {0}")]
    ServerNotFound(ServerId),

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

impl RolloutError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            RolloutError::InstanceNotFound(_) | RolloutError::ServerNotFound(_) => {
                ErrorCategory::NotFound
            }
            RolloutError::State(e) => e.category(),
        }
    }
}

pub type RolloutResult<T> = Result<T, RolloutError>;
