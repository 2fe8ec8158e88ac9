//! Mapping error types.

use rollgrid_core::ErrorCategory;
use rollgrid_state::{EntityType, InstanceId, StateError};
use thiserror::Error;

/// Errors that can occur during mapping operations.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("entity not found: {entity_type}/{entity_id}")]
    EntityNotFound {
        entity_type: EntityType,
        entity_id: String,
    },

    #[error("instance not found: {0}")]
    InstanceNotFound(InstanceId),

    #[error("mapping not found: {entity_type}/{entity_id} -> instance {instance_id}")]
    MappingNotFound {
        entity_type: EntityType,
        entity_id: String,
        instance_id: InstanceId,
    },

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

impl MappingError {
    pub fn entity_not_found(entity_type: EntityType, entity_id: &str) -> Self {
        MappingError::EntityNotFound {
            entity_type,
            entity_id: entity_id.to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            MappingError::EntityNotFound { .. }
            | MappingError::InstanceNotFound(_)
            | MappingError::MappingNotFound { .. } => ErrorCategory::NotFound,
            MappingError::State(e) => e.category(),
        }
    }
}

pub type MappingResult<T> = Result<T, MappingError>;
