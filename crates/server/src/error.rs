//! Errors returned by the orchestrator.

use data_loader::StoreError;
use thiserror::Error;

/// Request-level failure.
///
/// `Clone` because one computation's result is shared by every request
/// collapsed onto it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecommendError {
    /// The user or product does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// A store call failed or timed out
    #[error("store unavailable during {operation}: {reason}")]
    StoreUnavailable {
        operation: &'static str,
        reason: String,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<StoreError> for RecommendError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => RecommendError::NotFound { entity, id },
            StoreError::Unavailable { operation, reason } => {
                RecommendError::StoreUnavailable { operation, reason }
            }
            StoreError::Timeout { operation, after } => RecommendError::StoreUnavailable {
                operation,
                reason: format!("timed out after {:?}", after),
            },
        }
    }
}
