//! Error types for negotiation operations.
//!
//! Everything except [`NegotiationError::Internal`] is an expected business
//! outcome, surfaced to the caller with enough detail to act on. `Internal`
//! is an infrastructure failure: logged with context, opaque to callers,
//! never used to decide business logic.

use database::DatabaseError;
use thiserror::Error;

/// Errors that can occur during negotiation operations.
#[derive(Debug, Error)]
pub enum NegotiationError {
    /// Malformed or out-of-range input; the caller's fault, never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Referenced offer or listing absent.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Actor lacks the role for the requested action.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Action is not valid for the offer's current status, including
    /// lazily-discovered expiration.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Lost a race to a concurrent transition.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Storage or infrastructure failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl NegotiationError {
    /// Stable error code for transport layers.
    pub fn error_code(&self) -> &'static str {
        match self {
            NegotiationError::Validation(_) => "validation_failed",
            NegotiationError::NotFound { .. } => "not_found",
            NegotiationError::Forbidden(_) => "forbidden",
            NegotiationError::InvalidState(_) => "invalid_state",
            NegotiationError::Conflict(_) => "conflict",
            NegotiationError::Internal(_) => "internal_error",
        }
    }
}

impl From<DatabaseError> for NegotiationError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity, id } => NegotiationError::NotFound { entity, id },
            DatabaseError::AlreadyExists { entity, id } => {
                NegotiationError::Conflict(format!("{entity} already exists: {id}"))
            }
            other => NegotiationError::Internal(other.to_string()),
        }
    }
}

/// Result type for negotiation operations.
pub type Result<T> = std::result::Result<T, NegotiationError>;
