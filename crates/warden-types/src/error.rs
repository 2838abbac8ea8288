//! Error taxonomy for administrative operations.
//!
//! Only the CRUD surface returns errors. Evaluation paths absorb anomalies
//! and degrade to a deny outcome plus a log entry; they never surface an
//! error to the caller.

use thiserror::Error;

use warden_store::StoreError;

/// Error type for the administrative (CRUD) surface.
#[derive(Debug, Error)]
pub enum AccessError {
    /// Invalid input: duplicate name, unknown permission or parent role,
    /// malformed condition operator, cycle-creating hierarchy edge.
    #[error("validation failed: {reason}")]
    Validation { reason: String },

    /// Mutation or deletion attempted on a system entity.
    #[error("{kind} '{name}' is a system entity and cannot be modified")]
    ImmutableEntity { kind: &'static str, name: String },

    /// Lookup miss on a role, policy, or grant.
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    /// Underlying store failure (version conflict after retries, backend error).
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AccessError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }
}

/// Result type for administrative operations.
pub type Result<T> = std::result::Result<T, AccessError>;
