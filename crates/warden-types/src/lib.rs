//! # warden-types: Core types for Warden
//!
//! Shared types used across the Warden access-control engine:
//! - Entity IDs ([`UserId`], [`ResourceRef`])
//! - The closed capability set ([`Permission`])
//! - The error taxonomy ([`AccessError`])
//! - The audit surface ([`AuditSink`], [`AuditEvent`], [`AuditAction`])

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

pub mod audit;
pub mod error;
pub mod permission;

pub use audit::{AuditAction, AuditEvent, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use error::{AccessError, Result};
pub use permission::Permission;

// ============================================================================
// UserId
// ============================================================================

/// Unique identifier for a user (principal) in the access-control system.
///
/// Identity is owned by an external identity provider; Warden treats user
/// ids as opaque strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ============================================================================
// ResourceRef
// ============================================================================

/// Reference to a protected resource: a `(type, id)` pair.
///
/// Resource metadata lives with the host application; Warden only needs a
/// stable key to scope grants and attribute lookups.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    /// Resource category (e.g. `"report"`, `"dashboard"`).
    pub resource_type: String,
    /// Identifier within the category.
    pub resource_id: String,
}

impl ResourceRef {
    pub fn new(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
        }
    }

    /// The pseudo-resource used for global, user-scoped elevated grants.
    ///
    /// A grant on `user:<id>` contributes to the user's effective
    /// permissions everywhere, not just on one concrete resource.
    pub fn user_scope(user_id: &UserId) -> Self {
        Self::new("user", user_id.as_str())
    }
}

impl Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.resource_id)
    }
}
