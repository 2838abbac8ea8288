//! Audit surface.
//!
//! Every grant, revoke, CRUD mutation, and access decision is reported to
//! an injected [`AuditSink`]. The engine never decides where audit data
//! goes; the host wires in a sink (database, log pipeline, SIEM).
//!
//! Events are structured: each [`AuditAction`] variant carries the context
//! needed for compliance reporting and forensic replay.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Permission, ResourceRef, UserId};

// ============================================================================
// AuditAction
// ============================================================================

/// Structured audit actions covering the whole engine surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    // -- Role administration --
    /// A role was created.
    RoleCreated { role: String },
    /// A role's permissions or description changed.
    RoleUpdated { role: String },
    /// A role was deleted (assignments cascaded).
    RoleDeleted { role: String },
    /// A role was assigned to a user.
    RoleAssigned { user_id: UserId, role: String },
    /// A role was removed from a user.
    RoleRevoked { user_id: UserId, role: String },

    // -- Resource grants --
    /// A time-bounded resource grant was issued.
    GrantIssued {
        user_id: UserId,
        resource: ResourceRef,
        permissions: Vec<Permission>,
        granted_by: UserId,
        expires_at: Option<DateTime<Utc>>,
    },
    /// Permissions were revoked from a user's grants on a resource.
    GrantRevoked {
        user_id: UserId,
        resource: ResourceRef,
        permissions: Vec<Permission>,
    },
    /// The expiry sweep removed stale grant entries.
    GrantsExpired { removed: usize },

    // -- Policy administration --
    /// A policy was created.
    PolicyCreated { policy: String },
    /// A policy's rules or metadata changed.
    PolicyUpdated { policy: String },
    /// A policy was deleted.
    PolicyDeleted { policy: String },
    /// A policy was enabled or disabled without losing its definition.
    PolicyToggled { policy: String, enabled: bool },

    // -- Decisions --
    /// A contextual ABAC evaluation completed.
    AccessEvaluated {
        user_id: UserId,
        action: String,
        resource: ResourceRef,
        allowed: bool,
        /// Name of the policy that decided, if any rule matched.
        matched_policy: Option<String>,
    },
    /// A coarse RBAC membership check completed.
    PermissionChecked {
        user_id: UserId,
        permission: Permission,
        resource: Option<ResourceRef>,
        allowed: bool,
    },
}

impl AuditAction {
    /// Short machine-readable type tag for downstream filtering.
    pub fn event_type(&self) -> &'static str {
        match self {
            AuditAction::RoleCreated { .. } => "role.created",
            AuditAction::RoleUpdated { .. } => "role.updated",
            AuditAction::RoleDeleted { .. } => "role.deleted",
            AuditAction::RoleAssigned { .. } => "role.assigned",
            AuditAction::RoleRevoked { .. } => "role.revoked",
            AuditAction::GrantIssued { .. } => "grant.issued",
            AuditAction::GrantRevoked { .. } => "grant.revoked",
            AuditAction::GrantsExpired { .. } => "grant.expired",
            AuditAction::PolicyCreated { .. } => "policy.created",
            AuditAction::PolicyUpdated { .. } => "policy.updated",
            AuditAction::PolicyDeleted { .. } => "policy.deleted",
            AuditAction::PolicyToggled { .. } => "policy.toggled",
            AuditAction::AccessEvaluated { .. } => "access.evaluated",
            AuditAction::PermissionChecked { .. } => "access.checked",
        }
    }
}

// ============================================================================
// AuditEvent
// ============================================================================

/// A single audit record: action plus envelope metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event id.
    pub id: Uuid,
    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub action: AuditAction,
}

impl AuditEvent {
    /// Wraps an action with a fresh id and the current time.
    pub fn now(action: AuditAction) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action,
        }
    }
}

// ============================================================================
// AuditSink
// ============================================================================

/// Destination for audit events.
///
/// Implementations must be cheap and non-blocking; the engine calls
/// `record` inline on the decision path.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// In-memory sink, append-only. Intended for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events, oldest first.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().expect("audit sink poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().expect("audit sink poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().expect("audit sink poisoned").push(event);
    }
}

/// Sink that forwards events to the `tracing` pipeline.
///
/// Useful when the host already ships structured logs to an aggregator.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        tracing::info!(
            event_id = %event.id,
            event_type = event.action.event_type(),
            timestamp = %event.timestamp,
            action = ?event.action,
            "audit event"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_appends_in_order() {
        let sink = MemoryAuditSink::new();
        assert!(sink.is_empty());

        sink.record(AuditEvent::now(AuditAction::RoleCreated {
            role: "viewer".to_string(),
        }));
        sink.record(AuditEvent::now(AuditAction::RoleDeleted {
            role: "viewer".to_string(),
        }));

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action.event_type(), "role.created");
        assert_eq!(events[1].action.event_type(), "role.deleted");
    }

    #[test]
    fn test_event_serialization_roundtrip() {
        let event = AuditEvent::now(AuditAction::PermissionChecked {
            user_id: UserId::from("u-1"),
            permission: Permission::ReportRead,
            resource: Some(ResourceRef::new("report", "r-9")),
            allowed: true,
        });

        let json = serde_json::to_string(&event).expect("serialize event");
        let back: AuditEvent = serde_json::from_str(&json).expect("deserialize event");
        assert_eq!(back, event);
    }

    #[test]
    fn test_event_type_tags() {
        let action = AuditAction::AccessEvaluated {
            user_id: UserId::from("u-1"),
            action: "read".to_string(),
            resource: ResourceRef::new("report", "r-1"),
            allowed: false,
            matched_policy: None,
        };
        assert_eq!(action.event_type(), "access.evaluated");
    }
}
