//! # Warden
//!
//! Access-control engine for multi-tenant reporting platforms:
//! hierarchical role-based permissions layered with attribute-based
//! policies, fail-closed by default, with a full audit trail.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                         AccessControl                           │
//! │  ┌──────────┐  ┌──────────┐  ┌───────────┐  ┌──────────────┐  │
//! │  │  Roles   │  │  Grants  │  │ Policies  │  │  Audit sink  │  │
//! │  │(RBAC +   │  │(per-     │  │(ABAC      │  │(every check  │  │
//! │  │ parents) │  │ resource,│  │ rules by  │  │ + mutation)  │  │
//! │  │          │  │ expiring)│  │ priority) │  │              │  │
//! │  └──────────┘  └──────────┘  └───────────┘  └──────────────┘  │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two decision surfaces:
//!
//! - [`AccessControl::has_permission`] - coarse RBAC membership: roles
//!   (with inheritance), plus active grants on the resource.
//! - [`AccessControl::evaluate_access`] - contextual ABAC: enabled
//!   policies walked by priority, first applicable decides, no match
//!   means deny.
//!
//! # Quick Start
//!
//! ```
//! use warden::{AccessControl, Permission, ResourceRef, UserId};
//!
//! let engine = AccessControl::new();
//!
//! engine.create_role("viewer", "Read-only access", [Permission::ReportRead], &[])?;
//! engine.create_role(
//!     "analyst",
//!     "Builds and runs reports",
//!     [Permission::ReportCreate, Permission::ReportExecute],
//!     &["viewer"],
//! )?;
//!
//! let user = UserId::from("u-1");
//! engine.assign_role(&user, "analyst")?;
//!
//! // Inherited through the viewer parent.
//! assert!(engine.has_permission(&user, Permission::ReportRead, None));
//!
//! // Per-resource, time-boundable elevation.
//! let report = ResourceRef::new("report", "r-42");
//! engine.grant(&user, &report, [Permission::ReportExport], &UserId::from("admin"), None)?;
//! assert!(engine.has_permission(&user, Permission::ReportExport, Some(&report)));
//! # Ok::<(), warden::AccessError>(())
//! ```

mod engine;

pub use engine::{AccessControl, AccessControlBuilder};

// Core vocabulary, re-exported so hosts depend on one crate.
pub use warden_types::{
    AccessError, AuditAction, AuditEvent, AuditSink, MemoryAuditSink, Permission, ResourceRef,
    Result, TracingAuditSink, UserId,
};

pub use warden_rbac::{
    PermissionResolver, ResourcePermission, ResourcePermissionStore, Role, RoleStore, RoleUpdate,
};

pub use warden_abac::{
    AttributeProvider, AttributeSet, Condition, ConditionOperator, Decision, Effect,
    EvaluationContext, Policy, PolicyEvaluator, PolicyOutcome, PolicyResult, PolicyRule,
    PolicyStore, PolicyUpdate, ProviderRegistry,
};

pub use warden_store::{MemoryStore, Store, StoreError, Version, Versioned};
