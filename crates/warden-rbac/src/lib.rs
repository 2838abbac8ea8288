//! # warden-rbac: Hierarchical Role-Based Access Control
//!
//! Role-derived and resource-scoped permissions for the Warden engine:
//! - **Roles** with permission sets and parent-role inheritance
//!   (acyclicity enforced at write time, visited-set guarded at read time)
//! - **Resource grants**: time-bounded, per-(user, resource) permission
//!   entries independent of role membership
//! - **Permission resolution**: the effective-permission closure over
//!   both sources
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  has_permission(user, permission, resource?) │
//! └─────────────────┬────────────────────────────┘
//!                   │
//!                   ▼
//! ┌──────────────────────────────────────────────┐
//! │  PermissionResolver                          │
//! │  ├─ RoleStore: assigned roles + inheritance  │
//! │  ├─ user:<id> pseudo-resource grants         │
//! │  └─ ResourcePermissionStore: scoped grants   │
//! └─────────────────┬────────────────────────────┘
//!                   │
//!                   ▼
//!            allow / deny (bool)
//! ```
//!
//! ## Examples
//!
//! ```
//! use std::sync::Arc;
//! use warden_rbac::{PermissionResolver, ResourcePermissionStore, RoleStore};
//! use warden_types::{Permission, UserId};
//!
//! let roles = Arc::new(RoleStore::new());
//! let grants = Arc::new(ResourcePermissionStore::new());
//!
//! roles.create_role(
//!     "viewer",
//!     "Read-only report access",
//!     [Permission::ReportRead],
//!     &[],
//! )?;
//! let user = UserId::from("u-1");
//! roles.assign_role(&user, "viewer")?;
//!
//! let resolver = PermissionResolver::new(Arc::clone(&roles), Arc::clone(&grants));
//! assert!(resolver.has_permission(&user, Permission::ReportRead, None));
//! assert!(!resolver.has_permission(&user, Permission::ReportDelete, None));
//! # Ok::<(), warden_types::AccessError>(())
//! ```

pub mod grants;
pub mod resolver;
pub mod roles;

pub use grants::{ResourcePermission, ResourcePermissionStore};
pub use resolver::PermissionResolver;
pub use roles::{Role, RoleStore, RoleUpdate};
