//! Effective-permission resolution.
//!
//! The effective permission set of a user is the union of:
//! - every assigned role's permission closure (the role's own permissions
//!   plus, transitively, its parents'), and
//! - active grants on the `user:<id>` pseudo-resource (global elevations).
//!
//! Traversal carries a visited set. Cycles are rejected at write time,
//! but a substituted store backend could hand back a cyclic graph; the
//! guard keeps resolution terminating and correct regardless.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use warden_types::{Permission, ResourceRef, UserId};

use crate::grants::ResourcePermissionStore;
use crate::roles::RoleStore;

/// Merges role-derived and resource-derived permissions and answers
/// membership queries.
pub struct PermissionResolver {
    roles: Arc<RoleStore>,
    grants: Arc<ResourcePermissionStore>,
}

impl PermissionResolver {
    pub fn new(roles: Arc<RoleStore>, grants: Arc<ResourcePermissionStore>) -> Self {
        Self { roles, grants }
    }

    /// The full effective permission set for a user.
    ///
    /// Independent of role iteration order (it is a pure union), and
    /// cycle-safe. Unknown role names (e.g. a parent deleted underneath
    /// a stale assignment) are skipped.
    pub fn effective_permissions(&self, user_id: &UserId) -> BTreeSet<Permission> {
        let mut effective = BTreeSet::new();
        let mut visited: BTreeSet<String> = BTreeSet::new();

        for role in self.roles.get_user_roles(user_id) {
            self.collect_role_closure(&role, &mut visited, &mut effective);
        }

        // Global elevated grants on the user pseudo-resource.
        let scope = ResourceRef::user_scope(user_id);
        for entry in self.grants.list_active(user_id, &scope, Utc::now()) {
            effective.extend(entry.permissions.iter().copied());
        }

        effective
    }

    /// Whether the user holds `permission`, either through the effective
    /// set or through an active grant on the given concrete resource.
    pub fn has_permission(
        &self,
        user_id: &UserId,
        permission: Permission,
        resource: Option<&ResourceRef>,
    ) -> bool {
        if self.effective_permissions(user_id).contains(&permission) {
            return true;
        }

        match resource {
            Some(resource) => {
                self.grants
                    .has_resource_permission(user_id, resource, permission, Utc::now())
            }
            None => false,
        }
    }

    /// Depth-first closure over `parent_roles` with a visited-set guard.
    fn collect_role_closure(
        &self,
        role_name: &str,
        visited: &mut BTreeSet<String>,
        effective: &mut BTreeSet<Permission>,
    ) {
        if !visited.insert(role_name.to_string()) {
            return;
        }

        let Ok(role) = self.roles.get_role(role_name) else {
            debug!(role = %role_name, "assigned role no longer exists; skipping");
            return;
        };

        effective.extend(role.permissions.iter().copied());
        for parent in &role.parent_roles {
            self.collect_role_closure(parent, visited, effective);
        }
    }
}
