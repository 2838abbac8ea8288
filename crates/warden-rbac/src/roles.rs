//! Role aggregates, assignments, and the inheritance graph.
//!
//! Roles are named permission sets linked by `parent_roles` edges. The
//! graph is kept acyclic at write time (an update introducing a cycle is
//! rejected), and the resolver additionally guards traversal with a
//! visited set so a corrupted store can never cause unbounded recursion.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use warden_store::{MemoryStore, Store, StoreError, Versioned};
use warden_types::{AccessError, Permission, Result, UserId};

/// Bound on optimistic-concurrency retries for read-modify-write updates.
/// Exceeding it propagates the final `VersionConflict` to the caller.
const MAX_RETRIES: usize = 16;

// ============================================================================
// Role
// ============================================================================

/// A named permission set with optional parent roles.
///
/// System roles (`is_system`) are seeded at startup and immutable:
/// updates and deletes are rejected so the platform's built-in roles
/// cannot be weakened at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Unique role name.
    pub name: String,
    /// Human-readable description for administrators.
    pub description: String,
    /// Permissions granted directly by this role.
    pub permissions: BTreeSet<Permission>,
    /// Roles this role inherits from (transitive).
    pub parent_roles: BTreeSet<String>,
    /// Whether this is an immutable built-in role.
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// RoleUpdate
// ============================================================================

/// Partial update applied to an existing role. Unset fields are preserved.
#[derive(Debug, Clone, Default)]
pub struct RoleUpdate {
    pub description: Option<String>,
    pub permissions: Option<BTreeSet<Permission>>,
    pub parent_roles: Option<BTreeSet<String>>,
}

impl RoleUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn permissions(mut self, permissions: impl IntoIterator<Item = Permission>) -> Self {
        self.permissions = Some(permissions.into_iter().collect());
        self
    }

    pub fn parent_roles<S: Into<String>>(
        mut self,
        parents: impl IntoIterator<Item = S>,
    ) -> Self {
        self.parent_roles = Some(parents.into_iter().map(Into::into).collect());
        self
    }
}

// ============================================================================
// RoleStore
// ============================================================================

/// CRUD for roles, the parent-role graph, and user-role assignments.
///
/// Role aggregates live behind the generic [`Store`] seam; assignments are
/// an in-memory index owned by this store (they are derived data a
/// persistent backend would keep in its own table).
pub struct RoleStore {
    roles: Arc<dyn Store<Role>>,
    assignments: RwLock<HashMap<UserId, BTreeSet<String>>>,
}

impl RoleStore {
    /// Creates a role store over the in-memory backend.
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    /// Creates a role store over a caller-provided backend.
    pub fn with_store(roles: Arc<dyn Store<Role>>) -> Self {
        Self {
            roles,
            assignments: RwLock::new(HashMap::new()),
        }
    }

    // ------------------------------------------------------------------
    // Role CRUD
    // ------------------------------------------------------------------

    /// Creates a new role.
    ///
    /// Fails with a validation error if the name is taken, empty, or any
    /// parent role is unknown. A freshly created role cannot close a
    /// cycle (nothing inherits from it yet), so no cycle check is needed
    /// here; [`RoleStore::update_role`] performs one.
    pub fn create_role(
        &self,
        name: &str,
        description: &str,
        permissions: impl IntoIterator<Item = Permission>,
        parents: &[&str],
    ) -> Result<Role> {
        self.create_role_inner(name, description, permissions, parents, false)
    }

    /// Creates an immutable built-in role. Intended for startup seeding.
    pub fn create_system_role(
        &self,
        name: &str,
        description: &str,
        permissions: impl IntoIterator<Item = Permission>,
        parents: &[&str],
    ) -> Result<Role> {
        self.create_role_inner(name, description, permissions, parents, true)
    }

    fn create_role_inner(
        &self,
        name: &str,
        description: &str,
        permissions: impl IntoIterator<Item = Permission>,
        parents: &[&str],
        is_system: bool,
    ) -> Result<Role> {
        if name.is_empty() {
            return Err(AccessError::validation("role name must not be empty"));
        }

        let mut parent_roles = BTreeSet::new();
        for parent in parents {
            if self.roles.get(parent)?.is_none() {
                return Err(AccessError::validation(format!(
                    "unknown parent role '{parent}'"
                )));
            }
            parent_roles.insert((*parent).to_string());
        }

        let now = Utc::now();
        let role = Role {
            name: name.to_string(),
            description: description.to_string(),
            permissions: permissions.into_iter().collect(),
            parent_roles,
            is_system,
            created_at: now,
            updated_at: now,
        };

        // A racing create surfaces as a version conflict on the fresh key.
        match self.roles.put(name, role.clone(), None) {
            Ok(_) => {}
            Err(StoreError::VersionConflict { .. }) => {
                return Err(AccessError::validation(format!(
                    "role '{name}' already exists"
                )));
            }
            Err(e) => return Err(e.into()),
        }

        info!(role = %name, is_system, "role created");
        Ok(role)
    }

    /// Looks up a role by name.
    pub fn get_role(&self, name: &str) -> Result<Role> {
        self.roles
            .get(name)?
            .map(|v| v.value)
            .ok_or_else(|| AccessError::not_found("role", name))
    }

    /// All roles, sorted by name.
    pub fn list_roles(&self) -> Result<Vec<Role>> {
        let mut roles: Vec<Role> = self
            .roles
            .list()?
            .into_iter()
            .map(|(_, v)| v.value)
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    /// The role graph as `(role, parents)` pairs, sorted by role name.
    pub fn list_hierarchy(&self) -> Result<Vec<(String, BTreeSet<String>)>> {
        let mut edges: Vec<(String, BTreeSet<String>)> = self
            .roles
            .list()?
            .into_iter()
            .map(|(name, v)| (name, v.value.parent_roles))
            .collect();
        edges.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(edges)
    }

    /// Applies a partial update to a role.
    ///
    /// System roles are immutable. Changing `parent_roles` re-validates
    /// parent existence and rejects edges that would close a cycle.
    pub fn update_role(&self, name: &str, update: RoleUpdate) -> Result<Role> {
        for _ in 0..MAX_RETRIES {
            let Versioned { value: current, version } = self
                .roles
                .get(name)?
                .ok_or_else(|| AccessError::not_found("role", name))?;

            if current.is_system {
                return Err(AccessError::ImmutableEntity {
                    kind: "role",
                    name: name.to_string(),
                });
            }

            if let Some(parents) = &update.parent_roles {
                self.validate_parents(name, parents)?;
            }

            let mut updated = current;
            if let Some(description) = &update.description {
                updated.description = description.clone();
            }
            if let Some(permissions) = &update.permissions {
                updated.permissions = permissions.clone();
            }
            if let Some(parents) = &update.parent_roles {
                updated.parent_roles = parents.clone();
            }
            updated.updated_at = Utc::now();

            match self.roles.put(name, updated.clone(), Some(version)) {
                Ok(_) => {
                    info!(role = %name, "role updated");
                    return Ok(updated);
                }
                Err(StoreError::VersionConflict { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(AccessError::Store(StoreError::Backend(format!(
            "update of role '{name}' kept conflicting after {MAX_RETRIES} attempts"
        ))))
    }

    /// Deletes a role and cascades: the role is removed from every user's
    /// assignment set and from every other role's parent set.
    pub fn delete_role(&self, name: &str) -> Result<()> {
        let Versioned { value: role, .. } = self
            .roles
            .get(name)?
            .ok_or_else(|| AccessError::not_found("role", name))?;

        if role.is_system {
            return Err(AccessError::ImmutableEntity {
                kind: "role",
                name: name.to_string(),
            });
        }

        self.roles.delete(name)?;

        // Cascade: drop from user assignments.
        {
            let mut assignments = self.assignments.write().expect("assignments lock poisoned");
            for roles in assignments.values_mut() {
                roles.remove(name);
            }
            assignments.retain(|_, roles| !roles.is_empty());
        }

        // Cascade: strip from other roles' parent sets.
        for (child, versioned) in self.roles.list()? {
            if !versioned.value.parent_roles.contains(name) {
                continue;
            }
            let mut version = versioned.version;
            let mut child_role = versioned.value;
            for _ in 0..MAX_RETRIES {
                child_role.parent_roles.remove(name);
                child_role.updated_at = Utc::now();
                match self.roles.put(&child, child_role.clone(), Some(version)) {
                    Ok(_) => break,
                    Err(StoreError::VersionConflict { .. }) => {
                        match self.roles.get(&child)? {
                            Some(fresh) => {
                                version = fresh.version;
                                child_role = fresh.value;
                                if !child_role.parent_roles.contains(name) {
                                    break;
                                }
                            }
                            // Child was deleted concurrently; nothing to strip.
                            None => break,
                        }
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        info!(role = %name, "role deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Assignments
    // ------------------------------------------------------------------

    /// Assigns a role to a user. The role must exist.
    pub fn assign_role(&self, user_id: &UserId, name: &str) -> Result<()> {
        if self.roles.get(name)?.is_none() {
            return Err(AccessError::not_found("role", name));
        }

        self.assignments
            .write()
            .expect("assignments lock poisoned")
            .entry(user_id.clone())
            .or_default()
            .insert(name.to_string());

        info!(user = %user_id, role = %name, "role assigned");
        Ok(())
    }

    /// Removes a role from a user. Revoking an unassigned role is a no-op.
    pub fn revoke_role(&self, user_id: &UserId, name: &str) -> Result<()> {
        let mut assignments = self.assignments.write().expect("assignments lock poisoned");
        if let Some(roles) = assignments.get_mut(user_id) {
            roles.remove(name);
            if roles.is_empty() {
                assignments.remove(user_id);
            }
        }

        info!(user = %user_id, role = %name, "role revoked");
        Ok(())
    }

    /// The roles directly assigned to a user (inheritance not expanded).
    pub fn get_user_roles(&self, user_id: &UserId) -> BTreeSet<String> {
        self.assignments
            .read()
            .expect("assignments lock poisoned")
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Hierarchy validation
    // ------------------------------------------------------------------

    /// Rejects unknown parents, self-parenting, and cycle-closing edges.
    fn validate_parents(&self, role: &str, parents: &BTreeSet<String>) -> Result<()> {
        for parent in parents {
            if parent == role {
                return Err(AccessError::validation(format!(
                    "role '{role}' cannot be its own parent"
                )));
            }
            if self.roles.get(parent)?.is_none() {
                return Err(AccessError::validation(format!(
                    "unknown parent role '{parent}'"
                )));
            }
            if self.inherits_from(parent, role)? {
                return Err(AccessError::validation(format!(
                    "adding parent '{parent}' to role '{role}' would create a cycle"
                )));
            }
        }
        Ok(())
    }

    /// Whether `start` transitively inherits from `target`.
    fn inherits_from(&self, start: &str, target: &str) -> Result<bool> {
        let mut visited: BTreeSet<String> = BTreeSet::new();
        let mut stack = vec![start.to_string()];

        while let Some(current) = stack.pop() {
            if current == target {
                return Ok(true);
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(v) = self.roles.get(&current)? {
                stack.extend(v.value.parent_roles.iter().cloned());
            }
        }
        Ok(false)
    }
}

impl Default for RoleStore {
    fn default() -> Self {
        Self::new()
    }
}
