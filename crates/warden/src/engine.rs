//! The [`AccessControl`] engine: one handle over roles, grants, policies,
//! and auditing.
//!
//! Every mutation and every decision is reported to the injected
//! [`AuditSink`] after it takes effect. The engine itself stays
//! synchronous and storage-agnostic; hosts swap backends and sinks
//! through the builder.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use warden_abac::{
    AttributeProvider, Decision, EvaluationContext, Policy, PolicyEvaluator, PolicyStore,
    PolicyUpdate, ProviderRegistry,
};
use warden_rbac::{
    PermissionResolver, ResourcePermission, ResourcePermissionStore, Role, RoleStore, RoleUpdate,
};
use warden_store::Store;
use warden_types::{
    AuditAction, AuditEvent, AuditSink, Permission, ResourceRef, Result, TracingAuditSink, UserId,
};

// ============================================================================
// Builder
// ============================================================================

/// Configures storage backends and the audit sink before building an
/// [`AccessControl`]. Defaults: in-memory stores, tracing audit sink,
/// the standard attribute providers.
pub struct AccessControlBuilder {
    role_store: Option<Arc<dyn Store<Role>>>,
    grant_store: Option<Arc<dyn Store<Vec<ResourcePermission>>>>,
    policy_store: Option<Arc<dyn Store<Policy>>>,
    audit: Arc<dyn AuditSink>,
    registry: ProviderRegistry,
}

impl AccessControlBuilder {
    fn new() -> Self {
        Self {
            role_store: None,
            grant_store: None,
            policy_store: None,
            audit: Arc::new(TracingAuditSink),
            registry: ProviderRegistry::with_defaults(),
        }
    }

    pub fn role_store(mut self, store: Arc<dyn Store<Role>>) -> Self {
        self.role_store = Some(store);
        self
    }

    pub fn grant_store(mut self, store: Arc<dyn Store<Vec<ResourcePermission>>>) -> Self {
        self.grant_store = Some(store);
        self
    }

    pub fn policy_store(mut self, store: Arc<dyn Store<Policy>>) -> Self {
        self.policy_store = Some(store);
        self
    }

    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    /// Registers (or replaces) an attribute provider.
    pub fn provider(mut self, name: &str, provider: Arc<dyn AttributeProvider>) -> Self {
        self.registry.register(name, provider);
        self
    }

    pub fn build(self) -> AccessControl {
        let roles = Arc::new(match self.role_store {
            Some(store) => RoleStore::with_store(store),
            None => RoleStore::new(),
        });
        let grants = Arc::new(match self.grant_store {
            Some(store) => ResourcePermissionStore::with_store(store),
            None => ResourcePermissionStore::new(),
        });
        let policies = Arc::new(match self.policy_store {
            Some(store) => PolicyStore::with_store(store),
            None => PolicyStore::new(),
        });

        AccessControl {
            resolver: PermissionResolver::new(Arc::clone(&roles), Arc::clone(&grants)),
            evaluator: PolicyEvaluator::with_registry(Arc::clone(&policies), self.registry),
            roles,
            grants,
            policies,
            audit: self.audit,
        }
    }
}

// ============================================================================
// AccessControl
// ============================================================================

/// The access-control engine.
///
/// All methods are `&self` and thread-safe; a single instance is shared
/// across request handlers behind an `Arc`.
pub struct AccessControl {
    roles: Arc<RoleStore>,
    grants: Arc<ResourcePermissionStore>,
    policies: Arc<PolicyStore>,
    resolver: PermissionResolver,
    evaluator: PolicyEvaluator,
    audit: Arc<dyn AuditSink>,
}

impl AccessControl {
    /// An engine with in-memory storage and tracing audit output.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> AccessControlBuilder {
        AccessControlBuilder::new()
    }

    fn audit(&self, action: AuditAction) {
        self.audit.record(AuditEvent::now(action));
    }

    // ------------------------------------------------------------------
    // Decisions
    // ------------------------------------------------------------------

    /// Coarse RBAC check: does the user hold `permission`, through roles,
    /// user-scope grants, or (if given) a grant on the concrete resource?
    pub fn has_permission(
        &self,
        user_id: &UserId,
        permission: Permission,
        resource: Option<&ResourceRef>,
    ) -> bool {
        let allowed = self.resolver.has_permission(user_id, permission, resource);
        self.audit(AuditAction::PermissionChecked {
            user_id: user_id.clone(),
            permission,
            resource: resource.cloned(),
            allowed,
        });
        allowed
    }

    /// Contextual ABAC evaluation. Fail-closed: any internal failure
    /// surfaces as a deny in the returned [`Decision`], never as an error.
    pub fn evaluate_access(&self, ctx: &EvaluationContext) -> Decision {
        let decision = self.evaluator.evaluate(ctx);
        let matched_policy = decision
            .policy_results
            .iter()
            .find(|r| r.matched_rule.is_some())
            .map(|r| r.policy.clone());
        self.audit(AuditAction::AccessEvaluated {
            user_id: ctx.user_id.clone(),
            action: ctx.action.clone(),
            resource: ctx.resource.clone(),
            allowed: decision.is_allowed(),
            matched_policy,
        });
        decision
    }

    /// The user's full effective permission set.
    pub fn effective_permissions(
        &self,
        user_id: &UserId,
    ) -> std::collections::BTreeSet<Permission> {
        self.resolver.effective_permissions(user_id)
    }

    // ------------------------------------------------------------------
    // Role administration
    // ------------------------------------------------------------------

    pub fn create_role(
        &self,
        name: &str,
        description: &str,
        permissions: impl IntoIterator<Item = Permission>,
        parent_roles: &[&str],
    ) -> Result<Role> {
        let role = self
            .roles
            .create_role(name, description, permissions, parent_roles)?;
        self.audit(AuditAction::RoleCreated {
            role: role.name.clone(),
        });
        Ok(role)
    }

    /// Creates a role that cannot be modified or deleted afterwards.
    pub fn create_system_role(
        &self,
        name: &str,
        description: &str,
        permissions: impl IntoIterator<Item = Permission>,
        parent_roles: &[&str],
    ) -> Result<Role> {
        let role = self
            .roles
            .create_system_role(name, description, permissions, parent_roles)?;
        self.audit(AuditAction::RoleCreated {
            role: role.name.clone(),
        });
        Ok(role)
    }

    pub fn get_role(&self, name: &str) -> Result<Role> {
        self.roles.get_role(name)
    }

    pub fn list_roles(&self) -> Result<Vec<Role>> {
        self.roles.list_roles()
    }

    /// Role names with their direct parents, for hierarchy inspection.
    pub fn role_hierarchy(&self) -> Result<Vec<(String, std::collections::BTreeSet<String>)>> {
        self.roles.list_hierarchy()
    }

    pub fn update_role(&self, name: &str, update: RoleUpdate) -> Result<Role> {
        let role = self.roles.update_role(name, update)?;
        self.audit(AuditAction::RoleUpdated {
            role: role.name.clone(),
        });
        Ok(role)
    }

    /// Deletes a role, cascading its assignments and parent edges.
    pub fn delete_role(&self, name: &str) -> Result<()> {
        self.roles.delete_role(name)?;
        self.audit(AuditAction::RoleDeleted {
            role: name.to_string(),
        });
        Ok(())
    }

    pub fn assign_role(&self, user_id: &UserId, role: &str) -> Result<()> {
        self.roles.assign_role(user_id, role)?;
        self.audit(AuditAction::RoleAssigned {
            user_id: user_id.clone(),
            role: role.to_string(),
        });
        Ok(())
    }

    pub fn revoke_role(&self, user_id: &UserId, role: &str) -> Result<()> {
        self.roles.revoke_role(user_id, role)?;
        self.audit(AuditAction::RoleRevoked {
            user_id: user_id.clone(),
            role: role.to_string(),
        });
        Ok(())
    }

    pub fn user_roles(&self, user_id: &UserId) -> std::collections::BTreeSet<String> {
        self.roles.get_user_roles(user_id)
    }

    // ------------------------------------------------------------------
    // Resource grants
    // ------------------------------------------------------------------

    /// Issues a (possibly time-bounded) grant on a resource.
    pub fn grant(
        &self,
        user_id: &UserId,
        resource: &ResourceRef,
        permissions: impl IntoIterator<Item = Permission>,
        granted_by: &UserId,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<ResourcePermission> {
        let entry = self
            .grants
            .grant(user_id, resource, permissions, granted_by, expires_at)?;
        self.audit(AuditAction::GrantIssued {
            user_id: user_id.clone(),
            resource: resource.clone(),
            permissions: entry.permissions.iter().copied().collect(),
            granted_by: granted_by.clone(),
            expires_at,
        });
        Ok(entry)
    }

    /// Revokes permissions from the user's grants on a resource.
    pub fn revoke_grant(
        &self,
        user_id: &UserId,
        resource: &ResourceRef,
        permissions: impl IntoIterator<Item = Permission> + Clone,
    ) -> Result<()> {
        let revoked: Vec<Permission> = permissions.clone().into_iter().collect();
        self.grants.revoke(user_id, resource, permissions)?;
        self.audit(AuditAction::GrantRevoked {
            user_id: user_id.clone(),
            resource: resource.clone(),
            permissions: revoked,
        });
        Ok(())
    }

    /// Active (non-expired) grant entries the user holds on a resource.
    pub fn active_grants(
        &self,
        user_id: &UserId,
        resource: &ResourceRef,
    ) -> Vec<ResourcePermission> {
        self.grants.list_active(user_id, resource, Utc::now())
    }

    /// Removes expired grant entries; returns how many were dropped.
    /// Safe to run from a periodic job while grants are being issued.
    pub fn cleanup_expired_grants(&self) -> Result<usize> {
        let removed = self.grants.cleanup_expired(Utc::now())?;
        if removed > 0 {
            self.audit(AuditAction::GrantsExpired { removed });
        }
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Policy administration
    // ------------------------------------------------------------------

    pub fn create_policy(&self, policy: Policy) -> Result<Policy> {
        let policy = self.policies.create_policy(policy)?;
        self.audit(AuditAction::PolicyCreated {
            policy: policy.name.clone(),
        });
        Ok(policy)
    }

    pub fn get_policy(&self, name: &str) -> Result<Policy> {
        self.policies.get_policy(name)
    }

    pub fn list_policies(&self) -> Result<Vec<Policy>> {
        self.policies.list_policies()
    }

    pub fn update_policy(&self, name: &str, update: PolicyUpdate) -> Result<Policy> {
        let policy = self.policies.update_policy(name, update)?;
        self.audit(AuditAction::PolicyUpdated {
            policy: policy.name.clone(),
        });
        Ok(policy)
    }

    /// Enables or disables a policy without losing its definition.
    pub fn set_policy_enabled(&self, name: &str, enabled: bool) -> Result<Policy> {
        let policy = self.policies.set_enabled(name, enabled)?;
        self.audit(AuditAction::PolicyToggled {
            policy: policy.name.clone(),
            enabled,
        });
        Ok(policy)
    }

    pub fn delete_policy(&self, name: &str) -> Result<()> {
        self.policies.delete_policy(name)?;
        self.audit(AuditAction::PolicyDeleted {
            policy: name.to_string(),
        });
        Ok(())
    }

    /// Dry-run: which enabled policies could apply to this action and
    /// resource type, in evaluation order.
    pub fn applicable_policies(&self, action: &str, resource_type: &str) -> Result<Vec<Policy>> {
        self.policies.applicable_policies(action, resource_type)
    }
}

impl Default for AccessControl {
    fn default() -> Self {
        Self::new()
    }
}
