//! Policy CRUD and evaluation-order listing.
//!
//! Policies are whole aggregates: rules and conditions are edited as part
//! of the owning policy, never independently. `enabled` toggles
//! separately from delete so a policy can be rolled back without losing
//! its definition or audit history.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::info;

use warden_store::{MemoryStore, Store, StoreError, Versioned};
use warden_types::{AccessError, Result};

use crate::policy::{Condition, ConditionOperator, Policy, PolicyRule};

const MAX_RETRIES: usize = 16;

// ============================================================================
// PolicyUpdate
// ============================================================================

/// Partial update applied to an existing policy. Unset fields are preserved.
#[derive(Debug, Clone, Default)]
pub struct PolicyUpdate {
    pub description: Option<String>,
    pub rules: Option<Vec<PolicyRule>>,
    pub priority: Option<i64>,
}

impl PolicyUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn rules(mut self, rules: Vec<PolicyRule>) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }
}

// ============================================================================
// PolicyStore
// ============================================================================

/// CRUD for [`Policy`] aggregates behind the generic [`Store`] seam.
pub struct PolicyStore {
    policies: Arc<dyn Store<Policy>>,
}

impl PolicyStore {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    pub fn with_store(policies: Arc<dyn Store<Policy>>) -> Self {
        Self { policies }
    }

    /// Creates a policy from a validated draft. Timestamps are stamped
    /// here; the draft's `enabled` flag is honored.
    pub fn create_policy(&self, mut policy: Policy) -> Result<Policy> {
        policy.validate()?;

        let now = Utc::now();
        policy.created_at = now;
        policy.updated_at = now;

        let name = policy.name.clone();
        match self.policies.put(&name, policy.clone(), None) {
            Ok(_) => {
                info!(policy = %name, "policy created");
                Ok(policy)
            }
            Err(StoreError::VersionConflict { .. }) => Err(AccessError::validation(format!(
                "policy '{name}' already exists"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_policy(&self, name: &str) -> Result<Policy> {
        self.policies
            .get(name)?
            .map(|v| v.value)
            .ok_or_else(|| AccessError::not_found("policy", name))
    }

    /// All policies in evaluation order: priority descending, then name
    /// ascending as the stable tie-break.
    pub fn list_policies(&self) -> Result<Vec<Policy>> {
        let mut policies: Vec<Policy> = self
            .policies
            .list()?
            .into_iter()
            .map(|(_, v)| v.value)
            .collect();
        policies.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name)));
        Ok(policies)
    }

    /// Enabled policies in evaluation order.
    pub fn evaluation_order(&self) -> Result<Vec<Policy>> {
        Ok(self
            .list_policies()?
            .into_iter()
            .filter(|p| p.enabled)
            .collect())
    }

    /// Applies a partial update. Rule changes are re-validated.
    pub fn update_policy(&self, name: &str, update: PolicyUpdate) -> Result<Policy> {
        for _ in 0..MAX_RETRIES {
            let Versioned { value: current, version } = self
                .policies
                .get(name)?
                .ok_or_else(|| AccessError::not_found("policy", name))?;

            let mut updated = current;
            if let Some(description) = &update.description {
                updated.description = description.clone();
            }
            if let Some(rules) = &update.rules {
                updated.rules = rules.clone();
            }
            if let Some(priority) = update.priority {
                updated.priority = priority;
            }
            updated.updated_at = Utc::now();
            updated.validate()?;

            match self.policies.put(name, updated.clone(), Some(version)) {
                Ok(_) => {
                    info!(policy = %name, "policy updated");
                    return Ok(updated);
                }
                Err(StoreError::VersionConflict { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(AccessError::Store(StoreError::Backend(format!(
            "update of policy '{name}' kept conflicting after {MAX_RETRIES} attempts"
        ))))
    }

    /// Soft-enables or -disables a policy without touching its definition.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<Policy> {
        for _ in 0..MAX_RETRIES {
            let Versioned { value: mut policy, version } = self
                .policies
                .get(name)?
                .ok_or_else(|| AccessError::not_found("policy", name))?;

            policy.enabled = enabled;
            policy.updated_at = Utc::now();

            match self.policies.put(name, policy.clone(), Some(version)) {
                Ok(_) => {
                    info!(policy = %name, enabled, "policy toggled");
                    return Ok(policy);
                }
                Err(StoreError::VersionConflict { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(AccessError::Store(StoreError::Backend(format!(
            "toggle of policy '{name}' kept conflicting after {MAX_RETRIES} attempts"
        ))))
    }

    pub fn delete_policy(&self, name: &str) -> Result<()> {
        if !self.policies.delete(name)? {
            return Err(AccessError::not_found("policy", name));
        }
        info!(policy = %name, "policy deleted");
        Ok(())
    }

    /// Dry-run: enabled policies, in evaluation order, that could apply
    /// to a request with the given action and resource type.
    ///
    /// No attribute gathering happens; a policy qualifies if any rule is
    /// unconditional or has no `eq` condition on `action.type` /
    /// `resource.type` that contradicts the given literals. This
    /// over-approximates on purpose: it answers "which policies could
    /// fire", not "which will".
    pub fn applicable_policies(&self, action: &str, resource_type: &str) -> Result<Vec<Policy>> {
        Ok(self
            .evaluation_order()?
            .into_iter()
            .filter(|p| {
                p.rules
                    .iter()
                    .any(|rule| rule_could_apply(rule, action, resource_type))
            })
            .collect())
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

fn rule_could_apply(rule: &PolicyRule, action: &str, resource_type: &str) -> bool {
    rule.conditions
        .iter()
        .all(|c| !condition_contradicts(c, action, resource_type))
}

/// A non-negated `eq` on the routing attributes with a different literal
/// can never match the request.
fn condition_contradicts(condition: &Condition, action: &str, resource_type: &str) -> bool {
    if condition.negated || condition.operator != ConditionOperator::Eq {
        return false;
    }
    let literal = match (condition.attribute.as_str(), &condition.value) {
        ("action.type", Value::String(s)) => Some((s.as_str(), action)),
        ("resource.type", Value::String(s)) => Some((s.as_str(), resource_type)),
        _ => None,
    };
    literal.is_some_and(|(expected, actual)| expected != actual)
}
