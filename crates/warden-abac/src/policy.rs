//! ABAC policy definitions.
//!
//! A policy is an ordered list of rules; a rule is a conjunction of
//! conditions over namespaced attributes. Policies carry a priority used
//! to order them during evaluation (highest first, name as a stable
//! tie-break), and an `enabled` flag that soft-disables a policy without
//! deleting its definition or audit history.

use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use warden_types::{AccessError, Result, UserId};

// ============================================================================
// Effect
// ============================================================================

/// The effect of a policy rule: allow or deny access.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Effect {
    /// Grant access.
    Allow,
    /// Deny access. The default: deny unless explicitly allowed.
    #[default]
    Deny,
}

// ============================================================================
// ConditionOperator
// ============================================================================

/// Comparison operator applied between an attribute and a literal value.
///
/// The set is closed; anything else deserializes to the explicit
/// [`ConditionOperator::Unsupported`] variant, which is rejected when a
/// policy is written and evaluates to `false` (with a warning) if it ever
/// reaches the evaluator anyway.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConditionOperator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    /// Attribute value is a member of the literal array.
    In,
    /// Attribute value is not a member of the literal array.
    NotIn,
    /// Attribute array contains the literal, or attribute string contains
    /// the literal substring.
    Contains,
    /// Attribute string matches the literal regex pattern.
    Matches,
    /// An operator name this version does not recognize.
    Unsupported(String),
}

impl ConditionOperator {
    pub fn as_str(&self) -> &str {
        match self {
            ConditionOperator::Eq => "eq",
            ConditionOperator::Ne => "ne",
            ConditionOperator::Gt => "gt",
            ConditionOperator::Lt => "lt",
            ConditionOperator::Gte => "gte",
            ConditionOperator::Lte => "lte",
            ConditionOperator::In => "in",
            ConditionOperator::NotIn => "not_in",
            ConditionOperator::Contains => "contains",
            ConditionOperator::Matches => "matches",
            ConditionOperator::Unsupported(raw) => raw,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, ConditionOperator::Unsupported(_))
    }
}

impl Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ConditionOperator {
    fn from(value: String) -> Self {
        match value.as_str() {
            "eq" => ConditionOperator::Eq,
            "ne" => ConditionOperator::Ne,
            "gt" => ConditionOperator::Gt,
            "lt" => ConditionOperator::Lt,
            "gte" => ConditionOperator::Gte,
            "lte" => ConditionOperator::Lte,
            "in" => ConditionOperator::In,
            "not_in" => ConditionOperator::NotIn,
            "contains" => ConditionOperator::Contains,
            "matches" => ConditionOperator::Matches,
            _ => ConditionOperator::Unsupported(value),
        }
    }
}

impl From<ConditionOperator> for String {
    fn from(op: ConditionOperator) -> Self {
        op.as_str().to_string()
    }
}

// ============================================================================
// Condition
// ============================================================================

/// A single comparison over one attribute path.
///
/// `negated` inverts the operator result. A missing attribute makes the
/// whole condition false regardless of negation (fail-closed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Namespaced attribute path, e.g. `"user.department"` or
    /// `"environment.hour"`.
    pub attribute: String,
    pub operator: ConditionOperator,
    /// Literal compared against the attribute value.
    pub value: Value,
    /// Invert the operator result.
    #[serde(default)]
    pub negated: bool,
}

impl Condition {
    pub fn new(
        attribute: impl Into<String>,
        operator: ConditionOperator,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            attribute: attribute.into(),
            operator,
            value: value.into(),
            negated: false,
        }
    }

    /// Inverts the condition (builder).
    pub fn negated(mut self) -> Self {
        self.negated = true;
        self
    }
}

// ============================================================================
// PolicyRule
// ============================================================================

/// One rule within a policy: a conjunction of conditions and an effect.
///
/// Rules are evaluated in list order; the first rule whose conditions all
/// hold determines the policy's effect (first-match-wins within the
/// policy).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Rule name for the decision trace and audit logging.
    pub name: String,
    pub effect: Effect,
    /// All conditions must hold for the rule to match. An empty list
    /// matches unconditionally.
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub description: String,
}

impl PolicyRule {
    pub fn new(name: impl Into<String>, effect: Effect) -> Self {
        Self {
            name: name.into(),
            effect,
            conditions: Vec::new(),
            description: String::new(),
        }
    }

    /// Adds a condition (builder).
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

// ============================================================================
// Policy
// ============================================================================

/// An ABAC policy aggregate.
///
/// Rules and conditions have no independent CRUD; they are edited as part
/// of the owning policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Unique policy name.
    pub name: String,
    pub description: String,
    /// Rules in author-defined evaluation order.
    pub rules: Vec<PolicyRule>,
    /// Higher priority evaluates first across policies.
    pub priority: i64,
    /// Disabled policies are skipped by the evaluator but keep their
    /// definition (soft-disable for rollback).
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: UserId,
}

impl Policy {
    /// Creates a draft policy. Timestamps are finalized by the store on
    /// create; `enabled` starts true.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        priority: i64,
        created_by: UserId,
    ) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            description: description.into(),
            rules: Vec::new(),
            priority,
            enabled: true,
            created_at: now,
            updated_at: now,
            created_by,
        }
    }

    /// Adds a rule (builder).
    pub fn with_rule(mut self, rule: PolicyRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Write-time validation: non-empty name, named rules, and no
    /// unsupported operators.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(AccessError::validation("policy name must not be empty"));
        }
        for rule in &self.rules {
            if rule.name.is_empty() {
                return Err(AccessError::validation(format!(
                    "policy '{}' has a rule with an empty name",
                    self.name
                )));
            }
            for condition in &rule.conditions {
                if !condition.operator.is_supported() {
                    return Err(AccessError::validation(format!(
                        "policy '{}' rule '{}' uses unsupported operator '{}'",
                        self.name, rule.name, condition.operator
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test]
    fn test_default_effect_is_deny() {
        assert_eq!(Effect::default(), Effect::Deny);
    }

    #[test_case("eq", ConditionOperator::Eq)]
    #[test_case("not_in", ConditionOperator::NotIn)]
    #[test_case("matches", ConditionOperator::Matches)]
    fn test_operator_parse(s: &str, expected: ConditionOperator) {
        assert_eq!(ConditionOperator::from(s.to_string()), expected);
        assert_eq!(expected.as_str(), s);
    }

    #[test]
    fn test_unknown_operator_becomes_unsupported() {
        let op = ConditionOperator::from("between".to_string());
        assert_eq!(op, ConditionOperator::Unsupported("between".to_string()));
        assert!(!op.is_supported());
        assert_eq!(op.as_str(), "between");
    }

    #[test]
    fn test_operator_serde_roundtrip_preserves_unknown() {
        let json = "\"between\"";
        let op: ConditionOperator = serde_json::from_str(json).unwrap();
        assert!(!op.is_supported());
        assert_eq!(serde_json::to_string(&op).unwrap(), json);
    }

    #[test]
    fn test_validate_rejects_unsupported_operator() {
        let policy = Policy::new("p", "", 10, UserId::from("admin")).with_rule(
            PolicyRule::new("r", Effect::Allow).with_condition(Condition::new(
                "user.role",
                ConditionOperator::from("between".to_string()),
                json!("x"),
            )),
        );
        let err = policy.validate().unwrap_err();
        assert!(err.to_string().contains("unsupported operator"));
    }

    #[test]
    fn test_validate_rejects_unnamed_rule() {
        let policy = Policy::new("p", "", 10, UserId::from("admin"))
            .with_rule(PolicyRule::new("", Effect::Allow));
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_policy_serialization_roundtrip() {
        let policy = Policy::new("business-hours", "Allow 9-17", 50, UserId::from("admin"))
            .with_rule(
                PolicyRule::new("in-hours", Effect::Allow)
                    .with_condition(Condition::new(
                        "environment.hour",
                        ConditionOperator::Gte,
                        json!(9),
                    ))
                    .with_condition(
                        Condition::new("environment.hour", ConditionOperator::Gte, json!(17))
                            .negated(),
                    ),
            );

        let json = serde_json::to_string(&policy).expect("serialize policy");
        let back: Policy = serde_json::from_str(&json).expect("deserialize policy");
        assert_eq!(back, policy);
        assert!(back.rules[0].conditions[1].negated);
    }
}
