//! Policy evaluation.
//!
//! First-applicable combining: enabled policies are walked in priority
//! order (highest first, name ascending on ties); within each policy the
//! first rule whose conditions all hold decides the policy; the first
//! policy that decides anything decides the request. If no policy
//! applies, the decision is `Deny`.
//!
//! Evaluation never raises. Malformed input degrades to a non-match:
//! a missing attribute makes its condition false before negation, an
//! unsupported operator or a type mismatch makes the condition false
//! with a warning, a store read failure yields `Deny`.

use std::sync::Arc;

use regex::Regex;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::attributes::{AttributeSet, EvaluationContext, ProviderRegistry};
use crate::policy::{Condition, ConditionOperator, Effect, Policy, PolicyRule};
use crate::store::PolicyStore;

// ============================================================================
// Decision
// ============================================================================

/// What one policy contributed to a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyOutcome {
    Allow,
    Deny,
    /// No rule in the policy matched.
    NotApplicable,
}

/// Per-policy entry in the decision trace.
#[derive(Debug, Clone)]
pub struct PolicyResult {
    pub policy: String,
    pub outcome: PolicyOutcome,
    /// Name of the rule that decided the policy, if any.
    pub matched_rule: Option<String>,
}

/// The outcome of one evaluation, with the trace needed to explain it.
#[derive(Debug, Clone)]
pub struct Decision {
    pub effect: Effect,
    /// True when no policy applied and the deny-by-default fallback fired.
    pub default_applied: bool,
    /// Every policy consulted, in evaluation order, up to and including
    /// the one that decided.
    pub policy_results: Vec<PolicyResult>,
    /// Number of attributes gathered for this evaluation.
    pub attributes_considered: usize,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        self.effect == Effect::Allow
    }

    fn deny_by_default(policy_results: Vec<PolicyResult>, attributes_considered: usize) -> Self {
        Self {
            effect: Effect::Deny,
            default_applied: true,
            policy_results,
            attributes_considered,
        }
    }
}

// ============================================================================
// PolicyEvaluator
// ============================================================================

/// Evaluates access requests against the policy store.
pub struct PolicyEvaluator {
    policies: Arc<PolicyStore>,
    registry: ProviderRegistry,
}

impl PolicyEvaluator {
    /// An evaluator with the default attribute providers.
    pub fn new(policies: Arc<PolicyStore>) -> Self {
        Self::with_registry(policies, ProviderRegistry::with_defaults())
    }

    pub fn with_registry(policies: Arc<PolicyStore>, registry: ProviderRegistry) -> Self {
        Self { policies, registry }
    }

    pub fn registry_mut(&mut self) -> &mut ProviderRegistry {
        &mut self.registry
    }

    /// Evaluates one access request. Never panics and never returns an
    /// error: any failure along the way degrades to `Deny`.
    pub fn evaluate(&self, ctx: &EvaluationContext) -> Decision {
        let mut attrs = self.registry.gather(ctx);
        // The attempted action is an attribute like any other.
        attrs.insert("action", "type", json!(ctx.action));

        let policies = match self.policies.evaluation_order() {
            Ok(policies) => policies,
            Err(e) => {
                warn!(error = %e, "policy listing failed; denying");
                return Decision::deny_by_default(Vec::new(), attrs.len());
            }
        };

        let mut results = Vec::with_capacity(policies.len());
        for policy in &policies {
            let (outcome, matched_rule) = self.evaluate_policy(policy, &attrs);
            let decided = match outcome {
                PolicyOutcome::Allow => Some(Effect::Allow),
                PolicyOutcome::Deny => Some(Effect::Deny),
                PolicyOutcome::NotApplicable => None,
            };
            results.push(PolicyResult {
                policy: policy.name.clone(),
                outcome,
                matched_rule,
            });

            if let Some(effect) = decided {
                debug!(
                    policy = %policy.name,
                    effect = ?effect,
                    "policy decided the request"
                );
                return Decision {
                    effect,
                    default_applied: false,
                    policy_results: results,
                    attributes_considered: attrs.len(),
                };
            }
        }

        debug!(user = %ctx.user_id, action = %ctx.action, "no policy applied; denying by default");
        Decision::deny_by_default(results, attrs.len())
    }

    /// First rule whose conditions all hold decides the policy.
    fn evaluate_policy(
        &self,
        policy: &Policy,
        attrs: &AttributeSet,
    ) -> (PolicyOutcome, Option<String>) {
        for rule in &policy.rules {
            if self.rule_matches(policy, rule, attrs) {
                let outcome = match rule.effect {
                    Effect::Allow => PolicyOutcome::Allow,
                    Effect::Deny => PolicyOutcome::Deny,
                };
                return (outcome, Some(rule.name.clone()));
            }
        }
        (PolicyOutcome::NotApplicable, None)
    }

    fn rule_matches(&self, policy: &Policy, rule: &PolicyRule, attrs: &AttributeSet) -> bool {
        rule.conditions
            .iter()
            .all(|condition| evaluate_condition(policy, rule, condition, attrs))
    }
}

/// Evaluates one condition against the gathered attributes.
///
/// A missing attribute is false regardless of `negated`; negation only
/// applies to the operator result on a present attribute.
fn evaluate_condition(
    policy: &Policy,
    rule: &PolicyRule,
    condition: &Condition,
    attrs: &AttributeSet,
) -> bool {
    let Some(actual) = attrs.get(&condition.attribute) else {
        warn!(
            policy = %policy.name,
            rule = %rule.name,
            attribute = %condition.attribute,
            "attribute missing; condition is false"
        );
        return false;
    };

    let matched = match compare(&condition.operator, actual, &condition.value) {
        Some(matched) => matched,
        None => {
            warn!(
                policy = %policy.name,
                rule = %rule.name,
                attribute = %condition.attribute,
                operator = %condition.operator,
                "condition could not be evaluated; treating as false"
            );
            false
        }
    };

    if condition.negated { !matched } else { matched }
}

/// Applies `operator` between the attribute value and the literal.
///
/// `None` means the comparison is undefined for these inputs (type
/// mismatch, invalid regex, unsupported operator).
fn compare(operator: &ConditionOperator, actual: &Value, expected: &Value) -> Option<bool> {
    match operator {
        ConditionOperator::Eq => Some(actual == expected),
        ConditionOperator::Ne => Some(actual != expected),
        ConditionOperator::Gt => ordering(actual, expected, |o| o == std::cmp::Ordering::Greater),
        ConditionOperator::Lt => ordering(actual, expected, |o| o == std::cmp::Ordering::Less),
        ConditionOperator::Gte => ordering(actual, expected, |o| o != std::cmp::Ordering::Less),
        ConditionOperator::Lte => ordering(actual, expected, |o| o != std::cmp::Ordering::Greater),
        ConditionOperator::In => membership(actual, expected),
        ConditionOperator::NotIn => membership(actual, expected).map(|m| !m),
        ConditionOperator::Contains => contains(actual, expected),
        ConditionOperator::Matches => regex_match(actual, expected),
        ConditionOperator::Unsupported(_) => None,
    }
}

/// Ordered comparison over two numbers or two strings.
fn ordering(
    actual: &Value,
    expected: &Value,
    test: impl Fn(std::cmp::Ordering) -> bool,
) -> Option<bool> {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64()?, b.as_f64()?);
            a.partial_cmp(&b).map(test)
        }
        (Value::String(a), Value::String(b)) => Some(test(a.cmp(b))),
        _ => None,
    }
}

/// Whether the attribute value appears in the literal array.
fn membership(actual: &Value, expected: &Value) -> Option<bool> {
    match expected {
        Value::Array(items) => Some(items.contains(actual)),
        _ => None,
    }
}

/// Array-contains-literal, or string-contains-substring.
fn contains(actual: &Value, expected: &Value) -> Option<bool> {
    match (actual, expected) {
        (Value::Array(items), needle) => Some(items.contains(needle)),
        (Value::String(haystack), Value::String(needle)) => Some(haystack.contains(needle)),
        _ => None,
    }
}

/// Attribute string matches the literal regex pattern. The pattern is
/// compiled per evaluation; an invalid pattern is undefined.
fn regex_match(actual: &Value, expected: &Value) -> Option<bool> {
    let (Value::String(s), Value::String(pattern)) = (actual, expected) else {
        return None;
    };
    match Regex::new(pattern) {
        Ok(re) => Some(re.is_match(s)),
        Err(e) => {
            warn!(pattern = %pattern, error = %e, "invalid regex pattern in condition");
            None
        }
    }
}
