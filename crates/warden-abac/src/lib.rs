//! # warden-abac: Attribute-Based Access Control
//!
//! Context-aware access decisions from user, resource, and environment
//! attributes. Complements role-based checks with dynamic policies that
//! can reason about time of day, location, data sensitivity, or any
//! attribute a provider supplies.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  EvaluationContext                           │
//! │  (user + action + resource + request data)   │
//! └─────────────────┬───────────────────────────┘
//!                   │  ProviderRegistry::gather
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  AttributeSet                                │
//! │  user.* / resource.* / environment.* /       │
//! │  action.*                                    │
//! └─────────────────┬───────────────────────────┘
//!                   │
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  PolicyEvaluator                             │
//! │  ├─ Walk enabled policies by priority        │
//! │  ├─ First matching rule decides a policy     │
//! │  ├─ First applicable policy decides request  │
//! │  └─ No applicable policy => Deny             │
//! └─────────────────┬───────────────────────────┘
//!                   │
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  Decision                                    │
//! │  - Effect (Allow/Deny)                       │
//! │  - Per-policy trace + matched rule           │
//! │  - default_applied flag                      │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Evaluation is fail-closed and total: missing attributes, unsupported
//! operators, type mismatches, and invalid regex patterns all degrade to
//! a non-match (logged), never to an error or a panic.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use serde_json::json;
//! use warden_abac::{
//!     Condition, ConditionOperator, Effect, EvaluationContext, Policy,
//!     PolicyEvaluator, PolicyRule, PolicyStore,
//! };
//! use warden_types::{ResourceRef, UserId};
//!
//! let store = Arc::new(PolicyStore::new());
//! store
//!     .create_policy(
//!         Policy::new("business-hours", "Reads only 9-17 UTC", 50, UserId::from("admin"))
//!             .with_rule(
//!                 PolicyRule::new("in-hours", Effect::Allow)
//!                     .with_condition(Condition::new(
//!                         "environment.hour",
//!                         ConditionOperator::Gte,
//!                         json!(9),
//!                     ))
//!                     .with_condition(Condition::new(
//!                         "environment.hour",
//!                         ConditionOperator::Lt,
//!                         json!(17),
//!                     )),
//!             ),
//!     )
//!     .unwrap();
//!
//! let evaluator = PolicyEvaluator::new(store);
//! let ctx = EvaluationContext::new(
//!     UserId::from("u-1"),
//!     "read",
//!     ResourceRef::new("report", "r-1"),
//! );
//! let decision = evaluator.evaluate(&ctx);
//! // Allowed only if the current UTC hour is in [9, 17).
//! ```

pub mod attributes;
pub mod evaluator;
pub mod policy;
pub mod store;

pub use attributes::{
    AttributeProvider, AttributeSet, EnvironmentProvider, EvaluationContext, ProviderRegistry,
    ResourceProvider, TimeProvider, UserProvider,
};
pub use evaluator::{Decision, PolicyEvaluator, PolicyOutcome, PolicyResult};
pub use policy::{Condition, ConditionOperator, Effect, Policy, PolicyRule};
pub use store::{PolicyStore, PolicyUpdate};
