//! Attribute gathering for ABAC evaluation.
//!
//! Attributes are namespaced facts (`user.*`, `resource.*`,
//! `environment.*`, `action.*`) assembled per evaluation into an
//! ephemeral [`AttributeSet`]. Providers are pure: any I/O needed to
//! populate user/resource/request data happens in the caller before
//! evaluation, never inside a provider.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde_json::{Map, Value, json};

use warden_types::{ResourceRef, UserId};

// ============================================================================
// AttributeSet
// ============================================================================

/// Flat map of `namespace.key` paths to JSON values, built per
/// evaluation and discarded with it. Never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeSet {
    values: BTreeMap<String, Value>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value at `namespace.key`, replacing any prior value.
    pub fn insert(&mut self, namespace: &str, key: &str, value: Value) {
        self.values.insert(format!("{namespace}.{key}"), value);
    }

    /// Inserts a value at a pre-joined path.
    pub fn insert_path(&mut self, path: impl Into<String>, value: Value) {
        self.values.insert(path.into(), value);
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.values.get(path)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Merges `other` into `self`; later providers win on path clashes.
    pub fn merge(&mut self, other: AttributeSet) {
        self.values.extend(other.values);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

// ============================================================================
// EvaluationContext
// ============================================================================

/// Everything the caller knows about one access request.
///
/// The caller resolves identity, resource metadata, and request context
/// (including any lookups requiring I/O) before building this; the
/// evaluator itself is pure and synchronous.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    pub user_id: UserId,
    /// The action being attempted, e.g. `"read"`, `"export"`.
    pub action: String,
    pub resource: ResourceRef,
    /// Identity/profile facts, surfaced as `user.*`.
    pub user_data: Map<String, Value>,
    /// Resource metadata, surfaced as `resource.*`.
    pub resource_data: Map<String, Value>,
    /// Request environment (IP, country, network), surfaced as
    /// `environment.*`.
    pub request_context: Map<String, Value>,
    /// Evaluation instant; injectable for deterministic tests.
    pub now: DateTime<Utc>,
}

impl EvaluationContext {
    pub fn new(user_id: UserId, action: impl Into<String>, resource: ResourceRef) -> Self {
        Self {
            user_id,
            action: action.into(),
            resource,
            user_data: Map::new(),
            resource_data: Map::new(),
            request_context: Map::new(),
            now: Utc::now(),
        }
    }

    pub fn with_user_data(mut self, data: Map<String, Value>) -> Self {
        self.user_data = data;
        self
    }

    pub fn with_resource_data(mut self, data: Map<String, Value>) -> Self {
        self.resource_data = data;
        self
    }

    pub fn with_request_context(mut self, data: Map<String, Value>) -> Self {
        self.request_context = data;
        self
    }

    /// Pins the evaluation instant.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

// ============================================================================
// AttributeProvider
// ============================================================================

/// A pure function from context to namespaced facts.
pub trait AttributeProvider: Send + Sync {
    fn provide(&self, ctx: &EvaluationContext) -> AttributeSet;
}

/// `environment.time/hour/day_of_week/date` from the evaluation instant.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimeProvider;

impl AttributeProvider for TimeProvider {
    fn provide(&self, ctx: &EvaluationContext) -> AttributeSet {
        let mut attrs = AttributeSet::new();
        attrs.insert("environment", "time", json!(ctx.now.to_rfc3339()));
        attrs.insert("environment", "hour", json!(ctx.now.hour()));
        attrs.insert(
            "environment",
            "day_of_week",
            json!(ctx.now.weekday().to_string()),
        );
        attrs.insert(
            "environment",
            "date",
            json!(ctx.now.date_naive().to_string()),
        );
        attrs
    }
}

/// `user.id` plus every caller-supplied profile fact under `user.*`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UserProvider;

impl AttributeProvider for UserProvider {
    fn provide(&self, ctx: &EvaluationContext) -> AttributeSet {
        let mut attrs = AttributeSet::new();
        attrs.insert("user", "id", json!(ctx.user_id.as_str()));
        for (key, value) in &ctx.user_data {
            attrs.insert("user", key, value.clone());
        }
        attrs
    }
}

/// `resource.type`/`resource.id` plus metadata under `resource.*`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResourceProvider;

impl AttributeProvider for ResourceProvider {
    fn provide(&self, ctx: &EvaluationContext) -> AttributeSet {
        let mut attrs = AttributeSet::new();
        attrs.insert("resource", "type", json!(ctx.resource.resource_type));
        attrs.insert("resource", "id", json!(ctx.resource.resource_id));
        for (key, value) in &ctx.resource_data {
            attrs.insert("resource", key, value.clone());
        }
        attrs
    }
}

/// Request-context facts (IP, country, network) under `environment.*`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvironmentProvider;

impl AttributeProvider for EnvironmentProvider {
    fn provide(&self, ctx: &EvaluationContext) -> AttributeSet {
        let mut attrs = AttributeSet::new();
        for (key, value) in &ctx.request_context {
            attrs.insert("environment", key, value.clone());
        }
        attrs
    }
}

// ============================================================================
// ProviderRegistry
// ============================================================================

/// Named providers, run in registration order on every evaluation.
///
/// Registering an existing name replaces the provider, so a host can
/// override a default (e.g. a tenant-timezone-aware time provider).
pub struct ProviderRegistry {
    providers: Vec<(String, Arc<dyn AttributeProvider>)>,
}

impl ProviderRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// The four default providers: time, user, resource, environment.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("time", Arc::new(TimeProvider));
        registry.register("user", Arc::new(UserProvider));
        registry.register("resource", Arc::new(ResourceProvider));
        registry.register("environment", Arc::new(EnvironmentProvider));
        registry
    }

    /// Registers (or replaces) a provider under `name`.
    pub fn register(&mut self, name: &str, provider: Arc<dyn AttributeProvider>) {
        if let Some(slot) = self.providers.iter_mut().find(|(n, _)| n == name) {
            slot.1 = provider;
        } else {
            self.providers.push((name.to_string(), provider));
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Runs every provider over the context and merges the results.
    pub fn gather(&self, ctx: &EvaluationContext) -> AttributeSet {
        let mut attrs = AttributeSet::new();
        for (_, provider) in &self.providers {
            attrs.merge(provider.provide(ctx));
        }
        attrs
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
