//! # warden-store: versioned key-value store abstraction
//!
//! The access-control engine keeps every aggregate (role, policy, grant
//! list) behind a small [`Store`] trait so a persistent backend can be
//! substituted without touching evaluation logic.
//!
//! The trait is deliberately narrow: `get`/`put`/`delete`/`list` over
//! string keys, with an optimistic-concurrency [`Version`] token. A `put`
//! carrying an `expected` version fails with
//! [`StoreError::VersionConflict`] if the entry changed underneath the
//! caller, which serializes writes to a single entity while letting
//! writes to different entities proceed concurrently.
//!
//! [`MemoryStore`] is the default backend: a `RwLock<HashMap>` whose
//! readers always observe a complete, un-torn aggregate (values are
//! cloned out under the read lock).

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Version
// ============================================================================

/// Monotonic per-entry version token for optimistic concurrency.
///
/// A fresh entry starts at version 1; every successful `put` increments it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Version(u64);

impl Version {
    pub fn new(v: u64) -> Self {
        Self(v)
    }

    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl From<Version> for u64 {
    fn from(v: Version) -> Self {
        v.0
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The entry changed since it was read; the caller must re-read and retry.
    #[error("version conflict on key '{key}': expected {expected:?}, found {found:?}")]
    VersionConflict {
        key: String,
        expected: Version,
        found: Option<Version>,
    },

    /// An operation addressed a key the backend does not have.
    /// `MemoryStore` reports missing keys through `VersionConflict`;
    /// persistent backends may use this variant directly.
    #[error("key '{0}' not found")]
    KeyNotFound(String),

    /// Backend failure (I/O, connection loss) in a non-memory implementation.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

// ============================================================================
// Versioned
// ============================================================================

/// A stored value together with its version token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub value: T,
    pub version: Version,
}

impl<T> Versioned<T> {
    pub fn new(value: T, version: Version) -> Self {
        Self { value, version }
    }
}

// ============================================================================
// Store trait
// ============================================================================

/// Narrow persistence seam for access-control aggregates.
///
/// Implementations must guarantee:
/// - `get` returns a consistent snapshot of a single entry (no torn reads);
/// - `put` with `Some(expected)` succeeds only if the current version
///   matches, and the version advances on every successful write;
/// - `put` with `None` is an unconditional insert-or-create that fails if
///   the key already exists (creation race detection);
/// - writes to distinct keys do not serialize against each other beyond
///   what the backend requires.
pub trait Store<T: Clone>: Send + Sync {
    /// Reads the entry at `key`, if present.
    fn get(&self, key: &str) -> Result<Option<Versioned<T>>>;

    /// Writes `value` at `key`.
    ///
    /// With `expected = None` the key must not exist (create).
    /// With `expected = Some(v)` the entry must currently be at `v`
    /// (update). Returns the new version.
    fn put(&self, key: &str, value: T, expected: Option<Version>) -> Result<Version>;

    /// Removes the entry at `key`. Returns whether it existed.
    fn delete(&self, key: &str) -> Result<bool>;

    /// Removes the entry at `key` only if it is still at `expected`.
    ///
    /// Returns `Ok(true)` if removed, `Ok(false)` if the key was already
    /// gone or has moved on to a newer version (compare-and-remove).
    fn delete_if(&self, key: &str, expected: Version) -> Result<bool>;

    /// Lists all entries. Ordering is unspecified.
    fn list(&self) -> Result<Vec<(String, Versioned<T>)>>;
}

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory [`Store`] backend over `RwLock<HashMap>`.
#[derive(Debug, Default)]
pub struct MemoryStore<T> {
    entries: RwLock<HashMap<String, Versioned<T>>>,
}

impl<T> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<T: Clone + Send + Sync> Store<T> for MemoryStore<T> {
    fn get(&self, key: &str) -> Result<Option<Versioned<T>>> {
        let entries = self.entries.read().expect("store lock poisoned");
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: T, expected: Option<Version>) -> Result<Version> {
        let mut entries = self.entries.write().expect("store lock poisoned");
        let current = entries.get(key).map(|v| v.version);

        let next = match (expected, current) {
            // Create: key must not exist yet.
            (None, None) => Version::new(1),
            (None, Some(found)) => {
                return Err(StoreError::VersionConflict {
                    key: key.to_string(),
                    expected: Version::default(),
                    found: Some(found),
                });
            }
            // Update: versions must match.
            (Some(exp), Some(found)) if exp == found => found.next(),
            (Some(exp), found) => {
                return Err(StoreError::VersionConflict {
                    key: key.to_string(),
                    expected: exp,
                    found,
                });
            }
        };

        entries.insert(key.to_string(), Versioned::new(value, next));
        Ok(next)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.write().expect("store lock poisoned");
        Ok(entries.remove(key).is_some())
    }

    fn delete_if(&self, key: &str, expected: Version) -> Result<bool> {
        let mut entries = self.entries.write().expect("store lock poisoned");
        match entries.get(key) {
            Some(v) if v.version == expected => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn list(&self) -> Result<Vec<(String, Versioned<T>)>> {
        let entries = self.entries.read().expect("store lock poisoned");
        Ok(entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_then_get() {
        let store = MemoryStore::new();
        let v1 = store.put("a", 10, None).unwrap();
        assert_eq!(u64::from(v1), 1);

        let got = store.get("a").unwrap().unwrap();
        assert_eq!(got.value, 10);
        assert_eq!(got.version, v1);
    }

    #[test]
    fn test_create_twice_conflicts() {
        let store = MemoryStore::new();
        store.put("a", 1, None).unwrap();
        let err = store.put("a", 2, None).unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { .. }));
    }

    #[test]
    fn test_update_requires_matching_version() {
        let store = MemoryStore::new();
        let v1 = store.put("a", 1, None).unwrap();
        let v2 = store.put("a", 2, Some(v1)).unwrap();
        assert!(v2 > v1);

        // Stale token is rejected.
        let err = store.put("a", 3, Some(v1)).unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { .. }));

        // Current token works.
        store.put("a", 3, Some(v2)).unwrap();
        assert_eq!(store.get("a").unwrap().unwrap().value, 3);
    }

    #[test]
    fn test_update_missing_key_conflicts() {
        let store: MemoryStore<i32> = MemoryStore::new();
        let err = store.put("ghost", 1, Some(Version::new(1))).unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionConflict { found: None, .. }
        ));
    }

    #[test]
    fn test_delete() {
        let store = MemoryStore::new();
        store.put("a", 1, None).unwrap();
        assert!(store.delete("a").unwrap());
        assert!(!store.delete("a").unwrap());
        assert!(store.get("a").unwrap().is_none());
    }

    #[test]
    fn test_delete_if_respects_version() {
        let store = MemoryStore::new();
        let v1 = store.put("a", 1, None).unwrap();
        let v2 = store.put("a", 2, Some(v1)).unwrap();

        // Stale version: entry survives.
        assert!(!store.delete_if("a", v1).unwrap());
        assert!(store.get("a").unwrap().is_some());

        // Current version: removed.
        assert!(store.delete_if("a", v2).unwrap());
        assert!(store.get("a").unwrap().is_none());

        // Already gone.
        assert!(!store.delete_if("a", v2).unwrap());
    }

    #[test]
    fn test_list() {
        let store = MemoryStore::new();
        store.put("a", 1, None).unwrap();
        store.put("b", 2, None).unwrap();

        let mut entries = store.list().unwrap();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "a");
        assert_eq!(entries[1].1.value, 2);
    }

    #[test]
    fn test_concurrent_writers_serialize_per_key() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(MemoryStore::new());
        store.put("counter", 0u64, None).unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                // Optimistic read-modify-write loop.
                for _ in 0..100 {
                    loop {
                        let cur = store.get("counter").unwrap().unwrap();
                        let next = cur.value + 1;
                        if store.put("counter", next, Some(cur.version)).is_ok() {
                            break;
                        }
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.get("counter").unwrap().unwrap().value, 800);
    }
}
