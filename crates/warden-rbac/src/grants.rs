//! Time-bounded, resource-scoped permission grants.
//!
//! A grant gives one user extra permissions on one concrete resource,
//! independent of role membership, optionally until an expiry instant.
//! Expiry is lazy: an expired entry never satisfies a check even before
//! the periodic sweep removes it.
//!
//! Entries for one resource live in a single versioned list behind the
//! [`Store`] seam. The sweep uses compare-and-remove (version tokens) so
//! it can run concurrently with `grant`/`revoke` without ever discarding
//! an entry that was concurrently re-granted or extended.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use warden_store::{MemoryStore, Store, StoreError, Versioned};
use warden_types::{AccessError, Permission, ResourceRef, Result, UserId};

const MAX_RETRIES: usize = 16;

// ============================================================================
// ResourcePermission
// ============================================================================

/// One grant entry: permissions for a user on a resource, with optional expiry.
///
/// Multiple entries may coexist for the same `(user, resource)` pair;
/// grants append rather than merge so each retains its own expiry and
/// provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePermission {
    /// Unique entry id.
    pub id: Uuid,
    pub user_id: UserId,
    pub resource: ResourceRef,
    pub permissions: BTreeSet<Permission>,
    /// Who issued the grant (for the audit trail).
    pub granted_by: UserId,
    pub granted_at: DateTime<Utc>,
    /// `None` means the grant never expires.
    pub expires_at: Option<DateTime<Utc>>,
}

impl ResourcePermission {
    /// Whether the entry is active at `now`. Absent expiry means active.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|e| e > now)
    }
}

// ============================================================================
// ResourcePermissionStore
// ============================================================================

/// Per-resource grant lists with lazy expiry and a versioned sweep.
pub struct ResourcePermissionStore {
    entries: Arc<dyn Store<Vec<ResourcePermission>>>,
}

impl ResourcePermissionStore {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    pub fn with_store(entries: Arc<dyn Store<Vec<ResourcePermission>>>) -> Self {
        Self { entries }
    }

    fn key(resource: &ResourceRef) -> String {
        format!("{}/{}", resource.resource_type, resource.resource_id)
    }

    /// Issues a new grant entry. Always appends; prior entries for the
    /// same user and resource are left untouched.
    pub fn grant(
        &self,
        user_id: &UserId,
        resource: &ResourceRef,
        permissions: impl IntoIterator<Item = Permission>,
        granted_by: &UserId,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<ResourcePermission> {
        let permissions: BTreeSet<Permission> = permissions.into_iter().collect();
        if permissions.is_empty() {
            return Err(AccessError::validation(
                "a grant must carry at least one permission",
            ));
        }

        let entry = ResourcePermission {
            id: Uuid::new_v4(),
            user_id: user_id.clone(),
            resource: resource.clone(),
            permissions,
            granted_by: granted_by.clone(),
            granted_at: Utc::now(),
            expires_at,
        };

        let key = Self::key(resource);
        for _ in 0..MAX_RETRIES {
            match self.entries.get(&key)? {
                Some(Versioned { value: mut list, version }) => {
                    list.push(entry.clone());
                    match self.entries.put(&key, list, Some(version)) {
                        Ok(_) => {
                            info!(user = %user_id, resource = %resource, "grant issued");
                            return Ok(entry);
                        }
                        Err(StoreError::VersionConflict { .. }) => continue,
                        Err(e) => return Err(e.into()),
                    }
                }
                None => match self.entries.put(&key, vec![entry.clone()], None) {
                    Ok(_) => {
                        info!(user = %user_id, resource = %resource, "grant issued");
                        return Ok(entry);
                    }
                    Err(StoreError::VersionConflict { .. }) => continue,
                    Err(e) => return Err(e.into()),
                },
            }
        }
        Err(AccessError::Store(StoreError::Backend(format!(
            "grant on '{key}' kept conflicting after {MAX_RETRIES} attempts"
        ))))
    }

    /// Subtracts `permissions` from every entry the user holds on the
    /// resource. Entries left empty are deleted. Revoking permissions the
    /// user never held is a no-op success.
    pub fn revoke(
        &self,
        user_id: &UserId,
        resource: &ResourceRef,
        permissions: impl IntoIterator<Item = Permission> + Clone,
    ) -> Result<()> {
        let key = Self::key(resource);
        for _ in 0..MAX_RETRIES {
            let Some(Versioned { value: list, version }) = self.entries.get(&key)? else {
                return Ok(());
            };

            let revoked: BTreeSet<Permission> = permissions.clone().into_iter().collect();
            let mut changed = false;
            let mut retained: Vec<ResourcePermission> = Vec::with_capacity(list.len());
            for mut entry in list {
                if entry.user_id == *user_id {
                    let before = entry.permissions.len();
                    entry.permissions.retain(|p| !revoked.contains(p));
                    if entry.permissions.len() != before {
                        changed = true;
                    }
                    if entry.permissions.is_empty() {
                        changed = true;
                        continue;
                    }
                }
                retained.push(entry);
            }

            if !changed {
                return Ok(());
            }

            // A refused compare-and-remove means the key moved since the
            // read; re-read and subtract again so the revoke lands on the
            // current entry list.
            let written = if retained.is_empty() {
                self.entries.delete_if(&key, version)?
            } else {
                match self.entries.put(&key, retained, Some(version)) {
                    Ok(_) => true,
                    Err(StoreError::VersionConflict { .. }) => false,
                    Err(e) => return Err(e.into()),
                }
            };
            if written {
                info!(user = %user_id, resource = %resource, "grant revoked");
                return Ok(());
            }
        }
        Err(AccessError::Store(StoreError::Backend(format!(
            "revoke on '{key}' kept conflicting after {MAX_RETRIES} attempts"
        ))))
    }

    /// Whether the user holds `permission` on the resource through any
    /// non-expired entry.
    pub fn has_resource_permission(
        &self,
        user_id: &UserId,
        resource: &ResourceRef,
        permission: Permission,
        now: DateTime<Utc>,
    ) -> bool {
        self.list_active(user_id, resource, now)
            .iter()
            .any(|entry| entry.permissions.contains(&permission))
    }

    /// Active (non-expired) entries for the user on the resource.
    ///
    /// Read failures degrade to an empty list: a broken backend must fail
    /// closed, never grant.
    pub fn list_active(
        &self,
        user_id: &UserId,
        resource: &ResourceRef,
        now: DateTime<Utc>,
    ) -> Vec<ResourcePermission> {
        let key = Self::key(resource);
        match self.entries.get(&key) {
            Ok(Some(v)) => v
                .value
                .into_iter()
                .filter(|e| e.user_id == *user_id && e.is_active(now))
                .collect(),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(resource = %resource, error = %e, "grant lookup failed; treating as no grants");
                Vec::new()
            }
        }
    }

    /// Removes entries whose expiry has passed. Returns the number removed.
    ///
    /// Compare-and-remove: each key is rewritten only if its version is
    /// unchanged since the expired entries were selected. A key that
    /// moved on (concurrent grant/revoke) is skipped and left for the
    /// next sweep, so a refreshed grant is never lost.
    pub fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut removed = 0;

        for (key, Versioned { value: list, version }) in self.entries.list()? {
            let retained: Vec<ResourcePermission> =
                list.iter().filter(|e| e.is_active(now)).cloned().collect();
            let expired = list.len() - retained.len();
            if expired == 0 {
                continue;
            }

            let swept = if retained.is_empty() {
                self.entries.delete_if(&key, version)?
            } else {
                match self.entries.put(&key, retained, Some(version)) {
                    Ok(_) => true,
                    Err(StoreError::VersionConflict { .. }) => false,
                    Err(e) => return Err(e.into()),
                }
            };

            if swept {
                removed += expired;
            } else {
                debug!(key = %key, "sweep skipped key with concurrent writes");
            }
        }

        if removed > 0 {
            info!(removed, "expired grants removed");
        }
        Ok(removed)
    }
}

impl Default for ResourcePermissionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ids() -> (UserId, UserId, ResourceRef) {
        (
            UserId::from("u-1"),
            UserId::from("admin"),
            ResourceRef::new("report", "sales-q3"),
        )
    }

    #[test]
    fn test_grant_and_check() {
        let store = ResourcePermissionStore::new();
        let (user, admin, resource) = ids();
        let now = Utc::now();

        store
            .grant(&user, &resource, [Permission::ReportRead], &admin, None)
            .unwrap();

        assert!(store.has_resource_permission(&user, &resource, Permission::ReportRead, now));
        assert!(!store.has_resource_permission(&user, &resource, Permission::ReportDelete, now));

        // Different user, same resource.
        let other = UserId::from("u-2");
        assert!(!store.has_resource_permission(&other, &resource, Permission::ReportRead, now));
    }

    #[test]
    fn test_empty_grant_rejected() {
        let store = ResourcePermissionStore::new();
        let (user, admin, resource) = ids();
        let err = store.grant(&user, &resource, [], &admin, None).unwrap_err();
        assert!(matches!(err, AccessError::Validation { .. }));
    }

    #[test]
    fn test_grants_append_without_merging() {
        let store = ResourcePermissionStore::new();
        let (user, admin, resource) = ids();
        let now = Utc::now();

        store
            .grant(&user, &resource, [Permission::ReportRead], &admin, None)
            .unwrap();
        store
            .grant(
                &user,
                &resource,
                [Permission::ReportExport],
                &admin,
                Some(now + Duration::hours(1)),
            )
            .unwrap();

        assert_eq!(store.list_active(&user, &resource, now).len(), 2);
    }

    #[test]
    fn test_expired_entry_never_satisfies_check() {
        let store = ResourcePermissionStore::new();
        let (user, admin, resource) = ids();
        let now = Utc::now();

        store
            .grant(
                &user,
                &resource,
                [Permission::ReportRead],
                &admin,
                Some(now - Duration::minutes(1)),
            )
            .unwrap();

        // Expired before any sweep ran.
        assert!(!store.has_resource_permission(&user, &resource, Permission::ReportRead, now));
        assert!(store.list_active(&user, &resource, now).is_empty());
    }

    #[test]
    fn test_revoke_subset_keeps_entry_and_expiry() {
        let store = ResourcePermissionStore::new();
        let (user, admin, resource) = ids();
        let now = Utc::now();
        let expiry = now + Duration::hours(2);

        store
            .grant(
                &user,
                &resource,
                [Permission::ReportRead, Permission::ReportExport],
                &admin,
                Some(expiry),
            )
            .unwrap();

        store
            .revoke(&user, &resource, [Permission::ReportExport])
            .unwrap();

        let active = store.list_active(&user, &resource, now);
        assert_eq!(active.len(), 1);
        assert!(active[0].permissions.contains(&Permission::ReportRead));
        // Original expiry preserved on partial revoke.
        assert_eq!(active[0].expires_at, Some(expiry));
    }

    #[test]
    fn test_revoke_all_deletes_entry() {
        let store = ResourcePermissionStore::new();
        let (user, admin, resource) = ids();
        let now = Utc::now();

        store
            .grant(&user, &resource, [Permission::ReportRead], &admin, None)
            .unwrap();
        store
            .revoke(&user, &resource, [Permission::ReportRead])
            .unwrap();

        assert!(store.list_active(&user, &resource, now).is_empty());
    }

    #[test]
    fn test_revoke_is_idempotent() {
        let store = ResourcePermissionStore::new();
        let (user, _, resource) = ids();

        // Nothing granted; revoke succeeds and changes nothing.
        store
            .revoke(&user, &resource, [Permission::ReportRead])
            .unwrap();
        store
            .revoke(&user, &resource, [Permission::ReportRead])
            .unwrap();
    }

    #[test]
    fn test_cleanup_removes_only_expired() {
        let store = ResourcePermissionStore::new();
        let (user, admin, resource) = ids();
        let now = Utc::now();

        store
            .grant(
                &user,
                &resource,
                [Permission::ReportRead],
                &admin,
                Some(now - Duration::minutes(5)),
            )
            .unwrap();
        store
            .grant(&user, &resource, [Permission::ReportExport], &admin, None)
            .unwrap();

        let removed = store.cleanup_expired(now).unwrap();
        assert_eq!(removed, 1);

        let active = store.list_active(&user, &resource, now);
        assert_eq!(active.len(), 1);
        assert!(active[0].permissions.contains(&Permission::ReportExport));

        // Second sweep finds nothing.
        assert_eq!(store.cleanup_expired(now).unwrap(), 0);
    }

    #[test]
    fn test_cleanup_spares_concurrently_refreshed_key() {
        // Simulates the race: select expired entries at version v, then a
        // concurrent grant moves the key to v+1 before the sweep rewrites
        // it. delete_if/put(expected) must refuse and the fresh grant
        // must survive.
        let store = ResourcePermissionStore::new();
        let (user, admin, resource) = ids();
        let now = Utc::now();

        store
            .grant(
                &user,
                &resource,
                [Permission::ReportRead],
                &admin,
                Some(now - Duration::minutes(1)),
            )
            .unwrap();

        // Capture the pre-refresh version the way the sweep would.
        let key = ResourcePermissionStore::key(&resource);
        let stale = store.entries.get(&key).unwrap().unwrap();

        // Concurrent refresh.
        store
            .grant(
                &user,
                &resource,
                [Permission::ReportRead],
                &admin,
                Some(now + Duration::hours(1)),
            )
            .unwrap();

        // The stale compare-and-remove must not fire.
        assert!(!store.entries.delete_if(&key, stale.version).unwrap());
        assert!(store.has_resource_permission(&user, &resource, Permission::ReportRead, now));

        // A real sweep removes exactly the expired entry and keeps the fresh one.
        assert_eq!(store.cleanup_expired(now).unwrap(), 1);
        assert!(store.has_resource_permission(&user, &resource, Permission::ReportRead, now));
    }

    #[test]
    fn test_revoke_retries_when_key_refreshed_concurrently() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicBool, Ordering};

        // Backend that appends one extra entry behind the caller's back on
        // the first read, so the snapshot revoke works from is stale by
        // the time it writes. The revoke must notice the refused
        // compare-and-remove, re-read, and subtract from the current list.
        struct RacingStore {
            inner: MemoryStore<Vec<ResourcePermission>>,
            raced: AtomicBool,
            extra: ResourcePermission,
        }

        impl Store<Vec<ResourcePermission>> for RacingStore {
            fn get(&self, key: &str) -> warden_store::Result<Option<Versioned<Vec<ResourcePermission>>>> {
                let snapshot = self.inner.get(key)?;
                if let Some(v) = &snapshot
                    && !self.raced.swap(true, Ordering::SeqCst)
                {
                    let mut list = v.value.clone();
                    list.push(self.extra.clone());
                    self.inner.put(key, list, Some(v.version))?;
                }
                Ok(snapshot)
            }

            fn put(
                &self,
                key: &str,
                value: Vec<ResourcePermission>,
                expected: Option<warden_store::Version>,
            ) -> warden_store::Result<warden_store::Version> {
                self.inner.put(key, value, expected)
            }

            fn delete(&self, key: &str) -> warden_store::Result<bool> {
                self.inner.delete(key)
            }

            fn delete_if(
                &self,
                key: &str,
                expected: warden_store::Version,
            ) -> warden_store::Result<bool> {
                self.inner.delete_if(key, expected)
            }

            fn list(&self) -> warden_store::Result<Vec<(String, Versioned<Vec<ResourcePermission>>)>> {
                self.inner.list()
            }
        }

        let (user, admin, resource) = ids();
        let extra = ResourcePermission {
            id: Uuid::new_v4(),
            user_id: user.clone(),
            resource: resource.clone(),
            permissions: [Permission::ReportExport].into_iter().collect(),
            granted_by: admin.clone(),
            granted_at: Utc::now(),
            expires_at: None,
        };
        let store = ResourcePermissionStore::with_store(Arc::new(RacingStore {
            inner: MemoryStore::new(),
            raced: AtomicBool::new(false),
            extra,
        }));

        store
            .grant(&user, &resource, [Permission::ReportRead], &admin, None)
            .unwrap();

        // First revoke read triggers the concurrent refresh; the stale
        // write is refused and the retry lands on the refreshed list.
        store
            .revoke(&user, &resource, [Permission::ReportRead])
            .unwrap();

        let now = Utc::now();
        assert!(!store.has_resource_permission(&user, &resource, Permission::ReportRead, now));
        // The concurrently issued grant survives the revoke.
        assert!(store.has_resource_permission(&user, &resource, Permission::ReportExport, now));
    }
}
