//! Per-caller credential resolution.
//!
//! When several isolated identities share one privileged executor, the
//! executor's ambient cookie store belongs to none of them. The
//! [`CredentialResolver`] looks up the jar of the calling tab's own store so
//! the request builder can attach it explicitly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::{CallerIdentity, CookieStoreId, Credential, CredentialJar, Descriptor};

/// The credential source could not list a store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("cookie store '{store}' is not available")]
    UnknownStore { store: CookieStoreId },

    #[error("failed to list cookie store '{store}': {message}")]
    Lookup {
        store: CookieStoreId,
        message: String,
    },
}

/// External capability that lists stored credentials per identity.
///
/// The resolver only reads; it never creates, updates or deletes entries.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn list(&self, store: &CookieStoreId) -> Result<Vec<Credential>, CredentialError>;
}

/// Whether per-caller credential injection is available at all.
///
/// Decided once, when the resolver is built, rather than checked against the
/// environment on every call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CredentialPolicy {
    /// The host supports multiple isolated identities (containers).
    pub isolated_identities: bool,
}

impl CredentialPolicy {
    pub fn isolated() -> Self {
        Self {
            isolated_identities: true,
        }
    }

    pub fn shared() -> Self {
        Self {
            isolated_identities: false,
        }
    }
}

/// Decides whether to fetch an explicit jar for a call.
#[derive(Clone)]
pub struct CredentialResolver {
    policy: CredentialPolicy,
    store: Option<Arc<dyn CredentialStore>>,
}

impl CredentialResolver {
    pub fn new(policy: CredentialPolicy, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            policy,
            store: Some(store),
        }
    }

    /// A resolver that never injects credentials.
    pub fn disabled() -> Self {
        Self {
            policy: CredentialPolicy::shared(),
            store: None,
        }
    }

    pub fn policy(&self) -> CredentialPolicy {
        self.policy
    }

    /// Returns the caller's jar, or `None` to fall back to the ambient store.
    ///
    /// A jar is fetched only when the policy allows isolated identities, the
    /// descriptor has not opted out, and the caller's tab names a cookie store.
    /// Lookups are never cached.
    ///
    /// # Errors
    ///
    /// Propagates the [`CredentialStore`] failure.
    pub async fn resolve(
        &self,
        descriptor: &Descriptor,
        caller: Option<&CallerIdentity>,
    ) -> Result<Option<CredentialJar>, CredentialError> {
        if !self.policy.isolated_identities || !descriptor.use_credential_jar() {
            return Ok(None);
        }
        let Some(store_id) = caller.and_then(CallerIdentity::cookie_store_id) else {
            return Ok(None);
        };
        let Some(store) = &self.store else {
            return Ok(None);
        };

        let entries = store.list(store_id).await?;
        tracing::debug!(store = %store_id, count = entries.len(), "resolved credential jar");
        Ok(Some(CredentialJar::new(entries)))
    }
}

impl std::fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("policy", &self.policy)
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// A fixed set of jars keyed by store id, loaded up front.
///
/// Unknown stores are reported as [`CredentialError::UnknownStore`].
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    stores: HashMap<CookieStoreId, Vec<Credential>>,
    lookups: AtomicUsize,
}

impl MemoryCredentialStore {
    pub fn new(stores: HashMap<CookieStoreId, Vec<Credential>>) -> Self {
        Self {
            stores,
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn with_store(mut self, store: CookieStoreId, entries: Vec<Credential>) -> Self {
        self.stores.insert(store, entries);
        self
    }

    /// How many times [`CredentialStore::list`] has been called.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn list(&self, store: &CookieStoreId) -> Result<Vec<Credential>, CredentialError> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.stores
            .get(store)
            .cloned()
            .ok_or_else(|| CredentialError::UnknownStore {
                store: store.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TabId;

    fn container(n: u64) -> CookieStoreId {
        CookieStoreId::new(format!("firefox-container-{n}")).unwrap()
    }

    fn store() -> Arc<MemoryCredentialStore> {
        Arc::new(
            MemoryCredentialStore::default()
                .with_store(container(1), vec![Credential::new("SESSDATA", "one")])
                .with_store(container(2), vec![Credential::new("SESSDATA", "two")]),
        )
    }

    fn descriptor() -> Descriptor {
        Descriptor::get("https://api.example.com/feed")
    }

    #[tokio::test]
    async fn isolated_policy_fetches_the_callers_jar() {
        let resolver = CredentialResolver::new(CredentialPolicy::isolated(), store());
        let caller = CallerIdentity::in_store(TabId::new(3), container(2));

        let jar = resolver
            .resolve(&descriptor(), Some(&caller))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(jar.header_value(), "SESSDATA=two");
    }

    #[tokio::test]
    async fn shared_policy_never_looks_up() {
        let store = store();
        let resolver = CredentialResolver::new(CredentialPolicy::shared(), store.clone());
        let caller = CallerIdentity::in_store(TabId::new(3), container(1));

        assert!(resolver
            .resolve(&descriptor(), Some(&caller))
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.lookups(), 0);
    }

    #[tokio::test]
    async fn opted_out_descriptor_never_looks_up() {
        let store = store();
        let resolver = CredentialResolver::new(CredentialPolicy::isolated(), store.clone());
        let caller = CallerIdentity::in_store(TabId::new(3), container(1));

        let jar = resolver
            .resolve(&descriptor().without_credential_jar(), Some(&caller))
            .await
            .unwrap();
        assert!(jar.is_none());
        assert_eq!(store.lookups(), 0);
    }

    #[tokio::test]
    async fn caller_without_store_falls_back_to_ambient() {
        let resolver = CredentialResolver::new(CredentialPolicy::isolated(), store());
        assert!(resolver.resolve(&descriptor(), None).await.unwrap().is_none());
        assert!(resolver
            .resolve(&descriptor(), Some(&CallerIdentity::default()))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn every_resolution_is_a_fresh_lookup() {
        let store = store();
        let resolver = CredentialResolver::new(CredentialPolicy::isolated(), store.clone());
        let caller = CallerIdentity::in_store(TabId::new(3), container(1));

        resolver.resolve(&descriptor(), Some(&caller)).await.unwrap();
        resolver.resolve(&descriptor(), Some(&caller)).await.unwrap();
        assert_eq!(store.lookups(), 2);
    }

    #[tokio::test]
    async fn unknown_store_is_an_error() {
        let resolver = CredentialResolver::new(CredentialPolicy::isolated(), store());
        let caller = CallerIdentity::in_store(TabId::new(3), container(9));
        let err = resolver
            .resolve(&descriptor(), Some(&caller))
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::UnknownStore { .. }));
    }
}
