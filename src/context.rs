/**
Per-context cache bundle for `fetchcache`

One `CacheContext` belongs to one execution context (a server request, a
page load). It owns the store, the coordinator, and the subscription adapter,
so separate contexts never share state.
*/
use crate::cache::{codec, CacheStore, FetchCoordinator, FetchError, KeyState, Outcome};
use crate::config::CacheConfig;
use crate::error::Result;
use crate::subscription::{FetchState, Subscription, SubscriptionAdapter};
use crate::transport::{HttpTransport, Transport};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct CacheContext {
    store: Arc<CacheStore>,
    coordinator: FetchCoordinator,
    adapter: SubscriptionAdapter,
}

impl CacheContext {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let store = Arc::new(CacheStore::new());
        let coordinator = FetchCoordinator::new(store.clone(), transport);
        let adapter = SubscriptionAdapter::new(store.clone(), coordinator.clone());

        Self {
            store,
            coordinator,
            adapter,
        }
    }

    /// Context backed by a real HTTP transport
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn http(config: &CacheConfig) -> Result<Self> {
        let transport = HttpTransport::new(config.user_agent.as_deref())?;
        Ok(Self::new(Arc::new(transport)))
    }

    /// Load a handoff payload produced by another context.
    ///
    /// Must run before the first subscription in this context. A bad payload
    /// is logged and leaves the cache as it was; it never fails startup.
    pub fn hydrate(&self, payload: &str) -> usize {
        codec::hydrate(&self.store, payload).unwrap_or(0)
    }

    /// Encode the settled state of this context for handoff.
    ///
    /// # Errors
    ///
    /// Returns an error if an entry cannot be serialized
    pub fn serialize(&self) -> Result<String> {
        codec::encode(&self.store)
    }

    /// Fetch `key` ahead of rendering.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; the failure is also stored for `key`.
    pub async fn preload(&self, key: &str) -> std::result::Result<(), FetchError> {
        self.coordinator.preload(key).await
    }

    /// Preload several keys concurrently; one failure does not stop the others.
    pub async fn preload_all<I, S>(
        &self,
        keys: I,
    ) -> Vec<(String, std::result::Result<(), FetchError>)>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        let results = join_all(keys.iter().map(|key| self.preload(key))).await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            warn!("Preloaded {} keys, {} failed", keys.len(), failed);
        } else {
            info!("Preloaded {} keys", keys.len());
        }

        keys.into_iter().zip(results).collect()
    }

    pub async fn ensure(&self, key: &str) -> Outcome {
        self.coordinator.ensure(key).await
    }

    /// See [`SubscriptionAdapter::subscribe`].
    #[must_use]
    pub fn subscribe(&self, key: &str) -> (FetchState, Subscription) {
        self.adapter.subscribe(key)
    }

    #[must_use]
    pub fn state(&self, key: &str) -> KeyState {
        self.coordinator.state(key)
    }

    /// Return every key to Empty. In-flight fetches still settle when they finish.
    pub fn wipe(&self) {
        self.store.clear();
    }

    #[must_use]
    pub const fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    #[must_use]
    pub const fn coordinator(&self) -> &FetchCoordinator {
        &self.coordinator
    }

    #[must_use]
    pub const fn subscriptions(&self) -> &SubscriptionAdapter {
        &self.adapter
    }
}
