use super::entry::{CacheEntry, FetchError, KeyState, Outcome};
use super::registry::{Claim, InFlightHandle, InFlightRegistry};
use super::store::CacheStore;
use crate::transport::Transport;
use futures::FutureExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Counters for monitoring coalescing effectiveness
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FetchMetrics {
    pub transport_calls: u64,
    pub cache_hits: u64,
    pub joined: u64,
    pub failures: u64,
}

#[derive(Debug, Default)]
struct MetricCounters {
    transport_calls: AtomicU64,
    cache_hits: AtomicU64,
    joined: AtomicU64,
    failures: AtomicU64,
}

impl MetricCounters {
    fn snapshot(&self) -> FetchMetrics {
        FetchMetrics {
            transport_calls: self.transport_calls.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            joined: self.joined.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.transport_calls.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.joined.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
    }
}

/// Starts, joins, or skips the fetch for a key, and settles results into the store.
///
/// At most one fetch per key is in flight at any instant. The fetch runs on its
/// own task, so it completes and settles even if every caller stops waiting.
#[derive(Clone)]
pub struct FetchCoordinator {
    store: Arc<CacheStore>,
    registry: Arc<InFlightRegistry>,
    transport: Arc<dyn Transport>,
    metrics: Arc<MetricCounters>,
}

impl FetchCoordinator {
    #[must_use]
    pub fn new(store: Arc<CacheStore>, transport: Arc<dyn Transport>) -> Self {
        Self {
            store,
            registry: Arc::new(InFlightRegistry::new()),
            transport,
            metrics: Arc::new(MetricCounters::default()),
        }
    }

    #[must_use]
    pub const fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Resolve `key` to its settled outcome, fetching at most once.
    ///
    /// A settled key is a pure read. A pending key is joined. Otherwise this
    /// caller claims the key and issues the transport call.
    ///
    /// # Panics
    ///
    /// Panics if a fetch must be started outside a tokio runtime.
    pub async fn ensure(&self, key: &str) -> Outcome {
        if let Some(outcome) = self.store.get(key).and_then(|e| e.outcome()) {
            self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
            return outcome;
        }

        let claim = self.registry.claim_or_join(
            key,
            || self.store.get(key).and_then(|e| e.outcome()),
            || self.start_fetch(key),
        );

        match claim {
            Claim::Settled(outcome) => {
                self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
                outcome
            }
            Claim::Joined(handle) => {
                self.metrics.joined.fetch_add(1, Ordering::Relaxed);
                handle.await
            }
            Claim::Claimed(handle) => handle.await,
        }
    }

    /// Populate the store for `key` ahead of any subscriber.
    ///
    /// # Errors
    ///
    /// Returns the settled error for `key`; it is stored either way.
    pub async fn preload(&self, key: &str) -> Result<(), FetchError> {
        self.ensure(key).await.map(|_| ())
    }

    #[must_use]
    pub fn state(&self, key: &str) -> KeyState {
        if self.registry.contains(key) {
            return KeyState::Pending;
        }
        match self.store.get(key) {
            Some(entry) if entry.has_data() => KeyState::Resolved,
            Some(entry) if entry.is_settled() => KeyState::Failed,
            _ => KeyState::Empty,
        }
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.registry.len()
    }

    #[must_use]
    pub fn metrics(&self) -> FetchMetrics {
        self.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    // Called with the registry lock held; the spawned task cannot release
    // the key before the handle is inserted.
    fn start_fetch(&self, key: &str) -> InFlightHandle {
        let key = key.to_string();
        let store = self.store.clone();
        let registry = self.registry.clone();
        let transport = self.transport.clone();
        let metrics = self.metrics.clone();

        metrics.transport_calls.fetch_add(1, Ordering::Relaxed);

        let task_key = key.clone();
        let task = tokio::spawn(async move {
            let start = Instant::now();
            info!("FETCH START: {}", task_key);

            let outcome = fetch_outcome(transport.as_ref(), &task_key).await;

            let elapsed = start.elapsed();
            match &outcome {
                Ok(_) => info!(
                    "FETCH SUCCESS: {} ({:.2}s)",
                    task_key,
                    elapsed.as_secs_f64()
                ),
                Err(e) => {
                    metrics.failures.fetch_add(1, Ordering::Relaxed);
                    warn!("FETCH FAILED: {} ({:.2}s): {}", task_key, elapsed.as_secs_f64(), e);
                }
            }

            // Store first, then release: see InFlightRegistry::claim_or_join
            store.put(&task_key, CacheEntry::from_outcome(&outcome));
            registry.release(&task_key);
            outcome
        });

        let registry = self.registry.clone();
        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    // The task never settled; return the key to Empty
                    registry.release(&key);
                    Err(FetchError::transport(format!("fetch task failed: {e}")))
                }
            }
        }
        .boxed()
        .shared()
    }
}

impl std::fmt::Debug for FetchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCoordinator")
            .field("store", &self.store)
            .field("registry", &self.registry)
            .field("metrics", &self.metrics.snapshot())
            .finish_non_exhaustive()
    }
}

async fn fetch_outcome(transport: &dyn Transport, url: &str) -> Outcome {
    let response = transport.fetch(url).await?;

    if !response.is_success() {
        return Err(FetchError::status(response.status));
    }

    debug!("Decoding {} bytes from {}", response.body.len(), url);
    Ok(serde_json::from_slice(&response.body)?)
}
