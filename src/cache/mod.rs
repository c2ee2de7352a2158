//! TTL-aware response cache with single-flight fetch coalescing.
//!
//! [`ResponseCache`] keeps fetched payloads keyed by [`RequestSignature`] so
//! repeated requests within a polling window never hit the network twice.
//! Concurrent callers for the same signature share one in-flight fetch; the
//! fetch itself runs in a spawned task, so a caller that goes away never
//! cancels the fetch for the remaining waiters.

mod signature;

pub use signature::RequestSignature;

use crate::Result;
use crate::clock::Clock;
use crate::error::Error;
use chrono::{DateTime, Utc};
use core::time::Duration;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

const LOG_TARGET: &str = "     cache";

/// A cached payload with its fetch timestamp and time-to-live.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    fetched_at: DateTime<Utc>,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    /// Whether the entry has outlived its TTL at `now`.
    ///
    /// A fetch timestamp in the future (clock skew) counts as fresh.
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.fetched_at);
        if age.num_seconds() < 0 {
            return false;
        }
        age.to_std().unwrap_or(Duration::MAX) >= self.ttl
    }
}

/// Mutable cache state: stored entries plus the in-flight fetch registry.
struct CacheState<V> {
    entries: HashMap<RequestSignature, CacheEntry<V>>,
    in_flight: HashMap<RequestSignature, broadcast::Sender<Result<V>>>,
}

/// TTL-aware in-memory cache with single-flight coalescing and a size bound.
///
/// Expired entries are detected lazily on lookup and removed by [`sweep`],
/// which also evicts oldest-first once the entry count exceeds the bound.
/// The clock is injected so expiry can be tested deterministically.
///
/// [`sweep`]: Self::sweep
pub struct ResponseCache<V> {
    state: Arc<Mutex<CacheState<V>>>,
    default_ttl: Duration,
    max_entries: usize,
    serve_stale: bool,
    clock: Arc<dyn Clock>,
}

impl<V> Clone for ResponseCache<V> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            default_ttl: self.default_ttl,
            max_entries: self.max_entries,
            serve_stale: self.serve_stale,
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<V> core::fmt::Debug for ResponseCache<V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("default_ttl", &self.default_ttl)
            .field("max_entries", &self.max_entries)
            .field("serve_stale", &self.serve_stale)
            .finish_non_exhaustive()
    }
}

impl<V> ResponseCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache with a default TTL, an entry bound, and an injected clock.
    ///
    /// When `serve_stale` is set, a failed refresh for a signature that still
    /// has an expired entry serves the stale payload instead of the failure.
    #[must_use]
    pub fn new(default_ttl: Duration, max_entries: usize, serve_stale: bool, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
            })),
            default_ttl,
            max_entries,
            serve_stale,
            clock,
        }
    }

    /// Number of entries currently stored, fresh or expired.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().expect("lock not poisoned").entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up `signature`, fetching on a miss with the default TTL.
    ///
    /// See [`get_or_fetch_with_ttl`](Self::get_or_fetch_with_ttl).
    pub async fn get_or_fetch<F, Fut>(&self, signature: RequestSignature, fetch_fn: F) -> Result<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        self.get_or_fetch_with_ttl(signature, self.default_ttl, fetch_fn).await
    }

    /// Look up `signature`; on a live hit the stored payload is returned and
    /// `fetch_fn` is never invoked.
    ///
    /// On a miss, `fetch_fn` runs in a spawned task and its result is stored
    /// with the given `ttl` and fanned out to every caller that coalesced
    /// onto the same signature. At most one fetch is in flight per signature;
    /// distinct signatures fetch independently. A failed fetch stores nothing
    /// and propagates the failure to all coalesced callers, unless the cache
    /// was built with serve-stale and an expired entry is still present.
    pub async fn get_or_fetch_with_ttl<F, Fut>(&self, signature: RequestSignature, ttl: Duration, fetch_fn: F) -> Result<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let mut rx = {
            let mut state = self.state.lock().expect("lock not poisoned");

            if let Some(entry) = state.entries.get(&signature) {
                if entry.is_expired(self.clock.now()) {
                    log::debug!(target: LOG_TARGET, "entry expired for {signature}");
                } else {
                    log::debug!(target: LOG_TARGET, "hit for {signature}");
                    return Ok(entry.value.clone());
                }
            }

            if let Some(sender) = state.in_flight.get(&signature) {
                log::debug!(target: LOG_TARGET, "joining in-flight fetch for {signature}");
                sender.subscribe()
            } else {
                log::debug!(target: LOG_TARGET, "miss for {signature}, fetching");
                let (tx, rx) = broadcast::channel(1);
                let _ = state.in_flight.insert(signature.clone(), tx.clone());

                // The fetch runs detached so a cancelled waiter can never
                // cancel it for the waiters that remain.
                let cache = self.clone();
                let fetch_signature = signature.clone();
                drop(tokio::spawn(async move {
                    let result = fetch_fn().await;
                    cache.complete_fetch(&fetch_signature, ttl, &result);
                    let _ = tx.send(result);
                }));

                rx
            }
        };

        match rx.recv().await {
            Ok(result) => self.resolve(&signature, result),
            Err(_) => Err(Error::FetchFailed {
                attempts: 0,
                status: None,
                cause: "in-flight fetch was dropped before completing".to_string(),
            }),
        }
    }

    /// Drop expired entries, then evict oldest-first down to the size bound.
    ///
    /// Runs automatically after a store grows the cache past its bound; also
    /// callable as an explicit maintenance pass.
    pub fn sweep(&self) {
        let mut state = self.state.lock().expect("lock not poisoned");
        Self::sweep_state(&mut state, self.clock.now(), self.max_entries);
    }

    /// Record a finished fetch: clear the in-flight marker, store the value
    /// on success, and sweep if the store grew past its bound.
    fn complete_fetch(&self, signature: &RequestSignature, ttl: Duration, result: &Result<V>) {
        let mut state = self.state.lock().expect("lock not poisoned");
        let _ = state.in_flight.remove(signature);

        if let Ok(value) = result {
            let _ = state.entries.insert(
                signature.clone(),
                CacheEntry {
                    value: value.clone(),
                    fetched_at: self.clock.now(),
                    ttl,
                },
            );

            if state.entries.len() > self.max_entries {
                Self::sweep_state(&mut state, self.clock.now(), self.max_entries);
            }
        }
    }

    /// Map a fanned-out fetch result to this caller's return value, serving a
    /// stale entry when configured to do so.
    fn resolve(&self, signature: &RequestSignature, result: Result<V>) -> Result<V> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                if self.serve_stale {
                    let state = self.state.lock().expect("lock not poisoned");
                    if let Some(entry) = state.entries.get(signature) {
                        log::warn!(target: LOG_TARGET, "refresh failed for {signature}, serving stale data: {e}");
                        return Ok(entry.value.clone());
                    }
                }
                Err(e)
            }
        }
    }

    fn sweep_state(state: &mut CacheState<V>, now: DateTime<Utc>, max_entries: usize) {
        state.entries.retain(|signature, entry| {
            let keep = !entry.is_expired(now);
            if !keep {
                log::debug!(target: LOG_TARGET, "sweeping expired entry for {signature}");
            }
            keep
        });

        while state.entries.len() > max_entries {
            let Some(oldest) = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.fetched_at)
                .map(|(signature, _)| signature.clone())
            else {
                break;
            };
            log::debug!(target: LOG_TARGET, "evicting oldest entry for {oldest}");
            let _ = state.entries.remove(&oldest);
        }
    }
}
