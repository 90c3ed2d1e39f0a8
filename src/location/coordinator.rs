//! Per-key fetch de-duplication in front of the result cache.
//!
//! At most one `populate` future runs per cache key at any time. The first
//! caller for a key becomes the leader and runs the fetch; concurrent
//! callers for the same key wait on the leader's outcome instead of issuing
//! their own request. Different keys never block each other.

use super::cache::ResultCache;
use super::types::{CacheKey, CachedList, LocationError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// `None` while the fetch is running.
type Outcome = Option<Result<(), LocationError>>;

enum Role {
    Cached,
    Leader(watch::Sender<Outcome>),
    Follower(watch::Receiver<Outcome>),
}

/// Removes the in-flight marker when the leader finishes, fails, panics or
/// is dropped mid-fetch.
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashMap<CacheKey, watch::Receiver<Outcome>>>,
    key: &'a CacheKey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(self.key);
    }
}

pub struct FetchCoordinator {
    cache: Arc<ResultCache>,
    in_flight: Mutex<HashMap<CacheKey, watch::Receiver<Outcome>>>,
}

impl FetchCoordinator {
    pub fn new(cache: Arc<ResultCache>) -> Self {
        Self {
            cache,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        self.in_flight.lock().contains_key(key)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Make sure `key` is cached, running `populate` only if nobody else is
    /// already fetching it.
    ///
    /// On success the value is in the cache when this returns. On failure
    /// nothing is cached and the key is released, so calling again retries.
    pub async fn ensure<F, Fut>(&self, key: &CacheKey, populate: F) -> Result<(), LocationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedList, LocationError>>,
    {
        loop {
            let role = {
                let mut in_flight = self.in_flight.lock();
                if self.cache.has(key) {
                    Role::Cached
                } else if let Some(rx) = in_flight.get(key) {
                    Role::Follower(rx.clone())
                } else {
                    let (tx, rx) = watch::channel(None);
                    in_flight.insert(key.clone(), rx);
                    Role::Leader(tx)
                }
            };

            match role {
                Role::Cached => {
                    debug!(%key, "cache hit");
                    return Ok(());
                }
                Role::Follower(mut rx) => {
                    debug!(%key, "joining in-flight fetch");
                    match rx.wait_for(Option::is_some).await {
                        Ok(outcome) => return (*outcome).clone().unwrap_or(Ok(())),
                        // Leader was dropped before finishing; take over.
                        Err(_) => continue,
                    }
                }
                Role::Leader(tx) => {
                    debug!(%key, "fetching");
                    let guard = InFlightGuard { in_flight: &self.in_flight, key };
                    let outcome = match populate().await {
                        Ok(value) => {
                            self.cache.set(key.clone(), value);
                            Ok(())
                        }
                        Err(e) => {
                            warn!(%key, error = %e, "fetch failed");
                            Err(e)
                        }
                    };
                    // Waiters read the cache once woken, so write it before releasing.
                    drop(guard);
                    tx.send_replace(Some(outcome.clone()));
                    return outcome;
                }
            }
        }
    }
}
