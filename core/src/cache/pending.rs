use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{self, BoxFuture, FutureExt, Shared};

use crate::error::{BridgeError, BridgeResult};

/// Awaitable handle on one in-flight computation; every clone resolves to the same outcome.
pub type Flight<V> = Shared<BoxFuture<'static, BridgeResult<V>>>;

/// In-flight computations by key, so concurrent requests for one key share one computation.
///
/// Each computation runs on its own task and keeps running even if every awaiter
/// goes away. The task removes its own entry when it settles, before anyone sees
/// the outcome, so a caller arriving afterwards starts fresh instead of joining a
/// finished flight. Failures are not remembered.
pub struct PendingTable<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    flights: DashMap<K, (u64, Flight<V>)>,
    next_flight: AtomicU64,
}

impl<K, V> std::fmt::Debug for PendingTable<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTable")
            .field("in_flight", &self.flights.len())
            .finish()
    }
}

impl<K, V> Default for PendingTable<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self {
            flights: DashMap::new(),
            next_flight: AtomicU64::new(1),
        }
    }
}

impl<K, V> PendingTable<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Join the flight for `key`, or start one from `start()` if none is running.
    ///
    /// `start` is only called when a new flight begins.
    pub fn join_or_spawn<F, Fut>(self: &Arc<Self>, key: K, start: F) -> Flight<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = BridgeResult<V>> + Send + 'static,
    {
        self.join_or_spawn_unless(key, || None, start)
    }

    /// Like `join_or_spawn`, but asks `settled()` first when no flight is running.
    ///
    /// `settled` runs with the key's slot locked, so a flight that stored its
    /// result and then left the table is seen by it instead of being computed twice.
    pub fn join_or_spawn_unless<S, F, Fut>(self: &Arc<Self>, key: K, settled: S, start: F) -> Flight<V>
    where
        S: FnOnce() -> Option<V>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = BridgeResult<V>> + Send + 'static,
    {
        match self.flights.entry(key.clone()) {
            Entry::Occupied(existing) => existing.get().1.clone(),
            Entry::Vacant(slot) => {
                if let Some(value) = settled() {
                    return future::ready(Ok(value)).boxed().shared();
                }
                let id = self.next_flight.fetch_add(1, Ordering::Relaxed);
                let work = start();
                let table = Arc::clone(self);
                let task = tokio::spawn(async move {
                    let outcome = work.await;
                    table.flights.remove_if(&key, |_, (flight, _)| *flight == id);
                    outcome
                });
                let flight: Flight<V> = async move {
                    task.await
                        .unwrap_or_else(|e| Err(BridgeError::Internal(format!("computation task failed: {e}"))))
                }
                .boxed()
                .shared();
                slot.insert((id, flight.clone()));
                flight
            }
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.flights.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.flights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }
}
