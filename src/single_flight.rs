//! Per-key coalescing of concurrent computations.
//!
//! While a computation for a key is running, later callers for the same key wait for its
//! result instead of starting their own. Keys never block each other. A failed
//! computation is not remembered: one of the waiters retries it.

use dashmap::DashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Outcome of [`SingleFlight::run`].
#[derive(Debug)]
pub struct Flight<V, E> {
    pub result: Result<V, E>,
    /// Whether this caller executed the computation itself.
    pub led: bool,
}

/// Deduplicates concurrent work keyed by `K`.
#[derive(Debug)]
pub struct SingleFlight<K, V>
where
    K: Eq + Hash,
{
    in_flight: DashMap<K, Arc<OnceCell<V>>>,
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            in_flight: DashMap::new(),
        }
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `compute` for `key`, or join the computation already running for it.
    pub async fn run<F, Fut, E>(&self, key: K, compute: F) -> Flight<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        // Clone the cell out so no map shard lock is held across the await.
        let cell = self
            .in_flight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let mut led = false;
        let result = cell
            .get_or_try_init(|| {
                led = true;
                compute()
            })
            .await
            .cloned();

        if led {
            self.in_flight
                .remove_if(&key, |_, current| Arc::ptr_eq(current, &cell));
        }

        Flight { result, led }
    }

    /// Detach any running computation for `key` so later callers start a fresh one.
    pub fn forget(&self, key: &K) {
        self.in_flight.remove(key);
    }

    /// Detach every running computation.
    pub fn forget_all(&self) {
        self.in_flight.clear();
    }

    /// Number of keys with a computation in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}
