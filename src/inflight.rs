use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt as _;
use futures_util::future::{BoxFuture, Shared};
use tokio::sync::Mutex;

type Pending<T> = Shared<BoxFuture<'static, Result<T, Aborted>>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("in-flight computation aborted: {0}")]
pub struct Aborted(String);

pub struct InFlight<K, T>
where
    T: Clone,
{
    pending: Arc<Mutex<HashMap<K, Pending<T>>>>,
}

impl<K, T> Default for InFlight<K, T>
where
    T: Clone,
{
    fn default() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Leader,
    Follower,
}

impl<K, T> InFlight<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn run<F, Fut>(&self, key: K, start: F) -> Result<T, Aborted>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        self.run_with_role(key, start).await.0
    }

    /// Runs `start()` for `key` unless a computation for `key` is already in
    /// flight, in which case its result is awaited instead.
    ///
    /// The computation runs on its own task and removes its entry when it
    /// finishes, so dropping every caller neither stalls it nor leaves a
    /// stale entry behind.
    pub async fn run_with_role<F, Fut>(&self, key: K, start: F) -> (Result<T, Aborted>, Role)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        // Lookup and insert happen under one lock so two first callers
        // cannot both start a computation.
        let (pending, role) = {
            let mut map = self.pending.lock().await;
            match map.get(&key) {
                Some(existing) => (existing.clone(), Role::Follower),
                None => {
                    let fut = start();
                    let registry = Arc::clone(&self.pending);
                    let own_key = key.clone();
                    // The task cannot deregister before `insert` below: it
                    // needs the lock held here.
                    let handle = tokio::spawn(async move {
                        let out = AssertUnwindSafe(fut).catch_unwind().await;
                        registry.lock().await.remove(&own_key);
                        out.map_err(|_| Aborted("computation panicked".to_owned()))
                    });
                    let shared = async move {
                        match handle.await {
                            Ok(out) => out,
                            Err(err) => Err(Aborted(err.to_string())),
                        }
                    }
                    .boxed()
                    .shared();
                    map.insert(key, shared.clone());
                    (shared, Role::Leader)
                }
            }
        };

        (pending.await, role)
    }

    pub async fn in_flight(&self, key: &K) -> bool {
        self.pending.lock().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
