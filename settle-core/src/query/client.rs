//! Query Client
//!
//! The execution context shipped with the crate: a shared coordination
//! object that query and mutation observers are created against.
//!
//! # What It Coordinates
//!
//! - Spawning. Fetches and commits run as tokio tasks on the runtime the
//!   client was created on. Each operation runs in its own task so a panic
//!   surfaces as [`BridgeError::Task`] instead of tearing anything down.
//!
//! - Last-known data. The client remembers the last successful result per
//!   key. A new observer for a key fetched before starts from that data
//!   (refreshing in the background) instead of loading from nothing.
//!
//! - Invalidation. Live query observers are indexed by key, so a mutation's
//!   success callback can call [`QueryClient::invalidate`] to refetch every
//!   query under a key prefix.
//!
//! Observers hold the client; the client only holds weak references back.
//! Spawned tasks hold weak references to their observer, so a result that
//! arrives after the observer was torn down is dropped.

use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::descriptor::{MutationDescriptor, QueryDescriptor, QueryKey};
use super::observer::{Listener, MutationObserver, Observer, QueryContext, Subscription};
use super::state::ResultState;
use crate::error::{BridgeError, Result};

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryClientConfig {
    /// Start new observers from the last data fetched for their key.
    pub seed_from_cache: bool,
}

impl Default for QueryClientConfig {
    fn default() -> Self {
        Self {
            seed_from_cache: true,
        }
    }
}

impl QueryClientConfig {
    /// Parse a configuration from JSON. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Type-erased refetch hook for invalidation.
trait Invalidate: Send + Sync {
    fn invalidate(&self);
}

struct LiveQuery {
    key: QueryKey,
    observer: Weak<dyn Invalidate>,
}

struct ClientInner {
    runtime: Handle,
    config: QueryClientConfig,
    data: DashMap<String, Arc<dyn Any + Send + Sync>>,
    live: DashMap<u64, LiveQuery>,
    next_observer: AtomicU64,
}

/// Shared execution context for query and mutation observers.
///
/// Cloning is cheap; clones are the same client and compare equal.
#[derive(Clone)]
pub struct QueryClient {
    inner: Arc<ClientInner>,
}

impl QueryClient {
    /// Create a client on the current tokio runtime.
    pub fn new() -> Result<Self> {
        Self::with_config(QueryClientConfig::default())
    }

    /// Create a client on the current tokio runtime with a configuration.
    pub fn with_config(config: QueryClientConfig) -> Result<Self> {
        let runtime = Handle::try_current()?;
        Ok(Self::with_handle(runtime, config))
    }

    /// Create a client that spawns on the given runtime.
    pub fn with_handle(runtime: Handle, config: QueryClientConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                runtime,
                config,
                data: DashMap::new(),
                live: DashMap::new(),
                next_observer: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &QueryClientConfig {
        &self.inner.config
    }

    /// Seed or overwrite the last-known data for a key.
    pub fn set_query_data<T>(&self, key: &QueryKey, data: T)
    where
        T: Send + Sync + 'static,
    {
        self.inner.data.insert(key.hash(), Arc::new(data));
    }

    /// Last-known data for a key, if any was stored with type `T`.
    pub fn query_data<T>(&self, key: &QueryKey) -> Option<T>
    where
        T: Clone + 'static,
    {
        let entry = self.inner.data.get(&key.hash())?;
        entry.value().downcast_ref::<T>().cloned()
    }

    /// Refetch every live query whose key starts with `prefix`.
    ///
    /// Returns the number of queries refetched.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        self.inner
            .live
            .retain(|_, live| live.observer.strong_count() > 0);

        // Collect first so no map shard is locked while fetches start.
        let matching: Vec<Arc<dyn Invalidate>> = self
            .inner
            .live
            .iter()
            .filter(|entry| entry.key.starts_with(prefix))
            .filter_map(|entry| entry.observer.upgrade())
            .collect();

        tracing::debug!(prefix = %prefix, count = matching.len(), "invalidating queries");
        for observer in &matching {
            observer.invalidate();
        }
        matching.len()
    }

    /// Number of live query observers.
    pub fn live_queries(&self) -> usize {
        self.inner
            .live
            .iter()
            .filter(|entry| entry.observer.strong_count() > 0)
            .count()
    }

    fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.inner.runtime.spawn(future)
    }

    fn next_observer_id(&self) -> u64 {
        self.inner.next_observer.fetch_add(1, Ordering::Relaxed)
    }
}

impl PartialEq for QueryClient {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryClient")
            .field("config", &self.inner.config)
            .field("cached_keys", &self.inner.data.len())
            .field("live_queries", &self.live_queries())
            .finish()
    }
}

impl QueryContext for QueryClient {
    fn query_observer<T>(&self, descriptor: QueryDescriptor<T>) -> Arc<dyn Observer<T>>
    where
        T: Clone + Send + Sync + PartialEq + 'static,
    {
        QueryObserver::new(self.clone(), descriptor)
    }

    fn mutation_observer<T, V>(
        &self,
        descriptor: MutationDescriptor<T, V>,
    ) -> Arc<dyn MutationObserver<T, V>>
    where
        T: Clone + Send + Sync + PartialEq + 'static,
        V: Send + 'static,
    {
        MutationRunner::new(self.clone(), descriptor)
    }
}

/// Listener bookkeeping shared by both observer kinds.
struct Listeners<T> {
    next: AtomicU64,
    entries: Mutex<IndexMap<u64, Listener<T>>>,
}

impl<T: Clone> Listeners<T> {
    fn new() -> Self {
        Self {
            next: AtomicU64::new(0),
            entries: Mutex::new(IndexMap::new()),
        }
    }

    fn add(&self, listener: Listener<T>) -> u64 {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().insert(id, listener);
        id
    }

    fn remove(&self, id: u64) {
        self.entries.lock().shift_remove(&id);
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Deliver a state to every listener, in subscription order.
    fn emit(&self, state: &ResultState<T>) {
        let listeners: Vec<Listener<T>> = self.entries.lock().values().cloned().collect();
        for listener in listeners {
            listener(state.clone());
        }
    }
}

async fn join<T>(handle: JoinHandle<Result<T>>) -> Result<T> {
    match handle.await {
        Ok(outcome) => outcome,
        Err(err) => Err(err.into()),
    }
}

/// Observer for one query descriptor.
///
/// Fetches on the first subscription and on [`Observer::refetch`]. Each
/// fetch carries a generation; only the newest generation may report.
pub struct QueryObserver<T> {
    id: u64,
    client: QueryClient,
    descriptor: QueryDescriptor<T>,
    state: Mutex<ResultState<T>>,
    listeners: Listeners<T>,
    started: AtomicBool,
    generation: AtomicU64,
    me: Weak<Self>,
}

impl<T> QueryObserver<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(client: QueryClient, descriptor: QueryDescriptor<T>) -> Arc<Self> {
        let seeded = if client.config().seed_from_cache {
            client.query_data::<T>(descriptor.key())
        } else {
            None
        };
        let id = client.next_observer_id();

        let observer = Arc::new_cyclic(|me| Self {
            id,
            client: client.clone(),
            descriptor,
            state: Mutex::new(ResultState::with_data(seeded)),
            listeners: Listeners::new(),
            started: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            me: me.clone(),
        });

        let weak: Weak<dyn Invalidate> = Arc::downgrade(&observer) as Weak<dyn Invalidate>;
        client.inner.live.insert(
            id,
            LiveQuery {
                key: observer.descriptor.key().clone(),
                observer: weak,
            },
        );

        tracing::debug!(observer = id, key = %observer.descriptor.key(), "query observer created");
        observer
    }

    pub fn key(&self) -> &QueryKey {
        self.descriptor.key()
    }

    /// Number of active subscriptions.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn update(&self, transition: impl FnOnce(ResultState<T>) -> ResultState<T>) -> ResultState<T> {
        let mut state = self.state.lock();
        let next = transition(state.clone());
        *state = next.clone();
        next
    }

    fn start_fetch(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let state = self.update(ResultState::fetch_started);
        tracing::debug!(observer = self.id, generation, key = %self.key(), "fetch started");
        self.listeners.emit(&state);

        let fetch = self.client.spawn(self.descriptor.fetch());
        let me = self.me.clone();
        self.client.spawn(async move {
            let outcome = join(fetch).await;
            if let Some(observer) = me.upgrade() {
                observer.finish_fetch(generation, outcome);
            }
        });
    }

    fn finish_fetch(&self, generation: u64, outcome: Result<T>) {
        if generation != self.generation.load(Ordering::SeqCst) {
            tracing::trace!(observer = self.id, generation, "dropping superseded fetch result");
            return;
        }

        let state = match outcome {
            Ok(data) => {
                self.client.set_query_data(self.key(), data.clone());
                self.update(|state| state.fetch_succeeded(data))
            }
            Err(err) => {
                tracing::warn!(observer = self.id, key = %self.key(), error = %err, "fetch failed");
                self.update(|state| state.fetch_failed(err))
            }
        };
        self.listeners.emit(&state);
    }
}

impl<T> Observer<T> for QueryObserver<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn current_result(&self) -> ResultState<T> {
        self.state.lock().clone()
    }

    fn subscribe(&self, listener: Listener<T>) -> Subscription {
        let listener_id = self.listeners.add(listener);
        if !self.started.swap(true, Ordering::SeqCst) {
            self.start_fetch();
        }

        let me = self.me.clone();
        Subscription::new(move || {
            if let Some(observer) = me.upgrade() {
                observer.listeners.remove(listener_id);
            }
        })
    }

    fn refetch(&self) {
        self.started.store(true, Ordering::SeqCst);
        self.start_fetch();
    }
}

impl<T> Invalidate for QueryObserver<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn invalidate(&self) {
        Observer::refetch(self);
    }
}

impl<T> Drop for QueryObserver<T> {
    fn drop(&mut self) {
        self.client.inner.live.remove(&self.id);
    }
}

/// Observer for one mutation descriptor.
///
/// Concurrent commits are allowed; the reported state follows the most
/// recently started one.
pub struct MutationRunner<T, V> {
    id: u64,
    client: QueryClient,
    descriptor: MutationDescriptor<T, V>,
    state: Mutex<ResultState<T>>,
    listeners: Listeners<T>,
    generation: AtomicU64,
    me: Weak<Self>,
}

impl<T, V> MutationRunner<T, V>
where
    T: Clone + Send + Sync + 'static,
    V: Send + 'static,
{
    pub fn new(client: QueryClient, descriptor: MutationDescriptor<T, V>) -> Arc<Self> {
        let id = client.next_observer_id();
        tracing::debug!(observer = id, "mutation observer created");

        Arc::new_cyclic(|me| Self {
            id,
            client,
            descriptor,
            state: Mutex::new(ResultState::mutation_idle()),
            listeners: Listeners::new(),
            generation: AtomicU64::new(0),
            me: me.clone(),
        })
    }

    fn settle(&self, generation: u64, outcome: Result<T>) {
        if generation != self.generation.load(Ordering::SeqCst) {
            return;
        }
        let state = {
            let mut state = self.state.lock();
            let next = state.clone().mutation_settled(outcome);
            *state = next.clone();
            next
        };
        self.listeners.emit(&state);
    }
}

impl<T, V> Observer<T> for MutationRunner<T, V>
where
    T: Clone + Send + Sync + 'static,
    V: Send + 'static,
{
    fn current_result(&self) -> ResultState<T> {
        self.state.lock().clone()
    }

    fn subscribe(&self, listener: Listener<T>) -> Subscription {
        let listener_id = self.listeners.add(listener);
        let me = self.me.clone();
        Subscription::new(move || {
            if let Some(runner) = me.upgrade() {
                runner.listeners.remove(listener_id);
            }
        })
    }
}

impl<T, V> MutationObserver<T, V> for MutationRunner<T, V>
where
    T: Clone + Send + Sync + 'static,
    V: Send + 'static,
{
    fn mutate(&self, input: V) -> BoxFuture<'static, Result<T>> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let state = {
            let mut state = self.state.lock();
            let next = state.clone().mutation_started();
            *state = next.clone();
            next
        };
        tracing::debug!(observer = self.id, generation, "mutation started");
        self.listeners.emit(&state);

        let commit = self.client.spawn(self.descriptor.commit(input));
        let on_success = self.descriptor.success_callback();
        let me = self.me.clone();
        let id = self.id;

        // The pipeline is spawned so the mutation settles even if the
        // caller drops the returned future.
        let pipeline = self.client.spawn(async move {
            let outcome = join(commit).await;
            match &outcome {
                Ok(data) => {
                    if let Some(callback) = &on_success {
                        callback(data);
                    }
                }
                Err(err) => tracing::warn!(observer = id, error = %err, "mutation failed"),
            }
            if let Some(runner) = me.upgrade() {
                runner.settle(generation, outcome.clone());
            }
            outcome
        });

        join(pipeline).boxed()
    }
}
