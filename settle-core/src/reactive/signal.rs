//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (memo/effect), the
//!    signal registers that context as a dependent with the runtime.
//!
//! 2. When a signal's value is set, its version moves and the runtime
//!    propagates the change synchronously before `set` returns.
//!
//! 3. Imperative watchers registered with [`Signal::subscribe`] are called
//!    on every set as well, for readers living outside the graph.
//!
//! # Thread Safety
//!
//! The value is protected by a `parking_lot::RwLock`. Locks are released
//! before watchers or dependents run.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::context::ReactiveContext;
use super::runtime::{ReactiveHandle, Runtime, Source};
use super::subscriber::{SourceId, Subscriber, SubscriberId};

struct SignalInner<T> {
    id: SourceId,
    value: RwLock<T>,
    version: AtomicU64,
    watchers: RwLock<Vec<Arc<Subscriber>>>,
}

impl<T> Source for SignalInner<T>
where
    T: Send + Sync,
{
    fn source_id(&self) -> SourceId {
        self.id
    }

    fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

/// A reactive signal holding a value of type T.
///
/// Cloning a signal yields another handle to the same cell.
///
/// # Example
///
/// ```rust
/// use settle_core::reactive::Signal;
///
/// let count = Signal::new(0);
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<SignalInner<T>>,
    _handle: Arc<ReactiveHandle>,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        let inner = Arc::new(SignalInner {
            id: SourceId::new(),
            value: RwLock::new(value),
            version: AtomicU64::new(0),
            watchers: RwLock::new(Vec::new()),
        });
        let handle = Runtime::register_source(inner.clone());

        Self {
            inner,
            _handle: Arc::new(handle),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also registers the
    /// current computation as a dependent.
    pub fn get(&self) -> T {
        if let Some(subscriber_id) = ReactiveContext::current_subscriber() {
            // Version before value: a racing write can only cause an extra run.
            let version = self.inner.version.load(Ordering::Acquire);
            ReactiveContext::track_dependency(self.inner.id, version);
            Runtime::add_dependency(self.inner.id, subscriber_id);
        }

        self.inner.value.read().clone()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Set a new value and notify dependents.
    ///
    /// Every set counts as a change; dependents re-run even if the new
    /// value equals the old one.
    pub fn set(&self, value: T) {
        *self.inner.value.write() = value;
        self.inner.version.fetch_add(1, Ordering::AcqRel);

        Runtime::batch(|| {
            self.notify_subscribers();
            Runtime::notify_signal_change(self.inner.id);
        });
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = {
            let guard = self.inner.value.read();
            f(&guard)
        };
        self.set(new_value);
    }

    /// A read-only view of this signal.
    pub fn read_only(&self) -> ReadSignal<T> {
        ReadSignal(self.clone())
    }

    /// Register an imperative watcher, called after every set.
    pub fn subscribe<F>(&self, notify: F) -> SubscriberId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let subscriber = Subscriber::new(notify);
        let id = subscriber.id();
        self.inner.watchers.write().push(Arc::new(subscriber));
        id
    }

    /// Remove an imperative watcher.
    pub fn unsubscribe(&self, subscriber_id: SubscriberId) {
        self.inner
            .watchers
            .write()
            .retain(|watcher| watcher.id() != subscriber_id);
    }

    fn notify_subscribers(&self) {
        // Snapshot so a watcher may (un)subscribe without deadlocking.
        let watchers: Vec<Arc<Subscriber>> = self.inner.watchers.read().clone();
        for watcher in watchers {
            watcher.notify();
        }
    }

    /// Number of tracked dependents plus imperative watchers.
    pub fn subscriber_count(&self) -> usize {
        Runtime::dependent_count(self.inner.id) + self.inner.watchers.read().len()
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _handle: Arc::clone(&self._handle),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &self.get_untracked())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// A read-only view of a [`Signal`].
///
/// Handed out by components that own a cell exclusively and let others
/// observe it.
pub struct ReadSignal<T>(Signal<T>)
where
    T: Clone + Send + Sync + 'static;

impl<T> ReadSignal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Get the current value, tracking it in a reactive context.
    pub fn get(&self) -> T {
        self.0.get()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.0.get_untracked()
    }

    /// Get the underlying signal's ID.
    pub fn id(&self) -> SourceId {
        self.0.id()
    }

    /// Register an imperative watcher, called after every set.
    pub fn subscribe<F>(&self, notify: F) -> SubscriberId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.0.subscribe(notify)
    }

    /// Remove an imperative watcher.
    pub fn unsubscribe(&self, subscriber_id: SubscriberId) {
        self.0.unsubscribe(subscriber_id);
    }
}

impl<T> Clone for ReadSignal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Debug for ReadSignal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ReadSignal").field(&self.0).finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
