//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos, and
//! effects. It owns the dependency edges and propagates changes when a
//! signal is written.
//!
//! # How It Works
//!
//! 1. Signals register as sources; memos register as both source and
//!    subscriber; effects register as subscribers.
//!
//! 2. When a memo or effect reads a source, the runtime records an edge.
//!
//! 3. When a signal's value changes, the runtime:
//!    a. Walks the edges, marking every reachable memo and effect
//!       "maybe dirty" (memos forward the walk to their own dependents)
//!    b. Queues the effects it reached
//!    c. Flushes the queue, unless a batch is open
//!
//! 4. Memos stay lazy. A queued effect first asks whether any of its
//!    sources actually moved to a new version (pulling memos up to date on
//!    the way) and re-runs only if one did.
//!
//! # Thread Safety
//!
//! The registries are global and lock-protected, so signals can be written
//! from any thread. Propagation and the effect queue are per thread: an
//! effect runs on the thread whose write triggered it. No lock is held while
//! user code (memo computations, effect bodies, cleanups) runs.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, OnceLock, Weak};

use indexmap::IndexSet;
use parking_lot::RwLock;

use super::context::ReactiveContext;
use super::subscriber::{SourceId, SubscriberId};

/// A trait for computations that can be notified when dependencies change.
pub trait Reactive: Send + Sync {
    /// Get the subscriber ID for this reactive value.
    fn subscriber_id(&self) -> SubscriberId;

    /// Mark this reactive value as potentially needing update.
    fn mark_maybe_dirty(&self);

    /// Run this reactive value if it is stale (effects only).
    fn schedule(&self);

    /// Check if this reactive value is an effect (eager) or memo (lazy).
    fn is_eager(&self) -> bool;

    /// The source ID a derived value republishes under, if any.
    ///
    /// Propagation continues through this source to the value's own
    /// dependents.
    fn derived_source(&self) -> Option<SourceId> {
        None
    }
}

/// A readable value with a version counter.
///
/// The version moves only when the value changes.
pub trait Source: Send + Sync {
    /// Get the source ID.
    fn source_id(&self) -> SourceId;

    /// Current version without bringing the value up to date.
    fn version(&self) -> u64;

    /// Bring the value up to date and return its version.
    fn refresh(&self) -> u64 {
        self.version()
    }
}

/// Handle to a registered reactive value.
///
/// Dropping this handle unregisters the value from the runtime.
#[derive(Debug)]
pub struct ReactiveHandle {
    subscriber_id: Option<SubscriberId>,
    source_id: Option<SourceId>,
}

impl Drop for ReactiveHandle {
    fn drop(&mut self) {
        Runtime::unregister(self.subscriber_id, self.source_id);
    }
}

/// The global reactive runtime.
pub struct Runtime;

type SubscriberRegistry = RwLock<HashMap<SubscriberId, Weak<dyn Reactive>>>;
type SourceRegistry = RwLock<HashMap<SourceId, Weak<dyn Source>>>;
type EdgeMap = RwLock<Edges>;

/// Dependency edges, indexed from both ends.
#[derive(Default)]
struct Edges {
    dependents: HashMap<SourceId, IndexSet<SubscriberId>>,
    sources: HashMap<SubscriberId, IndexSet<SourceId>>,
}

impl Edges {
    fn insert(&mut self, source_id: SourceId, subscriber_id: SubscriberId) {
        self.dependents
            .entry(source_id)
            .or_default()
            .insert(subscriber_id);
        self.sources
            .entry(subscriber_id)
            .or_default()
            .insert(source_id);
    }

    fn remove_subscriber(&mut self, subscriber_id: SubscriberId) {
        let Some(sources) = self.sources.remove(&subscriber_id) else {
            return;
        };
        for source_id in sources {
            if let Some(subs) = self.dependents.get_mut(&source_id) {
                subs.shift_remove(&subscriber_id);
                if subs.is_empty() {
                    self.dependents.remove(&source_id);
                }
            }
        }
    }

    fn remove_source(&mut self, source_id: SourceId) {
        let Some(subs) = self.dependents.remove(&source_id) else {
            return;
        };
        for subscriber_id in subs {
            if let Some(sources) = self.sources.get_mut(&subscriber_id) {
                sources.shift_remove(&source_id);
                if sources.is_empty() {
                    self.sources.remove(&subscriber_id);
                }
            }
        }
    }
}

// Registries hold weak references so they never keep a value alive.
static REGISTRY: OnceLock<SubscriberRegistry> = OnceLock::new();
static SOURCES: OnceLock<SourceRegistry> = OnceLock::new();
static EDGES: OnceLock<EdgeMap> = OnceLock::new();

thread_local! {
    static PENDING_EFFECTS: RefCell<VecDeque<Arc<dyn Reactive>>> = RefCell::new(VecDeque::new());
    static BATCH_DEPTH: Cell<usize> = const { Cell::new(0) };
    static FLUSHING: Cell<bool> = const { Cell::new(false) };
}

fn get_registry() -> &'static SubscriberRegistry {
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

fn get_sources() -> &'static SourceRegistry {
    SOURCES.get_or_init(|| RwLock::new(HashMap::new()))
}

fn get_edges() -> &'static EdgeMap {
    EDGES.get_or_init(|| RwLock::new(Edges::default()))
}

impl Runtime {
    /// Register a subscriber (an effect).
    ///
    /// Returns a handle that unregisters the value when dropped.
    pub fn register(reactive: Arc<dyn Reactive>) -> ReactiveHandle {
        let id = reactive.subscriber_id();
        get_registry().write().insert(id, Arc::downgrade(&reactive));

        ReactiveHandle {
            subscriber_id: Some(id),
            source_id: None,
        }
    }

    /// Register a source (a signal).
    pub fn register_source(source: Arc<dyn Source>) -> ReactiveHandle {
        let id = source.source_id();
        get_sources().write().insert(id, Arc::downgrade(&source));

        ReactiveHandle {
            subscriber_id: None,
            source_id: Some(id),
        }
    }

    /// Register a value that is both subscriber and source (a memo).
    pub fn register_derived<R>(node: Arc<R>) -> ReactiveHandle
    where
        R: Reactive + Source + 'static,
    {
        let subscriber_id = Reactive::subscriber_id(&*node);
        let source_id = Source::source_id(&*node);

        let reactive: Arc<dyn Reactive> = node.clone();
        let source: Arc<dyn Source> = node;
        get_registry()
            .write()
            .insert(subscriber_id, Arc::downgrade(&reactive));
        get_sources().write().insert(source_id, Arc::downgrade(&source));

        ReactiveHandle {
            subscriber_id: Some(subscriber_id),
            source_id: Some(source_id),
        }
    }

    fn unregister(subscriber_id: Option<SubscriberId>, source_id: Option<SourceId>) {
        if let Some(id) = subscriber_id {
            get_registry().write().remove(&id);
            Self::clear_dependencies(id);
        }
        if let Some(id) = source_id {
            get_sources().write().remove(&id);
            get_edges().write().remove_source(id);
        }
    }

    /// Record that a subscriber depends on a source.
    ///
    /// Called automatically when a source is read within a reactive context.
    pub fn add_dependency(source_id: SourceId, subscriber_id: SubscriberId) {
        get_edges().write().insert(source_id, subscriber_id);
    }

    /// Remove all dependencies for a subscriber.
    ///
    /// Called before re-running a computation to clear stale dependencies.
    /// Only the subscriber's own edges are touched.
    pub fn clear_dependencies(subscriber_id: SubscriberId) {
        get_edges().write().remove_subscriber(subscriber_id);
    }

    /// Number of subscribers currently depending on a source.
    pub fn dependent_count(source_id: SourceId) -> usize {
        get_edges()
            .read()
            .dependents
            .get(&source_id)
            .map(IndexSet::len)
            .unwrap_or(0)
    }

    fn lookup(subscriber_id: SubscriberId) -> Option<Arc<dyn Reactive>> {
        get_registry()
            .read()
            .get(&subscriber_id)
            .and_then(Weak::upgrade)
    }

    fn lookup_source(source_id: SourceId) -> Option<Arc<dyn Source>> {
        get_sources().read().get(&source_id).and_then(Weak::upgrade)
    }

    /// Notify all subscribers that a source changed.
    ///
    /// This is the core update propagation mechanism.
    pub fn notify_signal_change(source_id: SourceId) {
        let mut visited = HashSet::new();
        let mut frontier = VecDeque::from([source_id]);
        let mut effects_to_run = Vec::new();

        while let Some(source) = frontier.pop_front() {
            // Copy the edge list out so no lock is held while marking.
            let subscriber_ids: Vec<SubscriberId> = get_edges()
                .read()
                .dependents
                .get(&source)
                .map(|subs| subs.iter().copied().collect())
                .unwrap_or_default();

            for sub_id in subscriber_ids {
                if !visited.insert(sub_id) {
                    continue;
                }
                let Some(reactive) = Self::lookup(sub_id) else {
                    continue;
                };

                reactive.mark_maybe_dirty();
                if reactive.is_eager() {
                    effects_to_run.push(reactive);
                } else if let Some(derived) = reactive.derived_source() {
                    frontier.push_back(derived);
                }
            }
        }

        if effects_to_run.is_empty() {
            return;
        }

        tracing::trace!(
            source = source_id.raw(),
            effects = effects_to_run.len(),
            "queued effects after source change"
        );

        PENDING_EFFECTS.with(|queue| {
            let mut queue = queue.borrow_mut();
            for effect in effects_to_run {
                let id = effect.subscriber_id();
                if !queue.iter().any(|queued| queued.subscriber_id() == id) {
                    queue.push_back(effect);
                }
            }
        });

        if BATCH_DEPTH.with(Cell::get) == 0 {
            Self::flush();
        }
    }

    /// Run every queued effect on this thread.
    ///
    /// Effects queued while flushing run in the same flush. A nested call
    /// returns immediately and leaves the work to the outer flush.
    pub fn flush() {
        if FLUSHING.with(|flag| flag.replace(true)) {
            return;
        }

        struct ResetFlushing;
        impl Drop for ResetFlushing {
            fn drop(&mut self) {
                FLUSHING.with(|flag| flag.set(false));
            }
        }
        let _reset = ResetFlushing;

        while let Some(effect) = PENDING_EFFECTS.with(|queue| queue.borrow_mut().pop_front()) {
            effect.schedule();
        }
    }

    /// Run `f` with effect flushing deferred until it returns.
    ///
    /// Effects triggered inside the batch run once, after the outermost
    /// batch closes.
    pub fn batch<R>(f: impl FnOnce() -> R) -> R {
        struct BatchGuard;
        impl Drop for BatchGuard {
            fn drop(&mut self) {
                BATCH_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
            }
        }

        BATCH_DEPTH.with(|depth| depth.set(depth.get() + 1));
        let result = {
            let _guard = BatchGuard;
            f()
        };

        if BATCH_DEPTH.with(Cell::get) == 0 {
            Self::flush();
        }
        result
    }

    /// Run `f` without tracking any reads as dependencies.
    pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
        ReactiveContext::untracked(f)
    }

    /// Current version of a source without refreshing it.
    pub fn peek_version(source_id: SourceId) -> Option<u64> {
        Self::lookup_source(source_id).map(|source| source.version())
    }

    /// Bring a source up to date and return its version.
    pub fn source_version(source_id: SourceId) -> Option<u64> {
        Self::lookup_source(source_id).map(|source| source.refresh())
    }

    /// Check whether any recorded source moved since it was read.
    ///
    /// Memos are refreshed first, so a memo that recomputed to an equal
    /// value does not count as a change. A source that no longer exists
    /// counts as changed.
    pub fn dependencies_changed(recorded: &[(SourceId, u64)]) -> bool {
        recorded
            .iter()
            .any(|(id, seen)| Self::source_version(*id) != Some(*seen))
    }
}
