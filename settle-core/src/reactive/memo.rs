//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. On first access, the memo runs its computation and caches the result,
//!    recording the version of every source it read.
//!
//! 2. When a source changes, the runtime marks the memo "maybe dirty" and
//!    forwards the mark to the memo's own dependents.
//!
//! 3. On next access, a maybe-dirty memo compares the recorded versions
//!    with the current ones (bringing upstream memos up to date first).
//!    If nothing moved it is clean again without recomputing.
//!
//! 4. When it does recompute, its own version moves only if the new value
//!    differs from the cached one. Dependents of a memo that recomputed to
//!    an equal value therefore stay put.
//!
//! The PartialEq bound exists for step 4.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::context::ReactiveContext;
use super::runtime::{Reactive, ReactiveHandle, Runtime, Source};
use super::subscriber::{SourceId, SubscriberId};

/// Dirty state for a memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoState {
    /// The cached value is up-to-date.
    Clean,

    /// A dependency might have changed. Need to check.
    MaybeDirty,

    /// The memo definitely needs to recompute.
    Dirty,
}

struct MemoInner<T> {
    source_id: SourceId,
    subscriber_id: SubscriberId,
    compute: Box<dyn Fn() -> T + Send + Sync>,
    value: RwLock<Option<T>>,
    state: RwLock<MemoState>,
    version: AtomicU64,
    /// Sources read by the last computation, with the versions seen.
    dependencies: RwLock<Vec<(SourceId, u64)>>,
}

impl<T> MemoInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Whether the cached value can be served as is.
    fn validate(&self) -> bool {
        let state = *self.state.read();
        match state {
            MemoState::Clean => true,
            MemoState::Dirty => false,
            MemoState::MaybeDirty => {
                let recorded = self.dependencies.read().clone();
                if Runtime::dependencies_changed(&recorded) {
                    false
                } else {
                    *self.state.write() = MemoState::Clean;
                    true
                }
            }
        }
    }

    fn current(&self) -> T {
        if self.validate() {
            if let Some(value) = self.value.read().clone() {
                return value;
            }
        }
        self.recompute()
    }

    fn recompute(&self) -> T {
        Runtime::clear_dependencies(self.subscriber_id);
        // Clean before computing, so a write during the computation leaves
        // the memo maybe dirty.
        *self.state.write() = MemoState::Clean;

        let (new_value, read) = {
            let _ctx = ReactiveContext::enter(self.subscriber_id);
            let value = (self.compute)();
            (value, ReactiveContext::get_dependencies())
        };

        *self.dependencies.write() = read;

        let value_changed = self.value.read().as_ref() != Some(&new_value);
        // Keep the fresh value even when equal; only the version is held back.
        *self.value.write() = Some(new_value.clone());
        if value_changed {
            self.version.fetch_add(1, Ordering::AcqRel);
        }

        new_value
    }
}

impl<T> Reactive for MemoInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn mark_maybe_dirty(&self) {
        let mut state = self.state.write();
        if *state == MemoState::Clean {
            *state = MemoState::MaybeDirty;
        }
    }

    fn schedule(&self) {}

    fn is_eager(&self) -> bool {
        false
    }

    fn derived_source(&self) -> Option<SourceId> {
        Some(self.source_id)
    }
}

impl<T> Source for MemoInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn source_id(&self) -> SourceId {
        self.source_id
    }

    fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    fn refresh(&self) -> u64 {
        if !self.validate() || self.value.read().is_none() {
            self.recompute();
        }
        self.version()
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// # Example
///
/// ```rust
/// use settle_core::reactive::{Memo, Signal};
///
/// let count = Signal::new(2);
/// let doubled = Memo::new({
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    inner: Arc<MemoInner<T>>,
    _handle: Arc<ReactiveHandle>,
}

impl<T> Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a new memo with the given computation function.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let inner = Arc::new(MemoInner {
            source_id: SourceId::new(),
            subscriber_id: SubscriberId::new(),
            compute: Box::new(compute),
            value: RwLock::new(None),
            state: RwLock::new(MemoState::Dirty),
            version: AtomicU64::new(0),
            dependencies: RwLock::new(Vec::new()),
        });
        let handle = Runtime::register_derived(inner.clone());

        Self {
            inner,
            _handle: Arc::new(handle),
        }
    }

    /// Get the memo's source ID.
    pub fn id(&self) -> SourceId {
        self.inner.source_id
    }

    /// Get the subscriber ID for this memo.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.subscriber_id
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// Inside a reactive context the memo is tracked as a dependency.
    pub fn get(&self) -> T {
        let value = self.inner.current();
        if let Some(current_subscriber) = ReactiveContext::current_subscriber() {
            let version = self.inner.version.load(Ordering::Acquire);
            ReactiveContext::track_dependency(self.inner.source_id, version);
            Runtime::add_dependency(self.inner.source_id, current_subscriber);
        }

        value
    }

    /// Get the current value without tracking it as a dependency.
    pub fn get_untracked(&self) -> T {
        ReactiveContext::untracked(|| self.inner.current())
    }

    /// Mark the memo as potentially needing recomputation.
    pub fn mark_maybe_dirty(&self) {
        Reactive::mark_maybe_dirty(&*self.inner);
    }

    /// Mark the memo as definitely needing recomputation.
    pub fn mark_dirty(&self) {
        *self.inner.state.write() = MemoState::Dirty;
    }

    /// Get the current dirty state.
    pub fn state(&self) -> MemoState {
        *self.inner.state.read()
    }

    /// Current version; moves each time the value changes.
    pub fn version(&self) -> u64 {
        Source::version(&*self.inner)
    }

    /// Get the number of dependents.
    pub fn dependent_count(&self) -> usize {
        Runtime::dependent_count(self.inner.source_id)
    }

    /// Check if the memo has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.read().is_some()
    }
}

impl<T> Clone for Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _handle: Arc::clone(&self._handle),
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.inner.source_id)
            .field("state", &self.state())
            .field("has_value", &self.has_value())
            .field("dependent_count", &self.dependent_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Signal;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn write_during_compute_is_seen_on_next_read() {
        let source = Signal::new(0);
        let memo = Memo::new({
            let source = source.clone();
            move || {
                let value = source.get();
                if value == 1 {
                    source.set(2);
                }
                value
            }
        });

        assert_eq!(memo.get(), 0);
        source.set(1);
        assert_eq!(memo.get(), 1);
        assert_eq!(memo.get(), 2);
        assert_eq!(memo.get(), 2);
    }

    #[test]
    fn memo_computes_on_first_access() {
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let memo = Memo::new(move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            42
        });

        // Not computed yet
        assert!(!memo.has_value());
        assert_eq!(call_count.load(Ordering::SeqCst), 0);

        assert_eq!(memo.get(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert!(memo.has_value());
    }

    #[test]
    fn memo_caches_value_when_clean() {
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let memo = Memo::new(move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            42
        });

        assert_eq!(memo.get(), 42);
        assert_eq!(memo.get(), 42);
        assert_eq!(memo.get(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn memo_recomputes_when_marked_dirty() {
        let counter = Arc::new(AtomicI32::new(0));
        let counter_clone = counter.clone();

        let memo = Memo::new(move || counter_clone.load(Ordering::SeqCst));
        assert_eq!(memo.get(), 0);

        // Untracked input: only an explicit mark forces the recompute.
        counter.store(5, Ordering::SeqCst);
        assert_eq!(memo.get(), 0);

        memo.mark_dirty();
        assert_eq!(memo.get(), 5);
    }

    #[test]
    fn memo_maybe_dirty_without_moved_inputs_skips_recompute() {
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let memo = Memo::new(move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            42
        });

        assert_eq!(memo.get(), 42);
        memo.mark_maybe_dirty();
        assert_eq!(memo.state(), MemoState::MaybeDirty);

        assert_eq!(memo.get(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert_eq!(memo.state(), MemoState::Clean);
    }

    #[test]
    fn memo_follows_signal_writes() {
        let signal = Signal::new(3);
        let memo = Memo::new({
            let signal = signal.clone();
            move || signal.get() * 2
        });

        assert_eq!(memo.get(), 6);
        signal.set(4);
        assert_eq!(memo.state(), MemoState::MaybeDirty);
        assert_eq!(memo.get(), 8);
    }

    #[test]
    fn memo_version_holds_when_value_is_equal() {
        let signal = Signal::new(3);
        let parity = Memo::new({
            let signal = signal.clone();
            move || signal.get() % 2
        });

        assert_eq!(parity.get(), 1);
        let version = parity.version();

        signal.set(5);
        assert_eq!(parity.get(), 1);
        assert_eq!(parity.version(), version);

        signal.set(6);
        assert_eq!(parity.get(), 0);
        assert_eq!(parity.version(), version + 1);
    }

    #[test]
    fn memo_clone_shares_state() {
        let memo1 = Memo::new(|| 42);
        assert_eq!(memo1.get(), 42);

        let memo2 = memo1.clone();
        assert_eq!(memo1.id(), memo2.id());
        assert!(memo2.has_value());

        memo1.mark_dirty();
        assert_eq!(memo2.state(), MemoState::Dirty);
    }

    #[test]
    fn memo_state_transitions() {
        let memo = Memo::new(|| 42);

        assert_eq!(memo.state(), MemoState::Dirty);

        memo.get();
        assert_eq!(memo.state(), MemoState::Clean);

        memo.mark_maybe_dirty();
        assert_eq!(memo.state(), MemoState::MaybeDirty);

        // Dirty overrides maybe dirty
        memo.mark_dirty();
        assert_eq!(memo.state(), MemoState::Dirty);

        memo.get();
        assert_eq!(memo.state(), MemoState::Clean);
    }
}
