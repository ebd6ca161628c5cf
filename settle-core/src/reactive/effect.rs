//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the runtime queues the effect. Before
//!    re-running, the effect checks whether a source it read actually moved
//!    to a new version; if none did, the run is skipped.
//!
//! 3. Before re-running, the effect clears its old dependencies and tracks
//!    new ones during execution.
//!
//! # Cleanup
//!
//! An effect created with [`Effect::with_cleanup`] returns a [`Cleanup`]
//! from each run. The cleanup of run N executes before run N+1, on
//! [`Effect::dispose`], and when the last handle to the effect is dropped,
//! whichever comes first. Every acquisition made in a run is therefore
//! released exactly once.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::context::ReactiveContext;
use super::runtime::{Reactive, ReactiveHandle, Runtime};
use super::subscriber::{SourceId, SubscriberId};

/// A release action returned by an effect run.
#[must_use = "a cleanup only runs if it is handed back to the effect"]
pub struct Cleanup(Option<Box<dyn FnOnce() + Send>>);

impl Cleanup {
    /// Wrap a release action.
    pub fn new<F>(release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Some(Box::new(release)))
    }

    /// A cleanup that does nothing.
    pub fn none() -> Self {
        Self(None)
    }

    /// Run the release action, if any.
    pub fn run(mut self) {
        if let Some(release) = self.0.take() {
            release();
        }
    }
}

impl std::fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Cleanup").field(&self.0.is_some()).finish()
    }
}

struct EffectInner {
    subscriber_id: SubscriberId,
    run: Box<dyn Fn() -> Cleanup + Send + Sync>,
    dependencies: RwLock<Vec<(SourceId, u64)>>,
    cleanup: Mutex<Option<Cleanup>>,
    dirty: AtomicBool,
    disposed: AtomicBool,
    run_count: AtomicUsize,
}

impl EffectInner {
    fn release(&self) {
        let pending = self.cleanup.lock().take();
        if let Some(cleanup) = pending {
            Runtime::untrack(|| cleanup.run());
        }
    }

    fn execute(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        Runtime::batch(|| {
            self.release();
            self.dirty.store(false, Ordering::SeqCst);
            Runtime::clear_dependencies(self.subscriber_id);

            let (cleanup, read) = {
                let _ctx = ReactiveContext::enter(self.subscriber_id);
                let cleanup = (self.run)();
                (cleanup, ReactiveContext::get_dependencies())
            };

            *self.dependencies.write() = read;
            *self.cleanup.lock() = Some(cleanup);
            self.run_count.fetch_add(1, Ordering::SeqCst);
        });
    }
}

impl Reactive for EffectInner {
    fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn mark_maybe_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    fn schedule(&self) {
        if self.disposed.load(Ordering::SeqCst) || !self.dirty.swap(false, Ordering::SeqCst) {
            return;
        }

        let recorded = self.dependencies.read().clone();
        if Runtime::dependencies_changed(&recorded) {
            self.execute();
        }
    }

    fn is_eager(&self) -> bool {
        true
    }
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.get_mut().take() {
            Runtime::untrack(|| cleanup.run());
        }
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust
/// use settle_core::reactive::{Effect, Signal};
///
/// let count = Signal::new(0);
/// let effect = Effect::new({
///     let count = count.clone();
///     move || println!("Count is: {}", count.get())
/// });
///
/// count.set(5); // Prints: "Count is: 5"
/// assert_eq!(effect.run_count(), 2);
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Arc<EffectInner>,
    _handle: Arc<ReactiveHandle>,
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish initial dependencies.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::with_cleanup(move || {
            run();
            Cleanup::none()
        })
    }

    /// Create an effect whose runs return a cleanup.
    ///
    /// The function runs immediately.
    pub fn with_cleanup<F>(run: F) -> Self
    where
        F: Fn() -> Cleanup + Send + Sync + 'static,
    {
        let effect = Self::new_lazy(run);
        effect.execute();
        effect
    }

    /// Create an effect without running it immediately.
    ///
    /// It has no dependencies until the first [`Effect::execute`].
    pub fn new_lazy<F>(run: F) -> Self
    where
        F: Fn() -> Cleanup + Send + Sync + 'static,
    {
        let inner = Arc::new(EffectInner {
            subscriber_id: SubscriberId::new(),
            run: Box::new(run),
            dependencies: RwLock::new(Vec::new()),
            cleanup: Mutex::new(None),
            dirty: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
        });
        let handle = Runtime::register(inner.clone());

        Self {
            inner,
            _handle: Arc::new(handle),
        }
    }

    /// Get the subscriber ID for this effect.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.subscriber_id
    }

    /// Execute the effect function unconditionally.
    ///
    /// The previous run's cleanup runs first.
    pub fn execute(&self) {
        self.inner.execute();
    }

    /// Re-run the effect if a dependency moved since the last run.
    pub fn schedule(&self) {
        Reactive::schedule(&*self.inner);
    }

    /// Dispose of the effect.
    ///
    /// Runs the pending cleanup and stops tracking. After disposal the
    /// effect never runs again.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        Runtime::clear_dependencies(self.inner.subscriber_id);
        Runtime::batch(|| self.inner.release());
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.read().len()
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("subscriber_id", &self.inner.subscriber_id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
