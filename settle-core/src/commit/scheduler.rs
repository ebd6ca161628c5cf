//! Debounced Commit Scheduler
//!
//! Persists a watched value once it has stopped changing for a while.
//!
//! # How the Scheduler Works
//!
//! 1. An effect reads the gate. While the gate is closed it returns without
//!    arming anything, and only the gate is tracked.
//! 2. With the gate open the effect snapshots the watched value, bumps the
//!    generation, marks the scheduler busy and spawns a timer task. The task
//!    is stored as the [`PendingCommit`], replacing (and aborting) any
//!    previous one.
//! 3. The effect's cleanup aborts the timer it armed and clears busy. A
//!    write to the value or the gate re-runs the effect, so a burst of
//!    writes keeps replacing the timer and only the last one survives.
//! 4. When a timer fires it checks, under the state lock, that its
//!    generation is still the armed one. A superseded timer does nothing.
//! 5. The surviving timer runs the commit with its snapshot. When the
//!    commit settles it clears busy only if its generation is still the
//!    current one; a newer armed cycle keeps the scheduler busy.
//!
//! Failed commits are logged and exposed through
//! [`DebouncedCommit::last_error`]. They are not retried.

use std::future::Future;
use std::sync::{Arc, Weak};

use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;

use super::config::DebounceConfig;
use super::pending::PendingCommit;
use crate::error::{BridgeError, Result};
use crate::query::CommitFn;
use crate::reactive::{Cleanup, Effect, ReadCell, ReadSignal, Signal};

/// Where the scheduler is in its arm/commit cycle.
///
/// A commit in flight is reported as `Committing` even when a newer timer
/// is already armed behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPhase {
    Idle,
    Armed,
    Committing,
}

#[derive(Debug, Default)]
struct SchedulerState {
    generation: u64,
    pending: Option<PendingCommit>,
    in_flight: usize,
    commits: usize,
}

struct Shared<X> {
    state: Mutex<SchedulerState>,
    busy: Signal<bool>,
    last_error: Signal<Option<BridgeError>>,
    commit: CommitFn<(), X>,
    config: DebounceConfig,
    runtime: Handle,
}

impl<X> Shared<X>
where
    X: Clone + Send + Sync + 'static,
{
    fn arm(self: &Arc<Self>, snapshot: X) -> u64 {
        let mut state = self.state.lock();
        state.generation += 1;
        let generation = state.generation;

        let delay = self.config.delay();
        let shared = Arc::downgrade(self);
        let handle = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = shared.upgrade() {
                shared.fire(generation, snapshot).await;
            }
        });

        if let Some(previous) = state.pending.replace(PendingCommit::new(handle, generation)) {
            previous.cancel();
        }
        drop(state);

        set_if_changed(&self.busy, true);
        tracing::debug!(generation, delay_ms = self.config.delay_ms, "commit armed");
        generation
    }

    /// Cancel the timer armed for `generation`, if it has not fired yet.
    ///
    /// Busy clears only when a timer was actually cancelled and it belonged
    /// to the current generation.
    fn disarm(&self, generation: u64) {
        let cancelled = {
            let mut state = self.state.lock();
            let armed = state
                .pending
                .as_ref()
                .is_some_and(|pending| pending.generation() == generation);
            let pending = if armed { state.pending.take() } else { None };
            match pending {
                Some(pending) => {
                    tracing::debug!(generation, waited = ?pending.elapsed(), "armed commit cancelled");
                    pending.cancel();
                    state.generation == generation
                }
                None => false,
            }
        };

        if cancelled {
            set_if_changed(&self.busy, false);
        }
    }

    async fn fire(&self, generation: u64, snapshot: X) {
        {
            let mut state = self.state.lock();
            let current = state
                .pending
                .as_ref()
                .is_some_and(|pending| pending.generation() == generation);
            if !current {
                tracing::trace!(generation, "superseded timer fired");
                return;
            }
            // Taken, not cancelled: this task is the timer.
            state.pending = None;
            state.in_flight += 1;
            state.commits += 1;
        }

        set_if_changed(&self.busy, true);
        tracing::debug!(generation, "commit started");

        // Own task, so a panicking commit still settles.
        let outcome = match self.runtime.spawn((self.commit)(snapshot)).await {
            Ok(outcome) => outcome,
            Err(err) => Err(err.into()),
        };

        let current = {
            let mut state = self.state.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
            state.generation == generation
        };

        match outcome {
            Ok(()) => {
                tracing::debug!(generation, "commit succeeded");
                set_if_changed(&self.last_error, None);
            }
            Err(err) => {
                tracing::warn!(generation, error = %err, "commit failed");
                self.last_error.set(Some(err));
            }
        }

        if current {
            set_if_changed(&self.busy, false);
        } else {
            tracing::trace!(generation, "stale commit settled, busy left to the newer cycle");
        }
    }

    fn phase(&self) -> CommitPhase {
        let state = self.state.lock();
        if state.in_flight > 0 {
            CommitPhase::Committing
        } else if state.pending.is_some() {
            CommitPhase::Armed
        } else {
            CommitPhase::Idle
        }
    }
}

fn set_if_changed<T>(signal: &Signal<T>, value: T)
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    if signal.get_untracked() != value {
        signal.set(value);
    }
}

/// Commits a watched value after it settles.
///
/// ```rust,no_run
/// use settle_core::commit::{DebounceConfig, DebouncedCommit};
/// use settle_core::reactive::Signal;
///
/// # async fn demo() -> settle_core::error::Result<()> {
/// let loaded = Signal::new(false);
/// let todos = Signal::new(Vec::<String>::new());
///
/// let autosave = DebouncedCommit::new(
///     loaded.read_only(),
///     todos.read_only(),
///     DebounceConfig::default(),
///     |todos: Vec<String>| async move {
///         println!("saving {} todos", todos.len());
///         Ok(())
///     },
/// )?;
///
/// loaded.set(true);
/// todos.update(|todos| [todos.clone(), vec!["Paint house".into()]].concat());
/// assert!(autosave.busy().get());
/// # Ok(())
/// # }
/// ```
pub struct DebouncedCommit<X>
where
    X: Clone + Send + Sync + 'static,
{
    effect: Effect,
    shared: Arc<Shared<X>>,
}

impl<X> DebouncedCommit<X>
where
    X: Clone + Send + Sync + 'static,
{
    /// Start watching `value`, committing it `config.delay()` after the
    /// last change while `gate` is open.
    ///
    /// If the gate is already open the current value is armed right away.
    /// Must be called inside a tokio runtime.
    pub fn new<G, C, F, Fut>(gate: G, value: C, config: DebounceConfig, commit: F) -> Result<Self>
    where
        G: ReadCell<bool>,
        C: ReadCell<X>,
        F: Fn(X) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        config.validate()?;
        let runtime = Handle::try_current()?;

        let shared = Arc::new(Shared {
            state: Mutex::new(SchedulerState::default()),
            busy: Signal::new(false),
            last_error: Signal::new(None),
            commit: Arc::new(move |snapshot| commit(snapshot).boxed()),
            config,
            runtime,
        });

        let effect = Effect::with_cleanup({
            let shared = shared.clone();
            move || {
                if !gate.get() {
                    tracing::trace!("gate closed, nothing armed");
                    return Cleanup::none();
                }

                let generation = shared.arm(value.get());
                let shared: Weak<Shared<X>> = Arc::downgrade(&shared);
                Cleanup::new(move || {
                    if let Some(shared) = shared.upgrade() {
                        shared.disarm(generation);
                    }
                })
            }
        });

        Ok(Self { effect, shared })
    }

    /// True from the moment a commit is armed until the commit of the
    /// current generation settles, or until the armed timer is cancelled.
    pub fn busy(&self) -> ReadSignal<bool> {
        self.shared.busy.read_only()
    }

    /// The failure of the most recent commit, cleared by the next success.
    pub fn last_error(&self) -> ReadSignal<Option<BridgeError>> {
        self.shared.last_error.read_only()
    }

    pub fn phase(&self) -> CommitPhase {
        self.shared.phase()
    }

    /// Number of times a timer has been armed.
    pub fn generation(&self) -> u64 {
        self.shared.state.lock().generation
    }

    /// Number of commits started.
    pub fn commit_count(&self) -> usize {
        self.shared.state.lock().commits
    }

    /// Stop watching. An armed timer is cancelled and busy cleared; a commit
    /// already running finishes and clears `busy` when it settles.
    pub fn dispose(&self) {
        self.effect.dispose();
        tracing::debug!("debounced commit disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.effect.is_disposed()
    }
}

impl<X> std::fmt::Debug for DebouncedCommit<X>
where
    X: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebouncedCommit")
            .field("phase", &self.phase())
            .field("generation", &self.generation())
            .field("commit_count", &self.commit_count())
            .field("config", &self.shared.config)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn quick() -> DebounceConfig {
        DebounceConfig::new(100)
    }

    #[test]
    fn requires_a_runtime() {
        let outcome = DebouncedCommit::new(
            Signal::new(true),
            Signal::new(0),
            quick(),
            |_: i32| async { Ok(()) },
        );
        assert!(matches!(outcome, Err(BridgeError::NoRuntime(_))));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn rejects_zero_delay() {
        let outcome = DebouncedCommit::new(
            Signal::new(true),
            Signal::new(0),
            DebounceConfig::new(0),
            |_: i32| async { Ok(()) },
        );
        assert!(matches!(outcome, Err(BridgeError::Config(_))));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn phases_follow_the_cycle() {
        let value = Signal::new(0);
        let scheduler = DebouncedCommit::new(Signal::new(true), value.clone(), quick(), |_: i32| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        })
        .unwrap();

        assert_eq!(scheduler.phase(), CommitPhase::Armed);
        assert_eq!(scheduler.generation(), 1);
        assert!(scheduler.busy().get());

        tokio::time::sleep(Duration::from_millis(110)).await;
        assert_eq!(scheduler.phase(), CommitPhase::Committing);
        assert!(scheduler.busy().get());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(scheduler.phase(), CommitPhase::Idle);
        assert!(!scheduler.busy().get());
        assert_eq!(scheduler.commit_count(), 1);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn dispose_cancels_armed_timer() {
        let value = Signal::new(0);
        let scheduler =
            DebouncedCommit::new(Signal::new(true), value.clone(), quick(), |_: i32| async { Ok(()) })
                .unwrap();

        assert!(scheduler.busy().get());
        scheduler.dispose();
        assert_eq!(scheduler.phase(), CommitPhase::Idle);
        assert!(!scheduler.busy().get());

        value.set(1);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(scheduler.commit_count(), 0);
        assert_eq!(scheduler.generation(), 1);
        assert!(scheduler.is_disposed());
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn panicking_commit_settles_with_task_error() {
        let scheduler = DebouncedCommit::new(Signal::new(true), Signal::new(0), quick(), |_: i32| async {
            if true {
                panic!("storage exploded");
            }
            Ok(())
        })
        .unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!scheduler.busy().get());
        assert!(matches!(scheduler.last_error().get(), Some(BridgeError::Task(_))));
    }
}
