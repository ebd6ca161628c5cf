//! Query and Mutation Bridges
//!
//! A bridge turns a callback-driven observer into reactive cells.
//!
//! # How a Bridge Is Wired
//!
//! 1. A descriptor memo runs the factory. Equal descriptors leave the
//!    memo's version untouched, so downstream cells see no change.
//! 2. A context memo runs the context provider.
//! 3. An observer memo builds a fresh observer whenever the context or the
//!    descriptor changes identity. Building an observer does not subscribe.
//! 4. A subscribe effect reads the observer memo, seeds the result cell with
//!    the observer's current result and subscribes. Its cleanup unsubscribes,
//!    and the effect always runs its cleanup before the next run, so the old
//!    subscription is released before the new one is taken.
//! 5. Projection memos expose the fields of the result cell.
//!
//! A descriptor failure is cached in the descriptor memo and returned by
//! [`QueryBridge::descriptor`]; while it persists the bridge holds no
//! subscription.

use std::sync::Arc;

use futures_util::future::{self, BoxFuture};
use futures_util::FutureExt;

use super::descriptor::{MutationDescriptor, QueryDescriptor};
use super::observer::{Listener, MutationObserver, Observer, ObserverSlot, QueryContext};
use super::state::ResultState;
use crate::error::{BridgeError, Result};
use crate::reactive::{Cleanup, Effect, Memo, ReadSignal, Runtime, Signal};

type SlotMemo<O> = Memo<Result<ObserverSlot<O>, BridgeError>>;

/// Subscribe the result cell to whatever observer the memo currently holds.
fn attach<T, O>(observer: &SlotMemo<O>, result: &Signal<ResultState<T>>) -> Cleanup
where
    T: Clone + Send + Sync + PartialEq + 'static,
    O: Observer<T> + ?Sized + 'static,
{
    let slot = match observer.get() {
        Ok(slot) => slot,
        Err(err) => {
            tracing::warn!(error = %err, "no observer to subscribe to");
            return Cleanup::none();
        }
    };

    Runtime::untrack(|| {
        result.set(slot.current_result());

        let listener: Listener<T> = Arc::new({
            let result = result.clone();
            move |state| result.set(state)
        });
        let subscription = slot.subscribe(listener);
        tracing::debug!(observer = slot.serial(), "bridge subscribed");

        let serial = slot.serial();
        Cleanup::new(move || {
            subscription.unsubscribe();
            tracing::debug!(observer = serial, "bridge unsubscribed");
        })
    })
}

/// Reactive view of a query observer.
pub struct QueryBridge<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    descriptor: Memo<Result<QueryDescriptor<T>, BridgeError>>,
    observer: SlotMemo<dyn Observer<T>>,
    result: Signal<ResultState<T>>,
    effect: Effect,
    data: Memo<Option<T>>,
    error: Memo<Option<BridgeError>>,
    is_loading: Memo<bool>,
    is_fetching: Memo<bool>,
}

/// Create a query bridge.
///
/// `factory` builds the descriptor and may read reactive cells; when those
/// change and the new key differs, the bridge moves to a new observer.
/// `context` supplies the execution context the observer is created on.
///
/// Fails if the factory fails on its first evaluation.
///
/// ```rust,no_run
/// use settle_core::query::{create_query_bridge, QueryClient, QueryDescriptor, QueryKey};
/// use settle_core::reactive::Signal;
///
/// # async fn demo() -> settle_core::error::Result<()> {
/// let client = QueryClient::new()?;
/// let user = Signal::new(1_i64);
///
/// let reminders = create_query_bridge(
///     {
///         let user = user.clone();
///         move || {
///             let id = user.get();
///             QueryDescriptor::new(QueryKey::new(["reminders"]).with(id), move || async move {
///                 Ok(vec![format!("reminder for {id}")])
///             })
///         }
///     },
///     move || client.clone(),
/// )?;
///
/// assert!(reminders.is_loading().get());
/// # Ok(())
/// # }
/// ```
pub fn create_query_bridge<T, C, F, P>(factory: F, context: P) -> Result<QueryBridge<T>>
where
    T: Clone + Send + Sync + PartialEq + 'static,
    C: QueryContext,
    F: Fn() -> Result<QueryDescriptor<T>> + Send + Sync + 'static,
    P: Fn() -> C + Send + Sync + 'static,
{
    let descriptor = Memo::new(factory);
    let initial = descriptor.get_untracked()?;
    tracing::debug!(key = %initial.key(), "creating query bridge");

    let context = Memo::new(context);
    let observer: SlotMemo<dyn Observer<T>> = Memo::new({
        let descriptor = descriptor.clone();
        move || {
            let context = context.get();
            let descriptor = descriptor.get()?;
            Ok(ObserverSlot::new(context.query_observer(descriptor)))
        }
    });

    let result = Signal::new(ResultState::idle());
    let effect = Effect::with_cleanup({
        let observer = observer.clone();
        let result = result.clone();
        move || attach(&observer, &result)
    });

    let data = Memo::new({
        let result = result.clone();
        move || result.get().data
    });
    let error = Memo::new({
        let result = result.clone();
        move || result.get().error
    });
    let is_loading = Memo::new({
        let result = result.clone();
        move || result.get().is_loading
    });
    let is_fetching = Memo::new({
        let result = result.clone();
        move || result.get().is_fetching
    });

    Ok(QueryBridge {
        descriptor,
        observer,
        result,
        effect,
        data,
        error,
        is_loading,
        is_fetching,
    })
}

impl<T> QueryBridge<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    pub fn data(&self) -> Memo<Option<T>> {
        self.data.clone()
    }

    pub fn error(&self) -> Memo<Option<BridgeError>> {
        self.error.clone()
    }

    pub fn is_loading(&self) -> Memo<bool> {
        self.is_loading.clone()
    }

    pub fn is_fetching(&self) -> Memo<bool> {
        self.is_fetching.clone()
    }

    /// The full result record.
    pub fn result(&self) -> ReadSignal<ResultState<T>> {
        self.result.read_only()
    }

    /// The current descriptor, or the factory's failure.
    pub fn descriptor(&self) -> Result<QueryDescriptor<T>> {
        self.descriptor.get()
    }

    /// Ask the current observer to fetch again.
    pub fn refetch(&self) {
        if let Ok(slot) = self.observer.get_untracked() {
            slot.refetch();
        }
    }

    /// Release the subscription and stop following the descriptor.
    pub fn dispose(&self) {
        self.effect.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.effect.is_disposed()
    }
}

impl<T> std::fmt::Debug for QueryBridge<T>
where
    T: Clone + Send + Sync + PartialEq + std::fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryBridge")
            .field("result", &self.result.get_untracked())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Reactive view of a mutation observer.
pub struct MutationBridge<T, V>
where
    T: Clone + Send + Sync + PartialEq + 'static,
    V: Send + 'static,
{
    observer: SlotMemo<dyn MutationObserver<T, V>>,
    result: Signal<ResultState<T>>,
    effect: Effect,
    data: Memo<Option<T>>,
    error: Memo<Option<BridgeError>>,
    is_pending: Memo<bool>,
}

/// Create a mutation bridge.
///
/// Mutations have no identity, so every recompute of `factory` produces a
/// new observer.
pub fn create_mutation_bridge<T, V, C, F, P>(factory: F, context: P) -> Result<MutationBridge<T, V>>
where
    T: Clone + Send + Sync + PartialEq + 'static,
    V: Send + 'static,
    C: QueryContext,
    F: Fn() -> Result<MutationDescriptor<T, V>> + Send + Sync + 'static,
    P: Fn() -> C + Send + Sync + 'static,
{
    let descriptor = Memo::new(factory);
    descriptor.get_untracked()?;
    tracing::debug!("creating mutation bridge");

    let context = Memo::new(context);
    let observer: SlotMemo<dyn MutationObserver<T, V>> = Memo::new(move || {
        let context = context.get();
        let descriptor = descriptor.get()?;
        Ok(ObserverSlot::new(context.mutation_observer(descriptor)))
    });

    let result = Signal::new(ResultState::mutation_idle());
    let effect = Effect::with_cleanup({
        let observer = observer.clone();
        let result = result.clone();
        move || attach(&observer, &result)
    });

    let data = Memo::new({
        let result = result.clone();
        move || result.get().data
    });
    let error = Memo::new({
        let result = result.clone();
        move || result.get().error
    });
    let is_pending = Memo::new({
        let result = result.clone();
        move || result.get().is_pending
    });

    Ok(MutationBridge {
        observer,
        result,
        effect,
        data,
        error,
        is_pending,
    })
}

impl<T, V> MutationBridge<T, V>
where
    T: Clone + Send + Sync + PartialEq + 'static,
    V: Send + 'static,
{
    pub fn is_pending(&self) -> Memo<bool> {
        self.is_pending.clone()
    }

    pub fn data(&self) -> Memo<Option<T>> {
        self.data.clone()
    }

    pub fn error(&self) -> Memo<Option<BridgeError>> {
        self.error.clone()
    }

    pub fn result(&self) -> ReadSignal<ResultState<T>> {
        self.result.read_only()
    }

    /// Start a commit on the current observer.
    ///
    /// `is_pending` is set before this returns. The future resolves with
    /// the commit's outcome; dropping it does not cancel the commit.
    pub fn invoke(&self, input: V) -> BoxFuture<'static, Result<T>> {
        match self.observer.get_untracked() {
            Ok(slot) => slot.mutate(input),
            Err(err) => future::ready(Err(err)).boxed(),
        }
    }

    pub fn dispose(&self) {
        self.effect.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.effect.is_disposed()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
