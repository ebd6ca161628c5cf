//! Observer seams.
//!
//! An observer is an external stateful object that runs an async operation
//! and reports results to subscribers through callbacks. The bridge only
//! relies on the traits here; [`QueryClient`](super::QueryClient) is the
//! implementation shipped with the crate.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;

use super::descriptor::{MutationDescriptor, QueryDescriptor};
use super::state::ResultState;
use crate::error::Result;

/// Callback receiving every result an observer reports.
pub type Listener<T> = Arc<dyn Fn(ResultState<T>) + Send + Sync>;

/// Release guard for an observer subscription.
///
/// The listener is removed by [`Subscription::unsubscribe`] or when the
/// guard is dropped, whichever happens first.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new<F>(release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            release: Some(Box::new(release)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

/// An observer bound to one descriptor.
pub trait Observer<T>: Send + Sync {
    /// The last result, without subscribing.
    fn current_result(&self) -> ResultState<T>;

    /// Register a listener. The observer may start its operation on the
    /// first subscription.
    fn subscribe(&self, listener: Listener<T>) -> Subscription;

    /// Re-run the operation. Observers that cannot refetch ignore this.
    fn refetch(&self) {}
}

/// An observer whose operation is triggered explicitly.
pub trait MutationObserver<T, V>: Observer<T> {
    /// Start a commit. The observer reports `is_pending` before this
    /// returns; the returned future resolves with the commit's outcome.
    fn mutate(&self, input: V) -> BoxFuture<'static, Result<T>>;
}

/// The execution context observers are created against.
///
/// Contexts are cheap handles; equality is identity, so re-pointing a
/// bridge at another context recreates its observer.
pub trait QueryContext: Clone + PartialEq + Send + Sync + 'static {
    fn query_observer<T>(&self, descriptor: QueryDescriptor<T>) -> Arc<dyn Observer<T>>
    where
        T: Clone + Send + Sync + PartialEq + 'static;

    fn mutation_observer<T, V>(
        &self,
        descriptor: MutationDescriptor<T, V>,
    ) -> Arc<dyn MutationObserver<T, V>>
    where
        T: Clone + Send + Sync + PartialEq + 'static,
        V: Send + 'static;
}

/// An observer as held by a bridge.
///
/// Each slot gets a fresh serial, and equality compares serials, so a
/// derived cell holding a slot changes exactly when a new observer is
/// constructed.
pub struct ObserverSlot<O: ?Sized> {
    serial: u64,
    observer: Arc<O>,
}

impl<O: ?Sized> ObserverSlot<O> {
    pub fn new(observer: Arc<O>) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self {
            serial: COUNTER.fetch_add(1, Ordering::Relaxed),
            observer,
        }
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }
}

impl<O: ?Sized> Clone for ObserverSlot<O> {
    fn clone(&self) -> Self {
        Self {
            serial: self.serial,
            observer: Arc::clone(&self.observer),
        }
    }
}

impl<O: ?Sized> PartialEq for ObserverSlot<O> {
    fn eq(&self, other: &Self) -> bool {
        self.serial == other.serial
    }
}

impl<O: ?Sized> Deref for ObserverSlot<O> {
    type Target = O;

    fn deref(&self) -> &O {
        &self.observer
    }
}

impl<O: ?Sized> fmt::Debug for ObserverSlot<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverSlot")
            .field("serial", &self.serial)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    #[test]
    fn subscription_releases_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let sub = Subscription::new({
            let count = count.clone();
            move || {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });

        sub.unsubscribe();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_subscription_releases() {
        let released = Arc::new(AtomicBool::new(false));
        {
            let released = released.clone();
            let _sub = Subscription::new(move || released.store(true, Ordering::SeqCst));
        }
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn slots_compare_by_construction() {
        let shared = Arc::new(5_u8);
        let a = ObserverSlot::new(shared.clone());
        let b = ObserverSlot::new(shared);

        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(*a, 5);
    }
}
