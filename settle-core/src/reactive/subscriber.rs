//! Identifier and callback types for the reactive system.
//!
//! A Subscriber represents any computation that depends on reactive values.
//! This includes memos, effects, and imperative watchers on a signal.
//! A Source is anything that can be read inside a tracking context: signals
//! and memos.

use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a subscriber.
///
/// Each subscriber (memo, effect, or watcher) gets a unique ID when created.
/// This ID is used to track dependencies and avoid duplicate subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a readable reactive source (signal or memo).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

impl SourceId {
    /// Generate a new unique source ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

/// An imperative subscriber: a callback invoked after a value changes.
///
/// Signals keep a list of these for readers that live outside the
/// reactive graph and cannot be tracked automatically.
pub struct Subscriber {
    id: SubscriberId,
    notify: Box<dyn Fn() + Send + Sync>,
}

impl Subscriber {
    /// Create a new subscriber with the given notification callback.
    pub fn new<F>(notify: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            id: SubscriberId::new(),
            notify: Box::new(notify),
        }
    }

    /// Get the subscriber's unique ID.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Notify the subscriber that the watched value changed.
    pub fn notify(&self) {
        (self.notify)();
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber").field("id", &self.id).finish()
    }
}
