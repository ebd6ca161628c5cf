//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal or memo is read,
//! the current computation is registered as a dependent.
//!
//! # Implementation
//!
//! We use a thread-local stack to track the currently executing computation.
//! When entering a reactive context (running a memo or effect), we push the
//! subscriber onto the stack. When the computation completes, we pop it.
//!
//! Nested contexts are supported (a memo that reads from another memo
//! recomputes inside the reader's context).

use std::cell::RefCell;

use smallvec::SmallVec;

use super::subscriber::{SourceId, SubscriberId};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = RefCell::new(Vec::new());
}

/// An entry in the reactive context stack.
#[derive(Debug, Clone)]
struct ContextEntry {
    subscriber_id: SubscriberId,
    /// Sources read during this computation with the version seen at the
    /// first read, in first-read order.
    dependencies: SmallVec<[(SourceId, u64); 8]>,
}

/// Guard that pops the context when dropped.
///
/// This keeps the stack balanced even if the computation panics.
pub struct ReactiveContext {
    subscriber_id: SubscriberId,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given subscriber.
    ///
    /// The context is exited when the returned guard is dropped.
    pub fn enter(subscriber_id: SubscriberId) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                subscriber_id,
                dependencies: SmallVec::new(),
            });
        });

        Self { subscriber_id }
    }

    /// Check if there is an active reactive context.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().map(|entry| entry.subscriber_id))
    }

    /// Record a dependency on the given source at the version just read.
    ///
    /// Repeated reads of the same source are recorded once and keep the
    /// first version, so a write between two reads still counts as a change.
    pub fn track_dependency(source_id: SourceId, version: u64) {
        CONTEXT_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                if !entry.dependencies.iter().any(|(id, _)| *id == source_id) {
                    entry.dependencies.push((source_id, version));
                }
            }
        });
    }

    /// Get the dependencies collected in the current context.
    pub fn get_dependencies() -> Vec<(SourceId, u64)> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|entry| entry.dependencies.to_vec())
                .unwrap_or_default()
        })
    }

    /// Run `f` with tracking suspended.
    ///
    /// Reads inside `f` do not register dependencies on any enclosing
    /// computation. The stack is restored afterwards, even on panic.
    pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
        struct Restore(Option<Vec<ContextEntry>>);

        impl Drop for Restore {
            fn drop(&mut self) {
                if let Some(saved) = self.0.take() {
                    CONTEXT_STACK.with(|stack| *stack.borrow_mut() = saved);
                }
            }
        }

        let saved = CONTEXT_STACK.with(|stack| std::mem::take(&mut *stack.borrow_mut()));
        let _restore = Restore(Some(saved));
        f()
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.subscriber_id, self.subscriber_id,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.subscriber_id, entry.subscriber_id
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_tracks_subscriber() {
        let id = SubscriberId::new();

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());

        {
            let _ctx = ReactiveContext::enter(id);

            assert!(ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current_subscriber(), Some(id));
        }

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn context_deduplicates_dependencies() {
        let id = SubscriberId::new();
        let _ctx = ReactiveContext::enter(id);

        let (a, b) = (SourceId::new(), SourceId::new());
        ReactiveContext::track_dependency(a, 1);
        ReactiveContext::track_dependency(b, 4);
        ReactiveContext::track_dependency(a, 2);

        assert_eq!(ReactiveContext::get_dependencies(), vec![(a, 1), (b, 4)]);
    }

    #[test]
    fn nested_contexts() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();

        {
            let _ctx1 = ReactiveContext::enter(id1);
            assert_eq!(ReactiveContext::current_subscriber(), Some(id1));

            {
                let _ctx2 = ReactiveContext::enter(id2);
                assert_eq!(ReactiveContext::current_subscriber(), Some(id2));
            }

            assert_eq!(ReactiveContext::current_subscriber(), Some(id1));
        }

        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn untracked_hides_and_restores_stack() {
        let id = SubscriberId::new();
        let _ctx = ReactiveContext::enter(id);

        ReactiveContext::untracked(|| {
            assert!(!ReactiveContext::is_active());
            ReactiveContext::track_dependency(SourceId::new(), 0);
        });

        assert_eq!(ReactiveContext::current_subscriber(), Some(id));
        assert!(ReactiveContext::get_dependencies().is_empty());
    }
}
