//! Reactive Primitives
//!
//! This module implements the reactive substrate the bridge and the commit
//! scheduler run on: signals, memos, and effects.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (a memo or effect), the signal registers that
//! context as a dependent. When the value is set, all dependents are
//! notified synchronously.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result. It re-evaluates only
//! when one of its dependencies changed, and its dependents only hear about
//! it when the re-evaluated value differs.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Effects synchronize reactive state with the outside
//! world (subscriptions, timers) and may return a [`Cleanup`] that runs
//! before the next run and at teardown.
//!
//! # Implementation Notes
//!
//! A thread-local tracking context detects dependencies automatically: when
//! a signal is read, we check whether a computation is running and, if so,
//! record the dependency with the [`Runtime`].

mod context;
mod effect;
mod memo;
mod read;
mod runtime;
mod signal;
mod subscriber;

pub use context::ReactiveContext;
pub use effect::{Cleanup, Effect};
pub use memo::{Memo, MemoState};
pub use read::ReadCell;
pub use runtime::{Reactive, ReactiveHandle, Runtime, Source};
pub use signal::{ReadSignal, Signal};
pub use subscriber::{SourceId, Subscriber, SubscriberId};
