//! Async-state bridge.
//!
//! Descriptors say what to fetch or commit, observers run the async work
//! and report through callbacks, and bridges turn those callbacks into
//! reactive cells:
//!
//! ```text
//!   factory ──► descriptor memo ──► observer memo ──► subscribe effect
//!                                        ▲                   │
//!   context provider ──► context memo ───┘                   ▼
//!                                              result signal ──► data / error / ...
//! ```

pub mod bridge;
pub mod client;
pub mod descriptor;
pub mod observer;
pub mod state;

pub use bridge::{create_mutation_bridge, create_query_bridge, MutationBridge, QueryBridge};
pub use client::{MutationRunner, QueryClient, QueryClientConfig, QueryObserver};
pub use descriptor::{CommitFn, FetchFn, KeyPart, MutationDescriptor, QueryDescriptor, QueryKey, SuccessFn};
pub use observer::{Listener, MutationObserver, Observer, ObserverSlot, QueryContext, Subscription};
pub use state::ResultState;
