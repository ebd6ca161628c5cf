//! Settle Core
//!
//! This crate bridges callback-driven async state into a reactive graph and
//! persists reactive state once it settles. It implements:
//!
//! - Reactive primitives (signals, memos, effects with cleanup)
//! - Query and mutation bridges over observer objects
//! - A query client that runs fetches and commits on tokio
//! - A debounced, cancellable commit scheduler
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives and dependency tracking
//! - `query`: Descriptors, observers, the query client, and the bridges
//! - `commit`: The debounced commit scheduler and its configuration
//! - `error`: The error type shared by all of the above
//!
//! # Example
//!
//! ```rust,no_run
//! use settle_core::commit::{DebounceConfig, DebouncedCommit};
//! use settle_core::query::{create_query_bridge, QueryClient, QueryDescriptor, QueryKey};
//! use settle_core::reactive::{Effect, Signal};
//!
//! # async fn demo() -> settle_core::error::Result<()> {
//! let client = QueryClient::new()?;
//!
//! // A query whose key follows a signal
//! let filter = Signal::new("open".to_string());
//! let tasks = create_query_bridge(
//!     {
//!         let filter = filter.clone();
//!         move || {
//!             let filter = filter.get();
//!             QueryDescriptor::new(QueryKey::new(["tasks", filter.as_str()]), || async {
//!                 Ok(vec!["Paint house".to_string()])
//!             })
//!         }
//!     },
//!     move || client.clone(),
//! )?;
//!
//! // React to results
//! let data = tasks.data();
//! let _log = Effect::new(move || println!("tasks: {:?}", data.get()));
//!
//! // Persist local edits one second after they stop
//! let loaded = Signal::new(true);
//! let draft = Signal::new(String::new());
//! let _autosave = DebouncedCommit::new(
//!     loaded,
//!     draft.clone(),
//!     DebounceConfig::default(),
//!     |text: String| async move {
//!         println!("saving {text}");
//!         Ok(())
//!     },
//! )?;
//!
//! draft.set("Paint house".into());
//! # Ok(())
//! # }
//! ```

pub mod commit;
pub mod error;
pub mod query;
pub mod reactive;

pub use commit::{CommitPhase, DebounceConfig, DebouncedCommit};
pub use error::{BridgeError, Result};
pub use query::{create_mutation_bridge, create_query_bridge, MutationBridge, QueryBridge, QueryClient};
