//! Debounced, cancellable commits of reactive state.

pub mod config;
pub mod pending;
pub mod scheduler;

pub use config::DebounceConfig;
pub use pending::PendingCommit;
pub use scheduler::{CommitPhase, DebouncedCommit};
