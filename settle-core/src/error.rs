//! Error types for the bridge and the commit scheduler.

use thiserror::Error;

/// Errors produced by descriptors, observers, and the commit scheduler.
///
/// Errors are cloneable and comparable so they can live inside reactive
/// cells (a [`ResultState`](crate::query::ResultState) carries one).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// A descriptor factory failed or produced an invalid descriptor.
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// A query fetch failed.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// A mutation or debounced commit failed.
    #[error("commit failed: {0}")]
    Commit(String),

    /// A spawned fetch or commit task panicked or was aborted.
    #[error("task failed: {0}")]
    Task(String),

    /// No tokio runtime was available to spawn work on.
    #[error("no async runtime available: {0}")]
    NoRuntime(String),

    /// Configuration could not be parsed or is out of range.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl BridgeError {
    /// Build a fetch error from anything displayable.
    pub fn fetch(err: impl std::fmt::Display) -> Self {
        Self::Fetch(err.to_string())
    }

    /// Build a commit error from anything displayable.
    pub fn commit(err: impl std::fmt::Display) -> Self {
        Self::Commit(err.to_string())
    }
}

impl From<tokio::task::JoinError> for BridgeError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

impl From<tokio::runtime::TryCurrentError> for BridgeError {
    fn from(err: tokio::runtime::TryCurrentError) -> Self {
        Self::NoRuntime(err.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failure() {
        assert_eq!(
            BridgeError::fetch("timeout").to_string(),
            "fetch failed: timeout"
        );
        assert_eq!(
            BridgeError::commit("disk full").to_string(),
            "commit failed: disk full"
        );
    }

    #[test]
    fn json_errors_become_config_errors() {
        let err: BridgeError = serde_json::from_str::<u64>("nope").unwrap_err().into();
        assert!(matches!(err, BridgeError::Config(_)));
    }
}
