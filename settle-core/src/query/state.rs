//! The result record observers report.

use crate::error::BridgeError;

/// Snapshot of an observer's async operation.
///
/// Invariants kept by every transition below:
/// - `is_loading` implies `data` is `None`;
/// - a failure sets `error` and keeps the last successful `data`.
///
/// For queries `is_pending` means "no data yet". For mutations it means
/// "a commit is in flight".
#[derive(Debug, Clone, PartialEq)]
pub struct ResultState<T> {
    pub data: Option<T>,
    pub error: Option<BridgeError>,
    pub is_loading: bool,
    pub is_fetching: bool,
    pub is_pending: bool,
}

impl<T> Default for ResultState<T> {
    fn default() -> Self {
        Self::idle()
    }
}

impl<T> ResultState<T> {
    /// Nothing fetched yet and nothing running.
    pub fn idle() -> Self {
        Self {
            data: None,
            error: None,
            is_loading: false,
            is_fetching: false,
            is_pending: true,
        }
    }

    /// Idle, optionally seeded with previously fetched data.
    pub fn with_data(data: Option<T>) -> Self {
        let is_pending = data.is_none();
        Self {
            data,
            error: None,
            is_loading: false,
            is_fetching: false,
            is_pending,
        }
    }

    /// A mutation that has not been invoked yet.
    pub fn mutation_idle() -> Self {
        Self {
            is_pending: false,
            ..Self::idle()
        }
    }

    /// A query fetch started.
    pub fn fetch_started(self) -> Self {
        let empty = self.data.is_none();
        Self {
            is_loading: empty,
            is_fetching: true,
            is_pending: empty,
            ..self
        }
    }

    /// A query fetch resolved.
    pub fn fetch_succeeded(self, data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            is_loading: false,
            is_fetching: false,
            is_pending: false,
        }
    }

    /// A query fetch rejected. Data is retained.
    pub fn fetch_failed(self, error: BridgeError) -> Self {
        let is_pending = self.data.is_none();
        Self {
            error: Some(error),
            is_loading: false,
            is_fetching: false,
            is_pending,
            ..self
        }
    }

    /// A mutation commit started.
    pub fn mutation_started(self) -> Self {
        Self {
            error: None,
            is_loading: false,
            is_fetching: true,
            is_pending: true,
            ..self
        }
    }

    /// A mutation commit settled.
    pub fn mutation_settled(self, outcome: Result<T, BridgeError>) -> Self {
        let (data, error) = match outcome {
            Ok(data) => (Some(data), None),
            Err(error) => (self.data, Some(error)),
        };
        Self {
            data,
            error,
            is_loading: false,
            is_fetching: false,
            is_pending: false,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.data.is_some() && !self.is_fetching
    }
}
