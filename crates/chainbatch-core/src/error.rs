//! Transport-level and queue-level error types.

use thiserror::Error;

use crate::request::JsonRpcError;

/// Errors raised by an upstream transport while executing a bulk call.
///
/// These describe the failure of the bulk call as a whole. A single call that
/// the upstream executed but rejected is reported as
/// [`CallOutcome::Failure`](crate::outcome::CallOutcome::Failure) instead.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connection refused, non-2xx status, bad body).
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON-RPC protocol-level error returned for the whole request.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// The bulk call did not complete within the configured duration.
    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The transport returned a different number of outcomes than calls.
    #[error("Transport returned {actual} outcomes for {expected} calls")]
    LengthMismatch { expected: usize, actual: usize },

    /// No transport is registered for the requested network.
    #[error("No transport registered for network {0}")]
    UnknownNetwork(u64),

    /// Response could not be deserialized.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// An unexpected error.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Returns `true` if the error happened before or on the wire
    /// (as opposed to an error object returned by the node).
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Timeout { .. })
    }
}

/// Errors surfaced to a caller waiting on a queued read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    /// The queue task is gone; nothing can be enqueued any more.
    #[error("batch queue closed")]
    QueueClosed,

    /// The request was dropped before it was settled.
    #[error("request abandoned before settlement")]
    Abandoned,

    /// The bulk call failed as a whole (only reported with `FailureMode::Report`).
    #[error("transport failure: {0}")]
    Transport(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_errors() {
        assert!(TransportError::Http("refused".into()).is_connection_error());
        assert!(TransportError::Timeout { ms: 10 }.is_connection_error());
        assert!(!TransportError::UnknownNetwork(1).is_connection_error());
    }

    #[test]
    fn length_mismatch_message() {
        let e = TransportError::LengthMismatch { expected: 3, actual: 2 };
        assert_eq!(e.to_string(), "Transport returned 2 outcomes for 3 calls");
    }
}
