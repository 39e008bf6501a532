// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Client-level errors.

use thiserror::Error;
use uascope_codec::{CodecError, StatusCode};
use uascope_transport::TransportError;

use crate::config::SecurityMode;

/// Result alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors raised by the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Encoding or decoding failure.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The configured security mode has no wire implementation.
    #[error("security mode {mode:?} is not supported; only None is implemented")]
    SecurityModeUnsupported {
        /// The rejected mode.
        mode: SecurityMode,
    },

    /// Discovery found no endpoint matching the configuration.
    #[error("no suitable endpoint: {reason}")]
    NoSuitableEndpoint {
        /// Why every advertised endpoint was rejected.
        reason: &'static str,
    },

    /// The server answered a service call with a bad status.
    #[error("{operation} failed with {status}")]
    ServiceFault {
        /// The operation that failed.
        operation: &'static str,
        /// Service-level status code.
        status: StatusCode,
    },

    /// A service call did not complete within the configured timeout.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        /// The operation that timed out.
        operation: &'static str,
        /// The timeout that elapsed.
        timeout_ms: u64,
    },

    /// The connection dropped while the call was in flight. The connection
    /// task is reconnecting in the background; the call may be retried.
    #[error("connection lost while request was in flight")]
    ConnectionLost,

    /// The client has been disconnected and the connection task is gone.
    #[error("client is disconnected")]
    Disconnected,

    /// A response arrived but was not the message type the call expected.
    #[error("{operation} returned an unexpected response")]
    UnexpectedResponse {
        /// The operation whose response was malformed.
        operation: &'static str,
    },

    /// The server did not return a result entry for a request entry.
    #[error("{operation} returned {got} results for {expected} requests")]
    ResultCountMismatch {
        /// The operation concerned.
        operation: &'static str,
        /// Number of request entries.
        expected: usize,
        /// Number of result entries.
        got: usize,
    },

    /// The subscription was deleted or its channel is gone.
    #[error("subscription {0} is no longer active")]
    SubscriptionGone(u32),
}

impl ClientError {
    /// Builds a service fault error.
    pub fn fault(operation: &'static str, status: StatusCode) -> Self {
        Self::ServiceFault { operation, status }
    }

    /// Builds a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Returns `true` if retrying the same call can reasonably succeed,
    /// possibly after the background reconnect completes.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => !matches!(e, TransportError::InvalidEndpointUrl { .. }),
            Self::Timeout { .. } | Self::ConnectionLost => true,
            Self::ServiceFault { status, .. } => status_is_retryable(*status),
            Self::Codec(_)
            | Self::Config(_)
            | Self::SecurityModeUnsupported { .. }
            | Self::NoSuitableEndpoint { .. }
            | Self::Disconnected
            | Self::UnexpectedResponse { .. }
            | Self::ResultCountMismatch { .. }
            | Self::SubscriptionGone(_) => false,
        }
    }
}

/// Status codes that indicate a transient server condition.
fn status_is_retryable(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_TIMEOUT
            | StatusCode::BAD_TOO_MANY_OPERATIONS
            | StatusCode::BAD_TOO_MANY_PUBLISH_REQUESTS
            | StatusCode::BAD_SESSION_ID_INVALID
            | StatusCode::BAD_SESSION_NOT_ACTIVATED
            | StatusCode::BAD_SECURE_CHANNEL_ID_INVALID
            | StatusCode::BAD_CONNECTION_CLOSED
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability() {
        assert!(ClientError::ConnectionLost.is_retryable());
        assert!(ClientError::fault("read", StatusCode::BAD_TIMEOUT).is_retryable());
        assert!(!ClientError::fault("read", StatusCode::BAD_NODE_ID_UNKNOWN).is_retryable());
        assert!(!ClientError::config("bad endpoint").is_retryable());
        assert!(!ClientError::Disconnected.is_retryable());
    }
}
