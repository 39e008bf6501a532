// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Transport-level errors.

use thiserror::Error;
use uascope_codec::CodecError;

/// Result alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors raised by the OPC UA TCP transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Socket-level failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A message body failed to encode or decode.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// An endpoint URL could not be parsed.
    #[error("invalid endpoint url '{url}': {reason}")]
    InvalidEndpointUrl {
        /// The offending URL.
        url: String,
        /// What was wrong with it.
        reason: &'static str,
    },

    /// A frame header carried an unknown message type code.
    #[error("unknown message type {0:?}")]
    UnknownMessageType([u8; 3]),

    /// A frame header carried an unknown chunk type byte.
    #[error("unknown chunk type 0x{0:02x}")]
    UnknownChunkType(u8),

    /// A frame declared a size outside the negotiated limits.
    #[error("frame size {size} exceeds limit {max}")]
    FrameTooLarge {
        /// Declared frame size.
        size: u32,
        /// Negotiated receive buffer size.
        max: u32,
    },

    /// A frame declared a size smaller than its own header.
    #[error("frame size {0} is smaller than the 8-byte header")]
    FrameTooSmall(u32),

    /// A reassembled message exceeded the negotiated maximum.
    #[error("message size {size} exceeds negotiated maximum {max}")]
    MessageTooLarge {
        /// Accumulated message size.
        size: usize,
        /// Negotiated maximum message size.
        max: u32,
    },

    /// More chunks arrived than the negotiated maximum.
    #[error("chunk count exceeds negotiated maximum {max}")]
    TooManyChunks {
        /// Negotiated maximum chunk count.
        max: u32,
    },

    /// The peer's acknowledge carried an unsupported protocol version.
    #[error("peer negotiated unsupported protocol version {0}")]
    UnsupportedProtocolVersion(u32),

    /// The peer answered the hello with an ERR message.
    #[error("connection rejected: status 0x{code:08x}{}", format_reason(.reason))]
    Rejected {
        /// Status code from the ERR message.
        code: u32,
        /// Optional reason text.
        reason: Option<String>,
    },

    /// The peer sent an ERR message on an established connection.
    #[error("peer error: status 0x{code:08x}{}", format_reason(.reason))]
    PeerError {
        /// Status code from the ERR message.
        code: u32,
        /// Optional reason text.
        reason: Option<String>,
    },

    /// The peer aborted a chunked message.
    #[error("message aborted by peer: status 0x{code:08x}{}", format_reason(.reason))]
    Aborted {
        /// Status code from the abort chunk.
        code: u32,
        /// Optional reason text.
        reason: Option<String>,
    },

    /// A different message type arrived than the exchange allows.
    #[error("unexpected {actual} message, expected {expected}")]
    UnexpectedMessage {
        /// What the exchange expected.
        expected: &'static str,
        /// What actually arrived.
        actual: &'static str,
    },

    /// Chunks of one message disagreed on the request id.
    #[error("request id changed mid-message: started {started}, got {got}")]
    RequestIdMismatch {
        /// Request id of the first chunk.
        started: u32,
        /// Request id of the offending chunk.
        got: u32,
    },

    /// Chunk sequence numbers did not increase monotonically.
    #[error("sequence number went backwards: {previous} then {got}")]
    SequenceRegression {
        /// Sequence number of the previous chunk.
        previous: u32,
        /// Sequence number of the offending chunk.
        got: u32,
    },

    /// Chunks of one message disagreed on the secure channel id.
    #[error("secure channel id changed mid-message: started {started}, got {got}")]
    ChannelIdMismatch {
        /// Channel id of the first chunk.
        started: u32,
        /// Channel id of the offending chunk.
        got: u32,
    },

    /// The peer acknowledged a buffer size below the protocol minimum.
    #[error("acknowledged buffer size {size} is below the minimum {min}")]
    BufferTooSmall {
        /// The acknowledged buffer size.
        size: u32,
        /// The smallest size the protocol allows.
        min: u32,
    },
}

impl TransportError {
    /// Returns `true` if the connection is unusable after this error and
    /// must be re-established.
    pub fn is_fatal(&self) -> bool {
        // An abort only drops one message; everything else poisons the
        // stream state or the socket itself.
        !matches!(self, Self::Aborted { .. })
    }
}

fn format_reason(reason: &Option<String>) -> String {
    match reason {
        Some(text) => format!(" ({text})"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_is_not_fatal() {
        let abort = TransportError::Aborted {
            code: 0x80B1_0000,
            reason: None,
        };
        assert!(!abort.is_fatal());
        assert!(TransportError::ConnectionClosed.is_fatal());
    }

    #[test]
    fn test_rejection_formats_reason() {
        let err = TransportError::Rejected {
            code: 0x8082_0000,
            reason: Some("too many connections".to_string()),
        };
        let text = err.to_string();
        assert!(text.contains("0x80820000"));
        assert!(text.contains("too many connections"));
    }
}
