// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Negotiated transport limits.

use crate::frame::{Acknowledge, Hello, FRAME_HEADER_SIZE, PROTOCOL_VERSION};

/// Smallest buffer size either side may advertise.
pub const MIN_BUFFER_SIZE: u32 = 8192;

/// Buffer limits for one connection. Before the handshake these are the
/// values offered in the hello; [`TransportLimits::negotiate`] folds in the
/// server's acknowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportLimits {
    /// Largest frame we accept.
    pub receive_buffer_size: u32,
    /// Largest frame we send.
    pub send_buffer_size: u32,
    /// Largest reassembled message we accept (0 = no limit).
    pub max_message_size: u32,
    /// Most chunks per message we accept (0 = no limit).
    pub max_chunk_count: u32,
}

impl Default for TransportLimits {
    fn default() -> Self {
        Self {
            receive_buffer_size: 65536,
            send_buffer_size: 65536,
            max_message_size: 16 * 1024 * 1024,
            max_chunk_count: 4096,
        }
    }
}

impl TransportLimits {
    /// Builds the hello message offering these limits.
    pub fn to_hello(self, endpoint_url: impl Into<String>) -> Hello {
        Hello {
            protocol_version: PROTOCOL_VERSION,
            receive_buffer_size: self.receive_buffer_size.max(MIN_BUFFER_SIZE),
            send_buffer_size: self.send_buffer_size.max(MIN_BUFFER_SIZE),
            max_message_size: self.max_message_size,
            max_chunk_count: self.max_chunk_count,
            endpoint_url: endpoint_url.into(),
        }
    }

    /// Combines our offer with the server's acknowledge. Each side sends at
    /// most what the other side will receive, so the send buffer shrinks to
    /// the server's receive buffer and vice versa.
    pub fn negotiate(self, ack: &Acknowledge) -> Self {
        Self {
            receive_buffer_size: min_nonzero(self.receive_buffer_size, ack.send_buffer_size),
            send_buffer_size: min_nonzero(self.send_buffer_size, ack.receive_buffer_size),
            max_message_size: min_nonzero(self.max_message_size, ack.max_message_size),
            max_chunk_count: min_nonzero(self.max_chunk_count, ack.max_chunk_count),
        }
    }

    /// Largest MSG body that fits in one outbound chunk after the frame,
    /// channel and sequence headers.
    pub fn max_chunk_body(self) -> usize {
        // 8-byte frame header + 8 bytes channel/token id + 8-byte sequence
        // header.
        self.send_buffer_size as usize - FRAME_HEADER_SIZE - 16
    }
}

/// Minimum where zero means "unlimited".
fn min_nonzero(a: u32, b: u32) -> u32 {
    match (a, b) {
        (0, b) => b,
        (a, 0) => a,
        (a, b) => a.min(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiate_takes_cross_minimum() {
        let offered = TransportLimits::default();
        let ack = Acknowledge {
            protocol_version: 0,
            receive_buffer_size: 16384,
            send_buffer_size: 32768,
            max_message_size: 0,
            max_chunk_count: 64,
        };
        let negotiated = offered.negotiate(&ack);
        // We may send at most what the server receives.
        assert_eq!(negotiated.send_buffer_size, 16384);
        // We receive at most what we offered, bounded by what the server sends.
        assert_eq!(negotiated.receive_buffer_size, 32768);
        // Zero on one side means the other side's value wins.
        assert_eq!(negotiated.max_message_size, 16 * 1024 * 1024);
        assert_eq!(negotiated.max_chunk_count, 64);
    }

    #[test]
    fn test_max_chunk_body_subtracts_headers() {
        let limits = TransportLimits {
            send_buffer_size: 8192,
            ..Default::default()
        };
        assert_eq!(limits.max_chunk_body(), 8192 - 24);
    }
}
