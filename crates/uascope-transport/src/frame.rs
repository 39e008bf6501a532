// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Frame headers and connection-establishment messages.
//!
//! Every frame starts with an 8-byte header: a 3-byte ASCII message type, a
//! 1-byte chunk type and a u32 total frame size (header included). HEL, ACK
//! and ERR always travel as a single final chunk; OPN, CLO and MSG carry the
//! security and sequence headers of a secured conversation.

use uascope_codec::encoding::{BinaryDecode, BinaryEncode, Decoder, Encoder};
use uascope_codec::error::{CodecError, CodecResult};

use crate::error::{TransportError, TransportResult};

/// The protocol version this implementation speaks.
pub const PROTOCOL_VERSION: u32 = 0;

/// Size of the fixed frame header.
pub const FRAME_HEADER_SIZE: usize = 8;

/// Cap on strings inside connection-establishment messages.
pub const MAX_HANDSHAKE_STRING: usize = 4096;

/// Hello, acknowledge and error messages arrive before any limits are
/// negotiated, so their strings carry their own cap.
fn check_handshake_string(text: &str) -> CodecResult<()> {
    if text.len() > MAX_HANDSHAKE_STRING {
        return Err(CodecError::StringTooLong {
            length: text.len(),
            max: MAX_HANDSHAKE_STRING,
        });
    }
    Ok(())
}

// =============================================================================
// Header
// =============================================================================

/// The 3-byte message type code of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Client hello.
    Hello,
    /// Server acknowledge.
    Acknowledge,
    /// Error notification; the sender closes the connection after it.
    Error,
    /// OpenSecureChannel exchange.
    OpenChannel,
    /// CloseSecureChannel message.
    CloseChannel,
    /// A service message on an open channel.
    Message,
}

impl MessageKind {
    /// The wire code of this message kind.
    pub fn code(self) -> [u8; 3] {
        match self {
            Self::Hello => *b"HEL",
            Self::Acknowledge => *b"ACK",
            Self::Error => *b"ERR",
            Self::OpenChannel => *b"OPN",
            Self::CloseChannel => *b"CLO",
            Self::Message => *b"MSG",
        }
    }

    /// Parses a wire code.
    pub fn from_code(code: [u8; 3]) -> TransportResult<Self> {
        match &code {
            b"HEL" => Ok(Self::Hello),
            b"ACK" => Ok(Self::Acknowledge),
            b"ERR" => Ok(Self::Error),
            b"OPN" => Ok(Self::OpenChannel),
            b"CLO" => Ok(Self::CloseChannel),
            b"MSG" => Ok(Self::Message),
            _ => Err(TransportError::UnknownMessageType(code)),
        }
    }

    /// Human-readable name for log messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Hello => "HEL",
            Self::Acknowledge => "ACK",
            Self::Error => "ERR",
            Self::OpenChannel => "OPN",
            Self::CloseChannel => "CLO",
            Self::Message => "MSG",
        }
    }
}

/// The chunk type byte of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    /// Final (or only) chunk of a message.
    Final,
    /// An intermediate chunk; more follow.
    Intermediate,
    /// The sender abandoned the message; the body carries a status and
    /// reason.
    Abort,
}

impl ChunkKind {
    /// The wire byte of this chunk kind.
    pub fn code(self) -> u8 {
        match self {
            Self::Final => b'F',
            Self::Intermediate => b'C',
            Self::Abort => b'A',
        }
    }

    /// Parses a wire byte.
    pub fn from_code(code: u8) -> TransportResult<Self> {
        match code {
            b'F' => Ok(Self::Final),
            b'C' => Ok(Self::Intermediate),
            b'A' => Ok(Self::Abort),
            other => Err(TransportError::UnknownChunkType(other)),
        }
    }
}

/// The fixed 8-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Message type.
    pub kind: MessageKind,
    /// Chunk type.
    pub chunk: ChunkKind,
    /// Total frame size, header included.
    pub size: u32,
}

impl FrameHeader {
    /// Builds a header for a frame with `body_len` bytes after the header.
    pub fn for_body(kind: MessageKind, chunk: ChunkKind, body_len: usize) -> Self {
        Self {
            kind,
            chunk,
            size: (FRAME_HEADER_SIZE + body_len) as u32,
        }
    }

    /// Serializes the header into its 8 wire bytes.
    pub fn to_bytes(self) -> [u8; FRAME_HEADER_SIZE] {
        let mut bytes = [0u8; FRAME_HEADER_SIZE];
        bytes[..3].copy_from_slice(&self.kind.code());
        bytes[3] = self.chunk.code();
        bytes[4..].copy_from_slice(&self.size.to_le_bytes());
        bytes
    }

    /// Parses the 8 wire bytes of a header.
    pub fn from_bytes(bytes: [u8; FRAME_HEADER_SIZE]) -> TransportResult<Self> {
        let kind = MessageKind::from_code([bytes[0], bytes[1], bytes[2]])?;
        let chunk = ChunkKind::from_code(bytes[3])?;
        let size = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if (size as usize) < FRAME_HEADER_SIZE {
            return Err(TransportError::FrameTooSmall(size));
        }
        Ok(Self { kind, chunk, size })
    }

    /// Number of body bytes following the header.
    pub fn body_len(self) -> usize {
        self.size as usize - FRAME_HEADER_SIZE
    }
}

// =============================================================================
// Connection establishment messages
// =============================================================================

/// Client hello: protocol version, buffer limits and the endpoint URL.
#[derive(Debug, Clone)]
pub struct Hello {
    /// Protocol version (0).
    pub protocol_version: u32,
    /// Largest frame the client will accept.
    pub receive_buffer_size: u32,
    /// Largest frame the client will send.
    pub send_buffer_size: u32,
    /// Largest reassembled message the client will accept (0 = no limit).
    pub max_message_size: u32,
    /// Most chunks per message the client will accept (0 = no limit).
    pub max_chunk_count: u32,
    /// The endpoint URL being connected to.
    pub endpoint_url: String,
}

impl BinaryEncode for Hello {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        encoder.write_u32(self.protocol_version);
        encoder.write_u32(self.receive_buffer_size);
        encoder.write_u32(self.send_buffer_size);
        encoder.write_u32(self.max_message_size);
        encoder.write_u32(self.max_chunk_count);
        check_handshake_string(&self.endpoint_url)?;
        encoder.write_string(&self.endpoint_url)
    }
}

impl BinaryDecode for Hello {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        let hello = Self {
            protocol_version: decoder.read_u32()?,
            receive_buffer_size: decoder.read_u32()?,
            send_buffer_size: decoder.read_u32()?,
            max_message_size: decoder.read_u32()?,
            max_chunk_count: decoder.read_u32()?,
            endpoint_url: decoder.read_string()?,
        };
        check_handshake_string(&hello.endpoint_url)?;
        Ok(hello)
    }
}

/// Server acknowledge: the limits the server actually grants.
#[derive(Debug, Clone, Copy)]
pub struct Acknowledge {
    /// Protocol version the server speaks.
    pub protocol_version: u32,
    /// Largest frame the server will accept (so: largest we may send).
    pub receive_buffer_size: u32,
    /// Largest frame the server will send.
    pub send_buffer_size: u32,
    /// Largest reassembled message the server will accept (0 = no limit).
    pub max_message_size: u32,
    /// Most chunks per message the server will accept (0 = no limit).
    pub max_chunk_count: u32,
}

impl BinaryDecode for Acknowledge {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        Ok(Self {
            protocol_version: decoder.read_u32()?,
            receive_buffer_size: decoder.read_u32()?,
            send_buffer_size: decoder.read_u32()?,
            max_message_size: decoder.read_u32()?,
            max_chunk_count: decoder.read_u32()?,
        })
    }
}

/// ERR message body: a status code and an optional reason.
#[derive(Debug, Clone)]
pub struct ErrorMessage {
    /// The status code.
    pub error: u32,
    /// Optional reason text.
    pub reason: Option<String>,
}

impl BinaryDecode for ErrorMessage {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        let message = Self {
            error: decoder.read_u32()?,
            reason: decoder.read_opt_string()?,
        };
        if let Some(reason) = &message.reason {
            check_handshake_string(reason)?;
        }
        Ok(message)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_wire_layout() {
        let header = FrameHeader::for_body(MessageKind::Hello, ChunkKind::Final, 24);
        let bytes = header.to_bytes();
        assert_eq!(&bytes[..4], b"HELF");
        assert_eq!(u32::from_le_bytes(bytes[4..].try_into().unwrap()), 32);
        assert_eq!(FrameHeader::from_bytes(bytes).unwrap(), header);
    }

    #[test]
    fn test_header_rejects_unknown_codes() {
        let mut bytes = FrameHeader::for_body(MessageKind::Message, ChunkKind::Final, 0).to_bytes();
        bytes[0] = b'X';
        assert!(FrameHeader::from_bytes(bytes).is_err());

        let mut bytes = FrameHeader::for_body(MessageKind::Message, ChunkKind::Final, 0).to_bytes();
        bytes[3] = b'Z';
        assert!(FrameHeader::from_bytes(bytes).is_err());
    }

    #[test]
    fn test_header_rejects_undersized_frame() {
        let mut bytes = FrameHeader::for_body(MessageKind::Message, ChunkKind::Final, 0).to_bytes();
        bytes[4..].copy_from_slice(&4u32.to_le_bytes());
        assert!(matches!(
            FrameHeader::from_bytes(bytes),
            Err(TransportError::FrameTooSmall(4))
        ));
    }

    #[test]
    fn test_hello_round_trip() {
        let hello = Hello {
            protocol_version: PROTOCOL_VERSION,
            receive_buffer_size: 65536,
            send_buffer_size: 65536,
            max_message_size: 16 * 1024 * 1024,
            max_chunk_count: 4096,
            endpoint_url: "opc.tcp://localhost:4840".to_string(),
        };
        let bytes = hello.encode_to_vec().unwrap();
        let decoded = Hello::decode_from_slice(&bytes).unwrap();
        assert_eq!(decoded.endpoint_url, hello.endpoint_url);
        assert_eq!(decoded.receive_buffer_size, 65536);
    }

    #[test]
    fn test_hello_rejects_oversized_endpoint_url() {
        let hello = Hello {
            protocol_version: PROTOCOL_VERSION,
            receive_buffer_size: 65536,
            send_buffer_size: 65536,
            max_message_size: 0,
            max_chunk_count: 0,
            endpoint_url: "x".repeat(MAX_HANDSHAKE_STRING + 1),
        };
        assert!(matches!(
            hello.encode_to_vec(),
            Err(CodecError::StringTooLong { max: MAX_HANDSHAKE_STRING, .. })
        ));
    }

    #[test]
    fn test_error_message_rejects_oversized_reason() {
        let mut encoder = Encoder::new();
        encoder.write_u32(0x8082_0000);
        encoder
            .write_string(&"r".repeat(MAX_HANDSHAKE_STRING + 1))
            .unwrap();
        let bytes = encoder.finish();
        assert!(matches!(
            ErrorMessage::decode_from_slice(&bytes),
            Err(CodecError::StringTooLong { .. })
        ));
    }
}
