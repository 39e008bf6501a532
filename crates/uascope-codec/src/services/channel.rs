// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Secure channel services: OpenSecureChannel and CloseSecureChannel.

use crate::encoding::{BinaryDecode, BinaryEncode, Decoder, Encoder};
use crate::error::{CodecError, CodecResult};
use crate::types::UaDateTime;

use super::{RequestHeader, ResponseHeader, ServiceRequest, ServiceResponse};

// =============================================================================
// Enumerations
// =============================================================================

/// Whether the open request issues a new token or renews an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityTokenRequestType {
    /// Issue a token on a new channel.
    Issue = 0,
    /// Renew the token on an existing channel.
    Renew = 1,
}

/// Message security mode requested for the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSecurityMode {
    /// Mode was not specified.
    Invalid = 0,
    /// No signing or encryption.
    None = 1,
    /// Messages are signed.
    Sign = 2,
    /// Messages are signed and encrypted.
    SignAndEncrypt = 3,
}

impl BinaryDecode for MessageSecurityMode {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        match decoder.read_u32()? {
            0 => Ok(Self::Invalid),
            1 => Ok(Self::None),
            2 => Ok(Self::Sign),
            3 => Ok(Self::SignAndEncrypt),
            other => Err(CodecError::InvalidEnumValue {
                name: "MessageSecurityMode",
                value: i64::from(other),
            }),
        }
    }
}

// =============================================================================
// ChannelSecurityToken
// =============================================================================

/// Token identifying a secure channel and its revised lifetime.
#[derive(Debug, Clone, Default)]
pub struct ChannelSecurityToken {
    /// Server-assigned channel id.
    pub channel_id: u32,
    /// Server-assigned token id.
    pub token_id: u32,
    /// When the token was created.
    pub created_at: UaDateTime,
    /// Token lifetime in milliseconds.
    pub revised_lifetime_ms: u32,
}

impl BinaryDecode for ChannelSecurityToken {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        Ok(Self {
            channel_id: decoder.read_u32()?,
            token_id: decoder.read_u32()?,
            created_at: UaDateTime::decode(decoder)?,
            revised_lifetime_ms: decoder.read_u32()?,
        })
    }
}

// =============================================================================
// OpenSecureChannel
// =============================================================================

/// Opens (or renews) a secure channel.
#[derive(Debug, Clone)]
pub struct OpenSecureChannelRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// Client protocol version (0).
    pub client_protocol_version: u32,
    /// Issue or renew.
    pub request_type: SecurityTokenRequestType,
    /// Requested security mode.
    pub security_mode: MessageSecurityMode,
    /// Client nonce (empty for security mode None).
    pub client_nonce: Option<Vec<u8>>,
    /// Requested token lifetime in milliseconds.
    pub requested_lifetime_ms: u32,
}

impl BinaryEncode for OpenSecureChannelRequest {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        self.request_header.encode(encoder)?;
        encoder.write_u32(self.client_protocol_version);
        encoder.write_u32(self.request_type as u32);
        encoder.write_u32(self.security_mode as u32);
        encoder.write_opt_byte_string(self.client_nonce.as_deref())?;
        encoder.write_u32(self.requested_lifetime_ms);
        Ok(())
    }
}

impl ServiceRequest for OpenSecureChannelRequest {
    const TYPE_ID: u32 = 446;
    type Response = OpenSecureChannelResponse;

    fn request_header(&self) -> &RequestHeader {
        &self.request_header
    }
}

/// Response to [`OpenSecureChannelRequest`].
#[derive(Debug, Clone)]
pub struct OpenSecureChannelResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// Server protocol version.
    pub server_protocol_version: u32,
    /// The issued or renewed token.
    pub security_token: ChannelSecurityToken,
    /// Server nonce.
    pub server_nonce: Option<Vec<u8>>,
}

impl BinaryDecode for OpenSecureChannelResponse {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        Ok(Self {
            response_header: ResponseHeader::decode(decoder)?,
            server_protocol_version: decoder.read_u32()?,
            security_token: ChannelSecurityToken::decode(decoder)?,
            server_nonce: decoder.read_opt_byte_string()?,
        })
    }
}

impl ServiceResponse for OpenSecureChannelResponse {
    const TYPE_ID: u32 = 449;

    fn response_header(&self) -> &ResponseHeader {
        &self.response_header
    }
}

// =============================================================================
// CloseSecureChannel
// =============================================================================

/// Closes the secure channel. The server does not send a response; the
/// connection is torn down after the CLO message.
#[derive(Debug, Clone)]
pub struct CloseSecureChannelRequest {
    /// Common request header.
    pub request_header: RequestHeader,
}

impl BinaryEncode for CloseSecureChannelRequest {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        self.request_header.encode(encoder)
    }
}

/// DefaultBinary type id of `CloseSecureChannelRequest`.
pub const CLOSE_SECURE_CHANNEL_TYPE_ID: u32 = 452;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{decode_message, encode_message, DecodedResponse};
    use crate::types::NodeId;

    #[test]
    fn test_open_request_envelope() {
        let request = OpenSecureChannelRequest {
            request_header: RequestHeader::new(NodeId::null(), 1, 5000),
            client_protocol_version: 0,
            request_type: SecurityTokenRequestType::Issue,
            security_mode: MessageSecurityMode::None,
            client_nonce: None,
            requested_lifetime_ms: 3_600_000,
        };
        let bytes = encode_message(&request).unwrap();
        // Envelope starts with the four-byte NodeId form for i=446.
        assert_eq!(&bytes[..4], &[0x01, 0x00, 0xBE, 0x01]);
    }

    #[test]
    fn test_open_response_round_trip() {
        // Hand-build a response body the way a server would.
        let mut encoder = Encoder::new();
        NodeId::numeric(0, OpenSecureChannelResponse::TYPE_ID)
            .encode(&mut encoder)
            .unwrap();
        ResponseHeader::default().encode(&mut encoder).unwrap();
        encoder.write_u32(0); // server protocol version
        encoder.write_u32(7); // channel id
        encoder.write_u32(11); // token id
        UaDateTime::now().encode(&mut encoder).unwrap();
        encoder.write_u32(600_000); // revised lifetime
        encoder.write_opt_byte_string(Some(&[1, 2, 3])).unwrap();
        let bytes = encoder.finish();

        match decode_message::<OpenSecureChannelResponse>(&bytes).unwrap() {
            DecodedResponse::Response(resp) => {
                assert_eq!(resp.security_token.channel_id, 7);
                assert_eq!(resp.security_token.token_id, 11);
                assert_eq!(resp.security_token.revised_lifetime_ms, 600_000);
                assert_eq!(resp.server_nonce.as_deref(), Some(&[1u8, 2, 3][..]));
            }
            DecodedResponse::Fault(_) => panic!("unexpected fault"),
        }
    }
}
