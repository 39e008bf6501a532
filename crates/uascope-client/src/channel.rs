// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Secure channel state: ids, counters and token renewal.

use std::time::{Duration, Instant};

use tracing::debug;

use uascope_codec::services::channel::{
    ChannelSecurityToken, MessageSecurityMode, OpenSecureChannelRequest, OpenSecureChannelResponse,
    SecurityTokenRequestType,
};
use uascope_codec::services::{self, DecodedResponse, RequestHeader, ServiceResponse};
use uascope_codec::NodeId;

use crate::error::{ClientError, ClientResult};

/// Fraction of the token lifetime after which the client renews.
const RENEW_AT_FRACTION: f64 = 0.75;

/// Client-side state of one secure channel.
///
/// Sequence numbers and request ids both start at 1 and increase
/// monotonically for the lifetime of the underlying connection; a renewed
/// token keeps the counters, a reconnect starts fresh.
#[derive(Debug)]
pub struct SecureChannel {
    channel_id: u32,
    token_id: u32,
    token_granted_at: Instant,
    token_lifetime: Duration,
    requested_lifetime_ms: u32,
    next_sequence: u32,
    next_request_id: u32,
}

impl SecureChannel {
    /// Fresh channel state for a new connection; ids stay zero until the
    /// server's OPN response is adopted.
    pub fn new(requested_lifetime: Duration) -> Self {
        Self {
            channel_id: 0,
            token_id: 0,
            token_granted_at: Instant::now(),
            token_lifetime: Duration::ZERO,
            requested_lifetime_ms: requested_lifetime.as_millis().min(u32::MAX as u128) as u32,
            next_sequence: 1,
            next_request_id: 1,
        }
    }

    /// Server-assigned channel id.
    pub fn channel_id(&self) -> u32 {
        self.channel_id
    }

    /// Current token id.
    pub fn token_id(&self) -> u32 {
        self.token_id
    }

    /// Takes the next sequence number.
    pub fn next_sequence(&mut self) -> u32 {
        let seq = self.next_sequence;
        self.next_sequence += 1;
        seq
    }

    /// Takes the next request id (also used as the request handle).
    pub fn next_request_id(&mut self) -> u32 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    /// Returns `true` once enough of the token lifetime has elapsed that a
    /// renewal should be issued.
    pub fn should_renew(&self) -> bool {
        if self.token_lifetime.is_zero() {
            return false;
        }
        self.token_granted_at.elapsed() >= self.token_lifetime.mul_f64(RENEW_AT_FRACTION)
    }

    /// Builds the OPN request body for the initial issue or a renewal.
    pub fn open_request(&self, request_handle: u32, is_renew: bool) -> ClientResult<Vec<u8>> {
        let request = OpenSecureChannelRequest {
            request_header: RequestHeader::new(NodeId::null(), request_handle, 15_000),
            client_protocol_version: 0,
            request_type: if is_renew {
                SecurityTokenRequestType::Renew
            } else {
                SecurityTokenRequestType::Issue
            },
            security_mode: MessageSecurityMode::None,
            client_nonce: None,
            requested_lifetime_ms: self.requested_lifetime_ms,
        };
        Ok(services::encode_message(&request)?)
    }

    /// Adopts the token from an OPN response body.
    pub fn adopt_open_response(&mut self, body: &[u8]) -> ClientResult<ChannelSecurityToken> {
        let response = match services::decode_message::<OpenSecureChannelResponse>(body)? {
            DecodedResponse::Response(response) => response,
            DecodedResponse::Fault(fault) => {
                return Err(ClientError::fault(
                    "open secure channel",
                    fault.response_header.service_result,
                ))
            }
        };
        let status = response.response_header().service_result;
        if status.is_bad() {
            return Err(ClientError::fault("open secure channel", status));
        }

        let token = response.security_token;
        self.channel_id = token.channel_id;
        self.token_id = token.token_id;
        self.token_granted_at = Instant::now();
        self.token_lifetime = Duration::from_millis(u64::from(token.revised_lifetime_ms));
        debug!(
            channel_id = token.channel_id,
            token_id = token.token_id,
            lifetime_ms = token.revised_lifetime_ms,
            "secure channel token adopted"
        );
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uascope_codec::services::ResponseHeader;
    use uascope_codec::{BinaryEncode, Encoder, UaDateTime};

    fn open_response_body(channel_id: u32, token_id: u32, lifetime_ms: u32) -> Vec<u8> {
        let mut encoder = Encoder::new();
        NodeId::numeric(0, OpenSecureChannelResponse::TYPE_ID)
            .encode(&mut encoder)
            .unwrap();
        ResponseHeader::default().encode(&mut encoder).unwrap();
        encoder.write_u32(0);
        encoder.write_u32(channel_id);
        encoder.write_u32(token_id);
        UaDateTime::now().encode(&mut encoder).unwrap();
        encoder.write_u32(lifetime_ms);
        encoder.write_opt_byte_string(None).unwrap();
        encoder.finish()
    }

    #[test]
    fn test_counters_are_monotonic() {
        let mut channel = SecureChannel::new(Duration::from_secs(3600));
        assert_eq!(channel.next_sequence(), 1);
        assert_eq!(channel.next_sequence(), 2);
        assert_eq!(channel.next_request_id(), 1);
        assert_eq!(channel.next_request_id(), 2);
    }

    #[test]
    fn test_adopt_open_response() {
        let mut channel = SecureChannel::new(Duration::from_secs(3600));
        let token = channel
            .adopt_open_response(&open_response_body(12, 34, 600_000))
            .unwrap();
        assert_eq!(token.channel_id, 12);
        assert_eq!(channel.channel_id(), 12);
        assert_eq!(channel.token_id(), 34);
        // A fresh 10-minute token is nowhere near its renewal point.
        assert!(!channel.should_renew());
    }

    #[test]
    fn test_zero_lifetime_never_renews() {
        let channel = SecureChannel::new(Duration::from_secs(3600));
        assert!(!channel.should_renew());
    }
}
