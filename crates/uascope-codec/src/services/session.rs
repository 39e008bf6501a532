// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Session services: CreateSession, ActivateSession and CloseSession.

use crate::encoding::{BinaryDecode, BinaryEncode, Decoder, Encoder};
use crate::error::CodecResult;
use crate::types::{ExtensionObject, NodeId};

use super::discovery::ApplicationDescription;
use super::{RequestHeader, ResponseHeader, ServiceRequest, ServiceResponse};

// =============================================================================
// SignatureData
// =============================================================================

/// A signature plus the algorithm that produced it. Both fields stay null on
/// an unsecured channel.
#[derive(Debug, Clone, Default)]
pub struct SignatureData {
    /// Signature algorithm URI.
    pub algorithm: Option<String>,
    /// The signature bytes.
    pub signature: Option<Vec<u8>>,
}

impl BinaryEncode for SignatureData {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        encoder.write_opt_string(self.algorithm.as_deref())?;
        encoder.write_opt_byte_string(self.signature.as_deref())
    }
}

impl BinaryDecode for SignatureData {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        Ok(Self {
            algorithm: decoder.read_opt_string()?,
            signature: decoder.read_opt_byte_string()?,
        })
    }
}

// =============================================================================
// User identity tokens
// =============================================================================

/// DefaultBinary type id of `AnonymousIdentityToken`.
pub const ANONYMOUS_IDENTITY_TOKEN_TYPE_ID: u32 = 321;

/// DefaultBinary type id of `UserNameIdentityToken`.
pub const USER_NAME_IDENTITY_TOKEN_TYPE_ID: u32 = 324;

/// Anonymous identity: just the policy id from the endpoint.
#[derive(Debug, Clone)]
pub struct AnonymousIdentityToken {
    /// Policy id taken from the endpoint's token policy.
    pub policy_id: Option<String>,
}

impl AnonymousIdentityToken {
    /// Wraps the token in the extension object sent with ActivateSession.
    pub fn to_extension_object(&self) -> CodecResult<ExtensionObject> {
        ExtensionObject::from_encodable(NodeId::numeric(0, ANONYMOUS_IDENTITY_TOKEN_TYPE_ID), self)
    }
}

impl BinaryEncode for AnonymousIdentityToken {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        encoder.write_opt_string(self.policy_id.as_deref())
    }
}

/// Username/password identity. On an unsecured channel the password travels
/// in the clear, so the encryption algorithm is left null.
#[derive(Debug, Clone)]
pub struct UserNameIdentityToken {
    /// Policy id taken from the endpoint's token policy.
    pub policy_id: Option<String>,
    /// The user name.
    pub user_name: Option<String>,
    /// The password bytes, possibly encrypted per `encryption_algorithm`.
    pub password: Option<Vec<u8>>,
    /// Password encryption algorithm URI (null = plaintext).
    pub encryption_algorithm: Option<String>,
}

impl UserNameIdentityToken {
    /// Wraps the token in the extension object sent with ActivateSession.
    pub fn to_extension_object(&self) -> CodecResult<ExtensionObject> {
        ExtensionObject::from_encodable(NodeId::numeric(0, USER_NAME_IDENTITY_TOKEN_TYPE_ID), self)
    }
}

impl BinaryEncode for UserNameIdentityToken {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        encoder.write_opt_string(self.policy_id.as_deref())?;
        encoder.write_opt_string(self.user_name.as_deref())?;
        encoder.write_opt_byte_string(self.password.as_deref())?;
        encoder.write_opt_string(self.encryption_algorithm.as_deref())
    }
}

// =============================================================================
// CreateSession
// =============================================================================

/// Creates a session on an open secure channel.
#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// Description of this client.
    pub client_description: ApplicationDescription,
    /// Server URI from the endpoint, if known.
    pub server_uri: Option<String>,
    /// The endpoint URL the client connected to.
    pub endpoint_url: Option<String>,
    /// Human-readable session name for server diagnostics.
    pub session_name: Option<String>,
    /// Client nonce, at least 32 random bytes.
    pub client_nonce: Option<Vec<u8>>,
    /// Client certificate (DER), null without security.
    pub client_certificate: Option<Vec<u8>>,
    /// Requested session timeout in milliseconds.
    pub requested_session_timeout_ms: f64,
    /// Largest response body this client accepts (0 = no limit).
    pub max_response_message_size: u32,
}

impl BinaryEncode for CreateSessionRequest {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        self.request_header.encode(encoder)?;
        self.client_description.encode(encoder)?;
        encoder.write_opt_string(self.server_uri.as_deref())?;
        encoder.write_opt_string(self.endpoint_url.as_deref())?;
        encoder.write_opt_string(self.session_name.as_deref())?;
        encoder.write_opt_byte_string(self.client_nonce.as_deref())?;
        encoder.write_opt_byte_string(self.client_certificate.as_deref())?;
        encoder.write_f64(self.requested_session_timeout_ms);
        encoder.write_u32(self.max_response_message_size);
        Ok(())
    }
}

impl ServiceRequest for CreateSessionRequest {
    const TYPE_ID: u32 = 461;
    type Response = CreateSessionResponse;

    fn request_header(&self) -> &RequestHeader {
        &self.request_header
    }
}

/// Response to [`CreateSessionRequest`].
///
/// Only the leading fields are decoded; the trailing endpoint list, software
/// certificates, server signature and message size limits are not needed on
/// an unsecured channel and are left unread in the stream.
#[derive(Debug, Clone)]
pub struct CreateSessionResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// Server-assigned session id.
    pub session_id: NodeId,
    /// Token to put in every request header after activation.
    pub authentication_token: NodeId,
    /// Granted session timeout in milliseconds.
    pub revised_session_timeout_ms: f64,
    /// Server nonce for the activation signature.
    pub server_nonce: Option<Vec<u8>>,
    /// Server certificate (DER).
    pub server_certificate: Option<Vec<u8>>,
}

impl BinaryDecode for CreateSessionResponse {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        Ok(Self {
            response_header: ResponseHeader::decode(decoder)?,
            session_id: NodeId::decode(decoder)?,
            authentication_token: NodeId::decode(decoder)?,
            revised_session_timeout_ms: decoder.read_f64()?,
            server_nonce: decoder.read_opt_byte_string()?,
            server_certificate: decoder.read_opt_byte_string()?,
        })
    }
}

impl ServiceResponse for CreateSessionResponse {
    const TYPE_ID: u32 = 464;

    fn response_header(&self) -> &ResponseHeader {
        &self.response_header
    }
}

// =============================================================================
// ActivateSession
// =============================================================================

/// Activates a created session, binding a user identity to it.
#[derive(Debug, Clone)]
pub struct ActivateSessionRequest {
    /// Common request header; carries the authentication token from
    /// CreateSession.
    pub request_header: RequestHeader,
    /// Signature over server certificate + nonce (null without security).
    pub client_signature: SignatureData,
    /// Software certificates (unused, always null).
    pub client_software_certificates: Option<Vec<Vec<u8>>>,
    /// Locale preference for the session.
    pub locale_ids: Option<Vec<String>>,
    /// The user identity token, wrapped as an extension object.
    pub user_identity_token: ExtensionObject,
    /// Signature proving possession of the identity (null for anonymous
    /// and username tokens).
    pub user_token_signature: SignatureData,
}

impl BinaryEncode for ActivateSessionRequest {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        self.request_header.encode(encoder)?;
        self.client_signature.encode(encoder)?;
        match &self.client_software_certificates {
            None => encoder.write_array_len(None)?,
            Some(certs) => {
                encoder.write_array_len(Some(certs.len()))?;
                for cert in certs {
                    encoder.write_opt_byte_string(Some(cert))?;
                }
            }
        }
        match &self.locale_ids {
            None => encoder.write_array_len(None)?,
            Some(locales) => {
                encoder.write_array_len(Some(locales.len()))?;
                for locale in locales {
                    encoder.write_string(locale)?;
                }
            }
        }
        self.user_identity_token.encode(encoder)?;
        self.user_token_signature.encode(encoder)
    }
}

impl ServiceRequest for ActivateSessionRequest {
    const TYPE_ID: u32 = 467;
    type Response = ActivateSessionResponse;

    fn request_header(&self) -> &RequestHeader {
        &self.request_header
    }
}

/// Response to [`ActivateSessionRequest`].
#[derive(Debug, Clone)]
pub struct ActivateSessionResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// Fresh server nonce for the next activation.
    pub server_nonce: Option<Vec<u8>>,
}

impl BinaryDecode for ActivateSessionResponse {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        Ok(Self {
            response_header: ResponseHeader::decode(decoder)?,
            server_nonce: decoder.read_opt_byte_string()?,
        })
    }
}

impl ServiceResponse for ActivateSessionResponse {
    const TYPE_ID: u32 = 470;

    fn response_header(&self) -> &ResponseHeader {
        &self.response_header
    }
}

// =============================================================================
// CloseSession
// =============================================================================

/// Closes the session.
#[derive(Debug, Clone)]
pub struct CloseSessionRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// Whether the server should drop subscriptions owned by the session.
    pub delete_subscriptions: bool,
}

impl BinaryEncode for CloseSessionRequest {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        self.request_header.encode(encoder)?;
        encoder.write_bool(self.delete_subscriptions);
        Ok(())
    }
}

impl ServiceRequest for CloseSessionRequest {
    const TYPE_ID: u32 = 473;
    type Response = CloseSessionResponse;

    fn request_header(&self) -> &RequestHeader {
        &self.request_header
    }
}

/// Response to [`CloseSessionRequest`].
#[derive(Debug, Clone)]
pub struct CloseSessionResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
}

impl BinaryDecode for CloseSessionResponse {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        Ok(Self {
            response_header: ResponseHeader::decode(decoder)?,
        })
    }
}

impl ServiceResponse for CloseSessionResponse {
    const TYPE_ID: u32 = 476;

    fn response_header(&self) -> &ResponseHeader {
        &self.response_header
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{decode_message, encode_message, DecodedResponse};

    #[test]
    fn test_create_session_request_encodes() {
        let request = CreateSessionRequest {
            request_header: RequestHeader::new(NodeId::null(), 2, 5000),
            client_description: ApplicationDescription::client("urn:uascope:client", "uascope"),
            server_uri: None,
            endpoint_url: Some("opc.tcp://localhost:4840".to_string()),
            session_name: Some("uascope session".to_string()),
            client_nonce: Some(vec![0u8; 32]),
            client_certificate: None,
            requested_session_timeout_ms: 60_000.0,
            max_response_message_size: 0,
        };
        let bytes = encode_message(&request).unwrap();
        // Four-byte NodeId form for i=461.
        assert_eq!(&bytes[..4], &[0x01, 0x00, 0xCD, 0x01]);
    }

    #[test]
    fn test_create_session_response_ignores_trailing_fields() {
        let mut encoder = Encoder::new();
        NodeId::numeric(0, CreateSessionResponse::TYPE_ID)
            .encode(&mut encoder)
            .unwrap();
        ResponseHeader::default().encode(&mut encoder).unwrap();
        NodeId::numeric(1, 1000).encode(&mut encoder).unwrap(); // session id
        NodeId::opaque(0, vec![0xAA; 16]).encode(&mut encoder).unwrap(); // auth token
        encoder.write_f64(30_000.0);
        encoder.write_opt_byte_string(Some(&[9u8; 32])).unwrap();
        encoder.write_opt_byte_string(None).unwrap();
        // Trailing fields a real server sends; left unread by the decoder.
        encoder.write_array_len(None).unwrap(); // server endpoints
        encoder.write_array_len(None).unwrap(); // software certificates
        let bytes = encoder.finish();

        match decode_message::<CreateSessionResponse>(&bytes).unwrap() {
            DecodedResponse::Response(resp) => {
                assert_eq!(resp.session_id, NodeId::numeric(1, 1000));
                assert_eq!(resp.revised_session_timeout_ms, 30_000.0);
                assert_eq!(resp.server_nonce.as_deref().map(<[u8]>::len), Some(32));
            }
            DecodedResponse::Fault(_) => panic!("unexpected fault"),
        }
    }

    #[test]
    fn test_anonymous_token_wraps_as_extension_object() {
        let token = AnonymousIdentityToken {
            policy_id: Some("anonymous".to_string()),
        };
        let obj = token.to_extension_object().unwrap();
        assert_eq!(
            obj.type_id,
            NodeId::numeric(0, ANONYMOUS_IDENTITY_TOKEN_TYPE_ID)
        );
        assert!(obj.body.is_some());
    }
}
