// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Endpoint discovery: GetEndpoints and its supporting structures.

use crate::encoding::{BinaryDecode, BinaryEncode, Decoder, Encoder};
use crate::error::{CodecError, CodecResult};
use crate::types::LocalizedText;

use super::channel::MessageSecurityMode;
use super::{RequestHeader, ResponseHeader, ServiceRequest, ServiceResponse};

// =============================================================================
// ApplicationDescription
// =============================================================================

/// Kind of application described by an [`ApplicationDescription`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApplicationType {
    /// A server.
    #[default]
    Server = 0,
    /// A client.
    Client = 1,
    /// Both client and server.
    ClientAndServer = 2,
    /// A discovery server.
    DiscoveryServer = 3,
}

impl ApplicationType {
    fn from_u32(value: u32) -> CodecResult<Self> {
        match value {
            0 => Ok(Self::Server),
            1 => Ok(Self::Client),
            2 => Ok(Self::ClientAndServer),
            3 => Ok(Self::DiscoveryServer),
            other => Err(CodecError::InvalidEnumValue {
                name: "ApplicationType",
                value: i64::from(other),
            }),
        }
    }
}

/// Identity of a client or server application.
#[derive(Debug, Clone, Default)]
pub struct ApplicationDescription {
    /// Globally unique application URI.
    pub application_uri: Option<String>,
    /// Product URI.
    pub product_uri: Option<String>,
    /// Human-readable name.
    pub application_name: LocalizedText,
    /// Application kind.
    pub application_type: ApplicationType,
    /// Gateway server URI, if reached through a gateway.
    pub gateway_server_uri: Option<String>,
    /// Discovery profile URI.
    pub discovery_profile_uri: Option<String>,
    /// Discovery URLs.
    pub discovery_urls: Option<Vec<String>>,
}

impl ApplicationDescription {
    /// Creates a client description with the given URI and name.
    pub fn client(application_uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            application_uri: Some(application_uri.into()),
            application_name: LocalizedText::new(name),
            application_type: ApplicationType::Client,
            ..Default::default()
        }
    }
}

impl BinaryEncode for ApplicationDescription {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        encoder.write_opt_string(self.application_uri.as_deref())?;
        encoder.write_opt_string(self.product_uri.as_deref())?;
        self.application_name.encode(encoder)?;
        encoder.write_u32(self.application_type as u32);
        encoder.write_opt_string(self.gateway_server_uri.as_deref())?;
        encoder.write_opt_string(self.discovery_profile_uri.as_deref())?;
        match &self.discovery_urls {
            None => encoder.write_array_len(None)?,
            Some(urls) => {
                encoder.write_array_len(Some(urls.len()))?;
                for url in urls {
                    encoder.write_string(url)?;
                }
            }
        }
        Ok(())
    }
}

impl BinaryDecode for ApplicationDescription {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        let application_uri = decoder.read_opt_string()?;
        let product_uri = decoder.read_opt_string()?;
        let application_name = LocalizedText::decode(decoder)?;
        let application_type = ApplicationType::from_u32(decoder.read_u32()?)?;
        let gateway_server_uri = decoder.read_opt_string()?;
        let discovery_profile_uri = decoder.read_opt_string()?;
        let discovery_urls = match decoder.read_array_len()? {
            None => None,
            Some(len) => {
                let mut urls = Vec::with_capacity(len.min(64));
                for _ in 0..len {
                    urls.push(decoder.read_string()?);
                }
                Some(urls)
            }
        };
        Ok(Self {
            application_uri,
            product_uri,
            application_name,
            application_type,
            gateway_server_uri,
            discovery_profile_uri,
            discovery_urls,
        })
    }
}

// =============================================================================
// UserTokenPolicy
// =============================================================================

/// Kind of user identity token accepted by an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserTokenKind {
    /// No credentials.
    Anonymous = 0,
    /// Username and password.
    UserName = 1,
    /// X.509 certificate.
    Certificate = 2,
    /// Token issued by an external authority.
    IssuedToken = 3,
}

impl UserTokenKind {
    fn from_u32(value: u32) -> CodecResult<Self> {
        match value {
            0 => Ok(Self::Anonymous),
            1 => Ok(Self::UserName),
            2 => Ok(Self::Certificate),
            3 => Ok(Self::IssuedToken),
            other => Err(CodecError::InvalidEnumValue {
                name: "UserTokenType",
                value: i64::from(other),
            }),
        }
    }
}

/// A user token policy advertised by an endpoint.
#[derive(Debug, Clone)]
pub struct UserTokenPolicy {
    /// Policy id, echoed back in the identity token at activation.
    pub policy_id: Option<String>,
    /// Accepted token kind.
    pub token_type: UserTokenKind,
    /// Issued token type URI.
    pub issued_token_type: Option<String>,
    /// Issuer endpoint URL.
    pub issuer_endpoint_url: Option<String>,
    /// Security policy for encrypting the token.
    pub security_policy_uri: Option<String>,
}

impl BinaryDecode for UserTokenPolicy {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        Ok(Self {
            policy_id: decoder.read_opt_string()?,
            token_type: UserTokenKind::from_u32(decoder.read_u32()?)?,
            issued_token_type: decoder.read_opt_string()?,
            issuer_endpoint_url: decoder.read_opt_string()?,
            security_policy_uri: decoder.read_opt_string()?,
        })
    }
}

// =============================================================================
// EndpointDescription
// =============================================================================

/// One endpoint advertised by a server.
#[derive(Debug, Clone)]
pub struct EndpointDescription {
    /// Endpoint URL.
    pub endpoint_url: Option<String>,
    /// The server behind the endpoint.
    pub server: ApplicationDescription,
    /// Server certificate (DER).
    pub server_certificate: Option<Vec<u8>>,
    /// Message security mode.
    pub security_mode: MessageSecurityMode,
    /// Security policy URI.
    pub security_policy_uri: Option<String>,
    /// Accepted user token policies.
    pub user_identity_tokens: Option<Vec<UserTokenPolicy>>,
    /// Transport profile URI.
    pub transport_profile_uri: Option<String>,
    /// Relative security level assigned by the server.
    pub security_level: u8,
}

impl EndpointDescription {
    /// Returns the first token policy of the given kind, if any.
    pub fn token_policy(&self, kind: UserTokenKind) -> Option<&UserTokenPolicy> {
        self.user_identity_tokens
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .find(|p| p.token_type == kind)
    }

    /// Returns `true` if the endpoint uses security mode None.
    pub fn is_unsecured(&self) -> bool {
        self.security_mode == MessageSecurityMode::None
    }
}

impl BinaryDecode for EndpointDescription {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        let endpoint_url = decoder.read_opt_string()?;
        let server = ApplicationDescription::decode(decoder)?;
        let server_certificate = decoder.read_opt_byte_string()?;
        let security_mode = MessageSecurityMode::decode(decoder)?;
        let security_policy_uri = decoder.read_opt_string()?;
        let user_identity_tokens = crate::encoding::decode_array(decoder)?;
        let transport_profile_uri = decoder.read_opt_string()?;
        let security_level = decoder.read_u8()?;
        Ok(Self {
            endpoint_url,
            server,
            server_certificate,
            security_mode,
            security_policy_uri,
            user_identity_tokens,
            transport_profile_uri,
            security_level,
        })
    }
}

// =============================================================================
// GetEndpoints
// =============================================================================

/// Requests the endpoints a server exposes.
#[derive(Debug, Clone)]
pub struct GetEndpointsRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// The URL the client used to reach the server.
    pub endpoint_url: Option<String>,
    /// Locale preference for localized text fields.
    pub locale_ids: Option<Vec<String>>,
    /// Transport profile filter.
    pub profile_uris: Option<Vec<String>>,
}

impl BinaryEncode for GetEndpointsRequest {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        self.request_header.encode(encoder)?;
        encoder.write_opt_string(self.endpoint_url.as_deref())?;
        for list in [&self.locale_ids, &self.profile_uris] {
            match list {
                None => encoder.write_array_len(None)?,
                Some(items) => {
                    encoder.write_array_len(Some(items.len()))?;
                    for item in items {
                        encoder.write_string(item)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl ServiceRequest for GetEndpointsRequest {
    const TYPE_ID: u32 = 428;
    type Response = GetEndpointsResponse;

    fn request_header(&self) -> &RequestHeader {
        &self.request_header
    }
}

/// Response to [`GetEndpointsRequest`].
#[derive(Debug, Clone)]
pub struct GetEndpointsResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// The advertised endpoints.
    pub endpoints: Option<Vec<EndpointDescription>>,
}

impl BinaryDecode for GetEndpointsResponse {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        Ok(Self {
            response_header: ResponseHeader::decode(decoder)?,
            endpoints: crate::encoding::decode_array(decoder)?,
        })
    }
}

impl ServiceResponse for GetEndpointsResponse {
    const TYPE_ID: u32 = 431;

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

    #[test]
    fn test_application_description_round_trip() {
        let desc = ApplicationDescription::client("urn:uascope:client", "uascope");
        let bytes = desc.encode_to_vec().unwrap();
        let decoded = ApplicationDescription::decode_from_slice(&bytes).unwrap();
        assert_eq!(decoded.application_uri.as_deref(), Some("urn:uascope:client"));
        assert_eq!(decoded.application_type, ApplicationType::Client);
        assert_eq!(decoded.application_name.text.as_deref(), Some("uascope"));
    }

    #[test]
    fn test_token_policy_lookup() {
        let endpoint = EndpointDescription {
            endpoint_url: Some("opc.tcp://localhost:4840".to_string()),
            server: ApplicationDescription::default(),
            server_certificate: None,
            security_mode: MessageSecurityMode::None,
            security_policy_uri: None,
            user_identity_tokens: Some(vec![
                UserTokenPolicy {
                    policy_id: Some("anonymous".to_string()),
                    token_type: UserTokenKind::Anonymous,
                    issued_token_type: None,
                    issuer_endpoint_url: None,
                    security_policy_uri: None,
                },
                UserTokenPolicy {
                    policy_id: Some("username".to_string()),
                    token_type: UserTokenKind::UserName,
                    issued_token_type: None,
                    issuer_endpoint_url: None,
                    security_policy_uri: None,
                },
            ]),
            transport_profile_uri: None,
            security_level: 0,
        };

        assert!(endpoint.is_unsecured());
        let policy = endpoint.token_policy(UserTokenKind::UserName).unwrap();
        assert_eq!(policy.policy_id.as_deref(), Some("username"));
        assert!(endpoint.token_policy(UserTokenKind::Certificate).is_none());
    }
}
