// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Request and response headers shared by every service message.

use crate::encoding::{BinaryDecode, BinaryEncode, Decoder, Encoder};
use crate::error::CodecResult;
use crate::types::{DiagnosticInfo, ExtensionObject, NodeId, StatusCode, UaDateTime};

// =============================================================================
// RequestHeader
// =============================================================================

/// Header carried by every service request.
#[derive(Debug, Clone, Default)]
pub struct RequestHeader {
    /// Session authentication token (null before session activation).
    pub authentication_token: NodeId,
    /// Time the request was sent.
    pub timestamp: UaDateTime,
    /// Client-assigned handle echoed in the response.
    pub request_handle: u32,
    /// Diagnostics requested from the server (0 = none).
    pub return_diagnostics: u32,
    /// Audit entry id.
    pub audit_entry_id: Option<String>,
    /// Hint for the server-side timeout, in milliseconds.
    pub timeout_hint: u32,
    /// Reserved extension point.
    pub additional_header: ExtensionObject,
}

impl RequestHeader {
    /// Creates a header for the given session token and handle.
    pub fn new(authentication_token: NodeId, request_handle: u32, timeout_hint: u32) -> Self {
        Self {
            authentication_token,
            timestamp: UaDateTime::now(),
            request_handle,
            return_diagnostics: 0,
            audit_entry_id: None,
            timeout_hint,
            additional_header: ExtensionObject::null(),
        }
    }
}

impl BinaryEncode for RequestHeader {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        self.authentication_token.encode(encoder)?;
        self.timestamp.encode(encoder)?;
        encoder.write_u32(self.request_handle);
        encoder.write_u32(self.return_diagnostics);
        encoder.write_opt_string(self.audit_entry_id.as_deref())?;
        encoder.write_u32(self.timeout_hint);
        self.additional_header.encode(encoder)
    }
}

impl BinaryDecode for RequestHeader {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        Ok(Self {
            authentication_token: NodeId::decode(decoder)?,
            timestamp: UaDateTime::decode(decoder)?,
            request_handle: decoder.read_u32()?,
            return_diagnostics: decoder.read_u32()?,
            audit_entry_id: decoder.read_opt_string()?,
            timeout_hint: decoder.read_u32()?,
            additional_header: ExtensionObject::decode(decoder)?,
        })
    }
}

// =============================================================================
// ResponseHeader
// =============================================================================

/// Header carried by every service response.
#[derive(Debug, Clone, Default)]
pub struct ResponseHeader {
    /// Time the response was sent.
    pub timestamp: UaDateTime,
    /// Echo of the client-assigned request handle.
    pub request_handle: u32,
    /// Status of the service call as a whole.
    pub service_result: StatusCode,
    /// Diagnostics for the service call.
    pub service_diagnostics: DiagnosticInfo,
    /// String table referenced by diagnostics.
    pub string_table: Option<Vec<String>>,
    /// Reserved extension point.
    pub additional_header: ExtensionObject,
}

impl BinaryEncode for ResponseHeader {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        self.timestamp.encode(encoder)?;
        encoder.write_u32(self.request_handle);
        self.service_result.encode(encoder)?;
        self.service_diagnostics.encode(encoder)?;
        match &self.string_table {
            None => encoder.write_array_len(None)?,
            Some(table) => {
                encoder.write_array_len(Some(table.len()))?;
                for s in table {
                    encoder.write_string(s)?;
                }
            }
        }
        self.additional_header.encode(encoder)
    }
}

impl BinaryDecode for ResponseHeader {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        let timestamp = UaDateTime::decode(decoder)?;
        let request_handle = decoder.read_u32()?;
        let service_result = StatusCode::decode(decoder)?;
        let service_diagnostics = DiagnosticInfo::decode(decoder)?;
        let string_table = match decoder.read_array_len()? {
            None => None,
            Some(len) => {
                let mut table = Vec::with_capacity(len.min(4096));
                for _ in 0..len {
                    table.push(decoder.read_string()?);
                }
                Some(table)
            }
        };
        let additional_header = ExtensionObject::decode(decoder)?;
        Ok(Self {
            timestamp,
            request_handle,
            service_result,
            service_diagnostics,
            string_table,
            additional_header,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_header_round_trip() {
        let header = RequestHeader::new(NodeId::numeric(0, 77), 42, 5000);
        let bytes = header.encode_to_vec().unwrap();
        let decoded = RequestHeader::decode_from_slice(&bytes).unwrap();
        assert_eq!(decoded.request_handle, 42);
        assert_eq!(decoded.timeout_hint, 5000);
        assert_eq!(decoded.authentication_token, NodeId::numeric(0, 77));
    }

    #[test]
    fn test_response_header_round_trip() {
        let header = ResponseHeader {
            timestamp: UaDateTime::now(),
            request_handle: 3,
            service_result: StatusCode::GOOD,
            string_table: Some(vec!["a".to_string(), "b".to_string()]),
            ..Default::default()
        };
        let bytes = header.encode_to_vec().unwrap();
        let decoded = ResponseHeader::decode_from_slice(&bytes).unwrap();
        assert_eq!(decoded.request_handle, 3);
        assert_eq!(decoded.string_table.as_deref().unwrap().len(), 2);
    }
}
