// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Service request and response messages.
//!
//! A message body on a secured channel is the encoding NodeId of the message
//! type followed by the message fields. Each message declares its
//! DefaultBinary type id; [`encode_message`] and [`decode_message`] handle the
//! envelope, including `ServiceFault` detection on the decode path.

pub mod attribute;
pub mod channel;
pub mod discovery;
pub mod header;
pub mod session;
pub mod subscription;
pub mod view;

use crate::encoding::{BinaryDecode, BinaryEncode, Decoder, Encoder};
use crate::error::{CodecError, CodecResult};
use crate::types::NodeId;

pub use header::{RequestHeader, ResponseHeader};

/// DefaultBinary type id of `ServiceFault`.
pub const SERVICE_FAULT_TYPE_ID: u32 = 397;

// =============================================================================
// Service traits
// =============================================================================

/// A client-to-server service request.
pub trait ServiceRequest: BinaryEncode {
    /// DefaultBinary encoding type id.
    const TYPE_ID: u32;

    /// The response message type paired with this request.
    type Response: ServiceResponse;

    /// Returns the request header.
    fn request_header(&self) -> &RequestHeader;
}

/// A server-to-client service response.
pub trait ServiceResponse: BinaryDecode {
    /// DefaultBinary encoding type id.
    const TYPE_ID: u32;

    /// Returns the response header.
    fn response_header(&self) -> &ResponseHeader;
}

// =============================================================================
// ServiceFault
// =============================================================================

/// The generic failure response: a bare response header whose service result
/// carries the failure status.
#[derive(Debug, Clone)]
pub struct ServiceFault {
    /// The response header.
    pub response_header: ResponseHeader,
}

impl BinaryDecode for ServiceFault {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        Ok(Self {
            response_header: ResponseHeader::decode(decoder)?,
        })
    }
}

// =============================================================================
// Message envelope
// =============================================================================

/// Outcome of decoding a response body: either the expected response or a
/// service fault.
#[derive(Debug)]
pub enum DecodedResponse<R> {
    /// The expected response message.
    Response(R),
    /// A `ServiceFault` carrying the failure status.
    Fault(ServiceFault),
}

/// Encodes a request message body: type id NodeId followed by the fields.
pub fn encode_message<R: ServiceRequest>(request: &R) -> CodecResult<Vec<u8>> {
    let mut encoder = Encoder::with_capacity(128);
    NodeId::numeric(0, R::TYPE_ID).encode(&mut encoder)?;
    request.encode(&mut encoder)?;
    Ok(encoder.finish())
}

/// Decodes a response message body, accepting either the expected response
/// type or a `ServiceFault`.
pub fn decode_message<R: ServiceResponse>(bytes: &[u8]) -> CodecResult<DecodedResponse<R>> {
    let mut decoder = Decoder::new(bytes);
    let type_id = NodeId::decode(&mut decoder)?;
    match type_id.as_numeric() {
        Some(id) if id == R::TYPE_ID && type_id.namespace == 0 => {
            Ok(DecodedResponse::Response(R::decode(&mut decoder)?))
        }
        Some(SERVICE_FAULT_TYPE_ID) if type_id.namespace == 0 => {
            Ok(DecodedResponse::Fault(ServiceFault::decode(&mut decoder)?))
        }
        _ => Err(CodecError::UnexpectedTypeId {
            expected: R::TYPE_ID,
            actual: type_id.to_string(),
        }),
    }
}

/// Reads the type id of an encoded response body without consuming the body.
pub fn peek_type_id(bytes: &[u8]) -> CodecResult<NodeId> {
    let mut decoder = Decoder::new(bytes);
    NodeId::decode(&mut decoder)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StatusCode, UaDateTime};

    #[test]
    fn test_fault_is_detected_for_any_expected_type() {
        let fault_header = ResponseHeader {
            timestamp: UaDateTime::now(),
            request_handle: 9,
            service_result: StatusCode::BAD_SESSION_ID_INVALID,
            ..Default::default()
        };
        let mut encoder = Encoder::new();
        NodeId::numeric(0, SERVICE_FAULT_TYPE_ID)
            .encode(&mut encoder)
            .unwrap();
        fault_header.encode(&mut encoder).unwrap();
        let bytes = encoder.finish();

        match decode_message::<attribute::ReadResponse>(&bytes).unwrap() {
            DecodedResponse::Fault(fault) => {
                assert_eq!(
                    fault.response_header.service_result,
                    StatusCode::BAD_SESSION_ID_INVALID
                );
                assert_eq!(fault.response_header.request_handle, 9);
            }
            DecodedResponse::Response(_) => panic!("expected fault"),
        }
    }

    #[test]
    fn test_unknown_type_id_is_rejected() {
        let mut encoder = Encoder::new();
        NodeId::numeric(0, 12345).encode(&mut encoder).unwrap();
        let bytes = encoder.finish();
        assert!(decode_message::<attribute::ReadResponse>(&bytes).is_err());
    }
}
