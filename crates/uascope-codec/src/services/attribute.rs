// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Attribute services: Read and Write.

use crate::encoding::{
    decode_array, encode_array, BinaryDecode, BinaryEncode, Decoder, Encoder,
};
use crate::error::{CodecError, CodecResult};
use crate::types::{DiagnosticInfo, NodeId, QualifiedName, StatusCode};
use crate::variant::DataValue;

use super::{RequestHeader, ResponseHeader, ServiceRequest, ServiceResponse};

// =============================================================================
// Attribute ids
// =============================================================================

/// The node attributes a client can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AttributeId {
    /// The node id itself.
    NodeId = 1,
    /// Node class.
    NodeClass = 2,
    /// Browse name.
    BrowseName = 3,
    /// Display name.
    DisplayName = 4,
    /// Description.
    Description = 5,
    /// Current value of a variable.
    Value = 13,
    /// Data type of a variable.
    DataType = 14,
    /// Value rank of a variable.
    ValueRank = 15,
    /// Access level of a variable.
    AccessLevel = 17,
}

impl From<AttributeId> for u32 {
    fn from(id: AttributeId) -> u32 {
        id as u32
    }
}

/// Which timestamps the server should return with data values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampsToReturn {
    /// Source timestamp only.
    Source = 0,
    /// Server timestamp only.
    Server = 1,
    /// Both timestamps.
    #[default]
    Both = 2,
    /// No timestamps.
    Neither = 3,
}

// =============================================================================
// ReadValueId
// =============================================================================

/// One node/attribute pair to read.
#[derive(Debug, Clone)]
pub struct ReadValueId {
    /// The node to read.
    pub node_id: NodeId,
    /// The attribute to read.
    pub attribute_id: u32,
    /// Index range into an array value, if any.
    pub index_range: Option<String>,
    /// Requested data encoding (null for the default binary encoding).
    pub data_encoding: QualifiedName,
}

impl ReadValueId {
    /// Reads the Value attribute of `node_id`.
    pub fn value_of(node_id: NodeId) -> Self {
        Self::attribute_of(node_id, AttributeId::Value)
    }

    /// Reads an arbitrary attribute of `node_id`.
    pub fn attribute_of(node_id: NodeId, attribute_id: AttributeId) -> Self {
        Self {
            node_id,
            attribute_id: attribute_id.into(),
            index_range: None,
            data_encoding: QualifiedName::null(),
        }
    }
}

impl BinaryEncode for ReadValueId {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        self.node_id.encode(encoder)?;
        encoder.write_u32(self.attribute_id);
        encoder.write_opt_string(self.index_range.as_deref())?;
        self.data_encoding.encode(encoder)
    }
}

impl BinaryDecode for ReadValueId {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        Ok(Self {
            node_id: NodeId::decode(decoder)?,
            attribute_id: decoder.read_u32()?,
            index_range: decoder.read_opt_string()?,
            data_encoding: QualifiedName::decode(decoder)?,
        })
    }
}

// =============================================================================
// Read
// =============================================================================

/// Reads attributes from one or more nodes.
#[derive(Debug, Clone)]
pub struct ReadRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// Oldest acceptable cached value age, in milliseconds (0 forces a fresh
    /// read from the source).
    pub max_age: f64,
    /// Which timestamps to return.
    pub timestamps_to_return: TimestampsToReturn,
    /// The node/attribute pairs to read.
    pub nodes_to_read: Vec<ReadValueId>,
}

impl ReadRequest {
    /// Validates the request before encoding. An empty read list is rejected
    /// by servers with `Bad_NothingToDo`, so catch it client-side.
    pub fn validate(&self) -> CodecResult<()> {
        if self.nodes_to_read.is_empty() {
            return Err(CodecError::not_encodable("read request with no nodes"));
        }
        Ok(())
    }
}

impl BinaryEncode for ReadRequest {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        self.request_header.encode(encoder)?;
        encoder.write_f64(self.max_age);
        encoder.write_u32(self.timestamps_to_return as u32);
        encode_array(encoder, Some(&self.nodes_to_read))
    }
}

impl ServiceRequest for ReadRequest {
    const TYPE_ID: u32 = 631;
    type Response = ReadResponse;

    fn request_header(&self) -> &RequestHeader {
        &self.request_header
    }
}

/// Response to [`ReadRequest`]. Results are positional: `results[i]` answers
/// `nodes_to_read[i]`.
#[derive(Debug, Clone)]
pub struct ReadResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// One data value per requested node/attribute.
    pub results: Option<Vec<DataValue>>,
    /// Per-result diagnostics, if requested.
    pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
}

impl BinaryDecode for ReadResponse {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        Ok(Self {
            response_header: ResponseHeader::decode(decoder)?,
            results: decode_array(decoder)?,
            diagnostic_infos: decode_array(decoder)?,
        })
    }
}

impl ServiceResponse for ReadResponse {
    const TYPE_ID: u32 = 634;

    fn response_header(&self) -> &ResponseHeader {
        &self.response_header
    }
}

// =============================================================================
// Write
// =============================================================================

/// One node/attribute/value triple to write.
#[derive(Debug, Clone)]
pub struct WriteValue {
    /// The node to write.
    pub node_id: NodeId,
    /// The attribute to write.
    pub attribute_id: u32,
    /// Index range into an array value, if any.
    pub index_range: Option<String>,
    /// The value to write.
    pub value: DataValue,
}

impl WriteValue {
    /// Writes `value` to the Value attribute of `node_id`.
    pub fn value_of(node_id: NodeId, value: DataValue) -> Self {
        Self {
            node_id,
            attribute_id: AttributeId::Value.into(),
            index_range: None,
            value,
        }
    }
}

impl BinaryEncode for WriteValue {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        self.node_id.encode(encoder)?;
        encoder.write_u32(self.attribute_id);
        encoder.write_opt_string(self.index_range.as_deref())?;
        self.value.encode(encoder)
    }
}

/// Writes attribute values to one or more nodes.
#[derive(Debug, Clone)]
pub struct WriteRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// The writes to perform.
    pub nodes_to_write: Vec<WriteValue>,
}

impl BinaryEncode for WriteRequest {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        self.request_header.encode(encoder)?;
        encode_array(encoder, Some(&self.nodes_to_write))
    }
}

impl ServiceRequest for WriteRequest {
    const TYPE_ID: u32 = 673;
    type Response = WriteResponse;

    fn request_header(&self) -> &RequestHeader {
        &self.request_header
    }
}

/// Response to [`WriteRequest`]. Results are positional.
#[derive(Debug, Clone)]
pub struct WriteResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// One status per requested write.
    pub results: Option<Vec<StatusCode>>,
    /// Per-result diagnostics, if requested.
    pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
}

impl BinaryDecode for WriteResponse {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        Ok(Self {
            response_header: ResponseHeader::decode(decoder)?,
            results: decode_array(decoder)?,
            diagnostic_infos: decode_array(decoder)?,
        })
    }
}

impl ServiceResponse for WriteResponse {
    const TYPE_ID: u32 = 676;

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
    use crate::variant::Variant;

    fn read_request(nodes: Vec<ReadValueId>) -> ReadRequest {
        ReadRequest {
            request_header: RequestHeader::new(NodeId::null(), 1, 5000),
            max_age: 0.0,
            timestamps_to_return: TimestampsToReturn::Both,
            nodes_to_read: nodes,
        }
    }

    #[test]
    fn test_read_request_envelope_type_id() {
        let request = read_request(vec![ReadValueId::value_of(NodeId::string(
            1,
            "dynamic.double.value",
        ))]);
        let bytes = encode_message(&request).unwrap();
        // Four-byte NodeId form for i=631.
        assert_eq!(&bytes[..4], &[0x01, 0x00, 0x77, 0x02]);
    }

    #[test]
    fn test_empty_read_is_rejected() {
        assert!(read_request(vec![]).validate().is_err());
    }

    #[test]
    fn test_read_value_id_round_trip() {
        let rvi = ReadValueId::value_of(NodeId::string(1, "dynamic.double.value"));
        let bytes = rvi.encode_to_vec().unwrap();
        let decoded = ReadValueId::decode_from_slice(&bytes).unwrap();
        assert_eq!(decoded.node_id, NodeId::string(1, "dynamic.double.value"));
        assert_eq!(decoded.attribute_id, u32::from(AttributeId::Value));
        assert!(decoded.index_range.is_none());
    }

    #[test]
    fn test_read_response_decode() {
        let mut encoder = Encoder::new();
        NodeId::numeric(0, ReadResponse::TYPE_ID)
            .encode(&mut encoder)
            .unwrap();
        ResponseHeader::default().encode(&mut encoder).unwrap();
        encoder.write_array_len(Some(2)).unwrap();
        DataValue::new(Variant::Double(3.25)).encode(&mut encoder).unwrap();
        DataValue::from_status(StatusCode::BAD_NODE_ID_UNKNOWN)
            .encode(&mut encoder)
            .unwrap();
        encoder.write_array_len(None).unwrap(); // no diagnostics
        let bytes = encoder.finish();

        match decode_message::<ReadResponse>(&bytes).unwrap() {
            DecodedResponse::Response(resp) => {
                let results = resp.results.unwrap();
                assert_eq!(results.len(), 2);
                assert!(results[0].is_good());
                assert_eq!(results[0].value, Some(Variant::Double(3.25)));
                assert!(!results[1].is_good());
            }
            DecodedResponse::Fault(_) => panic!("unexpected fault"),
        }
    }

    #[test]
    fn test_write_response_decode() {
        let mut encoder = Encoder::new();
        NodeId::numeric(0, WriteResponse::TYPE_ID)
            .encode(&mut encoder)
            .unwrap();
        ResponseHeader::default().encode(&mut encoder).unwrap();
        encoder.write_array_len(Some(1)).unwrap();
        StatusCode::GOOD.encode(&mut encoder).unwrap();
        encoder.write_array_len(None).unwrap();
        let bytes = encoder.finish();

        match decode_message::<WriteResponse>(&bytes).unwrap() {
            DecodedResponse::Response(resp) => {
                assert_eq!(resp.results.unwrap(), vec![StatusCode::GOOD]);
            }
            DecodedResponse::Fault(_) => panic!("unexpected fault"),
        }
    }
}
