// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! View services: Browse.

use crate::encoding::{
    decode_array, encode_array, BinaryDecode, BinaryEncode, Decoder, Encoder,
};
use crate::error::{CodecError, CodecResult};
use crate::types::{
    DiagnosticInfo, ExpandedNodeId, LocalizedText, NodeId, QualifiedName, StatusCode, UaDateTime,
};

use super::{RequestHeader, ResponseHeader, ServiceRequest, ServiceResponse};

// =============================================================================
// Enumerations
// =============================================================================

/// Direction to follow references in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrowseDirection {
    /// Forward references only.
    #[default]
    Forward = 0,
    /// Inverse references only.
    Inverse = 1,
    /// Both directions.
    Both = 2,
}

/// The class of a node in the address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeClass {
    /// Class was not returned.
    Unspecified = 0,
    /// An object.
    Object = 1,
    /// A variable.
    Variable = 2,
    /// A method.
    Method = 4,
    /// An object type.
    ObjectType = 8,
    /// A variable type.
    VariableType = 16,
    /// A reference type.
    ReferenceType = 32,
    /// A data type.
    DataType = 64,
    /// A view.
    View = 128,
}

impl NodeClass {
    fn from_u32(value: u32) -> CodecResult<Self> {
        match value {
            0 => Ok(Self::Unspecified),
            1 => Ok(Self::Object),
            2 => Ok(Self::Variable),
            4 => Ok(Self::Method),
            8 => Ok(Self::ObjectType),
            16 => Ok(Self::VariableType),
            32 => Ok(Self::ReferenceType),
            64 => Ok(Self::DataType),
            128 => Ok(Self::View),
            other => Err(CodecError::InvalidEnumValue {
                name: "NodeClass",
                value: i64::from(other),
            }),
        }
    }
}

// =============================================================================
// Request structures
// =============================================================================

/// The view to browse (null = the whole address space).
#[derive(Debug, Clone, Default)]
pub struct ViewDescription {
    /// View node id, null for the entire address space.
    pub view_id: NodeId,
    /// Server timestamp of the view version to browse.
    pub timestamp: UaDateTime,
    /// View version (0 = current).
    pub view_version: u32,
}

impl BinaryEncode for ViewDescription {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        self.view_id.encode(encoder)?;
        self.timestamp.encode(encoder)?;
        encoder.write_u32(self.view_version);
        Ok(())
    }
}

/// One node to browse from.
#[derive(Debug, Clone)]
pub struct BrowseDescription {
    /// Starting node.
    pub node_id: NodeId,
    /// Direction to follow references in.
    pub browse_direction: BrowseDirection,
    /// Reference type filter (null = all references).
    pub reference_type_id: NodeId,
    /// Whether subtypes of the reference type match too.
    pub include_subtypes: bool,
    /// Node class mask (0 = all classes).
    pub node_class_mask: u32,
    /// Which result fields to fill in (0x3F = all).
    pub result_mask: u32,
}

impl BrowseDescription {
    /// Browses forward hierarchical references from `node_id`, all node
    /// classes, all result fields.
    pub fn hierarchical(node_id: NodeId) -> Self {
        Self {
            node_id,
            browse_direction: BrowseDirection::Forward,
            reference_type_id: NodeId::HIERARCHICAL_REFERENCES,
            include_subtypes: true,
            node_class_mask: 0,
            result_mask: 0x3F,
        }
    }
}

impl BinaryEncode for BrowseDescription {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        self.node_id.encode(encoder)?;
        encoder.write_u32(self.browse_direction as u32);
        self.reference_type_id.encode(encoder)?;
        encoder.write_bool(self.include_subtypes);
        encoder.write_u32(self.node_class_mask);
        encoder.write_u32(self.result_mask);
        Ok(())
    }
}

// =============================================================================
// Browse
// =============================================================================

/// Browses references from one or more starting nodes.
#[derive(Debug, Clone)]
pub struct BrowseRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// The view to browse.
    pub view: ViewDescription,
    /// Per-starting-node cap on returned references (0 = no cap).
    pub requested_max_references_per_node: u32,
    /// The starting nodes.
    pub nodes_to_browse: Vec<BrowseDescription>,
}

impl BinaryEncode for BrowseRequest {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        self.request_header.encode(encoder)?;
        self.view.encode(encoder)?;
        encoder.write_u32(self.requested_max_references_per_node);
        encode_array(encoder, Some(&self.nodes_to_browse))
    }
}

impl ServiceRequest for BrowseRequest {
    const TYPE_ID: u32 = 527;
    type Response = BrowseResponse;

    fn request_header(&self) -> &RequestHeader {
        &self.request_header
    }
}

/// One reference found while browsing.
#[derive(Debug, Clone)]
pub struct ReferenceDescription {
    /// The reference type.
    pub reference_type_id: NodeId,
    /// `true` if the reference is a forward reference.
    pub is_forward: bool,
    /// The target node.
    pub node_id: ExpandedNodeId,
    /// Browse name of the target.
    pub browse_name: QualifiedName,
    /// Display name of the target.
    pub display_name: LocalizedText,
    /// Class of the target node.
    pub node_class: NodeClass,
    /// Type definition of the target, for objects and variables.
    pub type_definition: ExpandedNodeId,
}

impl BinaryDecode for ReferenceDescription {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        Ok(Self {
            reference_type_id: NodeId::decode(decoder)?,
            is_forward: decoder.read_bool()?,
            node_id: ExpandedNodeId::decode(decoder)?,
            browse_name: QualifiedName::decode(decoder)?,
            display_name: LocalizedText::decode(decoder)?,
            node_class: NodeClass::from_u32(decoder.read_u32()?)?,
            type_definition: ExpandedNodeId::decode(decoder)?,
        })
    }
}

/// Result for one starting node. A non-null continuation point means the
/// server truncated the reference list; releasing it requires BrowseNext,
/// which this client does not issue, so callers treat it as a truncation
/// marker only.
#[derive(Debug, Clone)]
pub struct BrowseResult {
    /// Status for this starting node.
    pub status_code: StatusCode,
    /// Continuation point, non-null if the result was truncated.
    pub continuation_point: Option<Vec<u8>>,
    /// The references found.
    pub references: Option<Vec<ReferenceDescription>>,
}

impl BrowseResult {
    /// Returns `true` if the server truncated the reference list.
    pub fn is_truncated(&self) -> bool {
        self.continuation_point.is_some()
    }
}

impl BinaryDecode for BrowseResult {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        Ok(Self {
            status_code: StatusCode::decode(decoder)?,
            continuation_point: decoder.read_opt_byte_string()?,
            references: decode_array(decoder)?,
        })
    }
}

/// Response to [`BrowseRequest`]. Results are positional.
#[derive(Debug, Clone)]
pub struct BrowseResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// One result per starting node.
    pub results: Option<Vec<BrowseResult>>,
    /// Per-result diagnostics, if requested.
    pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
}

impl BinaryDecode for BrowseResponse {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        Ok(Self {
            response_header: ResponseHeader::decode(decoder)?,
            results: decode_array(decoder)?,
            diagnostic_infos: decode_array(decoder)?,
        })
    }
}

impl ServiceResponse for BrowseResponse {
    const TYPE_ID: u32 = 530;

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
    fn test_hierarchical_browse_defaults() {
        let description = BrowseDescription::hierarchical(NodeId::OBJECTS_FOLDER);
        assert_eq!(description.reference_type_id, NodeId::HIERARCHICAL_REFERENCES);
        assert_eq!(description.node_id, NodeId::OBJECTS_FOLDER);
        assert!(description.include_subtypes);
    }

    #[test]
    fn test_browse_request_envelope_type_id() {
        let request = BrowseRequest {
            request_header: RequestHeader::new(NodeId::null(), 4, 5000),
            view: ViewDescription::default(),
            requested_max_references_per_node: 0,
            nodes_to_browse: vec![BrowseDescription::hierarchical(NodeId::OBJECTS_FOLDER)],
        };
        let bytes = encode_message(&request).unwrap();
        // Four-byte NodeId form for i=527.
        assert_eq!(&bytes[..4], &[0x01, 0x00, 0x0F, 0x02]);
    }

    #[test]
    fn test_browse_response_decode() {
        let mut encoder = Encoder::new();
        NodeId::numeric(0, BrowseResponse::TYPE_ID)
            .encode(&mut encoder)
            .unwrap();
        ResponseHeader::default().encode(&mut encoder).unwrap();
        encoder.write_array_len(Some(1)).unwrap();
        // One BrowseResult with a single reference.
        StatusCode::GOOD.encode(&mut encoder).unwrap();
        encoder.write_opt_byte_string(None).unwrap(); // continuation point
        encoder.write_array_len(Some(1)).unwrap();
        NodeId::numeric(0, 35).encode(&mut encoder).unwrap(); // Organizes
        encoder.write_bool(true);
        ExpandedNodeId::local(NodeId::SERVER)
            .encode(&mut encoder)
            .unwrap();
        QualifiedName::new(0, "Server").encode(&mut encoder).unwrap();
        LocalizedText::new("Server").encode(&mut encoder).unwrap();
        encoder.write_u32(NodeClass::Object as u32);
        ExpandedNodeId::local(NodeId::null())
            .encode(&mut encoder)
            .unwrap();
        encoder.write_array_len(None).unwrap(); // diagnostics
        let bytes = encoder.finish();

        match decode_message::<BrowseResponse>(&bytes).unwrap() {
            DecodedResponse::Response(resp) => {
                let results = resp.results.unwrap();
                assert_eq!(results.len(), 1);
                assert!(!results[0].is_truncated());
                let refs = results[0].references.as_deref().unwrap();
                assert_eq!(refs.len(), 1);
                assert_eq!(refs[0].browse_name.name.as_deref(), Some("Server"));
                assert_eq!(refs[0].node_class, NodeClass::Object);
            }
            DecodedResponse::Fault(_) => panic!("unexpected fault"),
        }
    }
}
