// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA built-in types.
//!
//! This module provides the built-in types of OPC UA Part 3/6 together with
//! their binary wire forms:
//!
//! - **NodeId / ExpandedNodeId**: all identifier kinds with the compact
//!   two-byte and four-byte encodings
//! - **UaDateTime**: 100 ns ticks since 1601-01-01 UTC, chrono-backed
//! - **StatusCode**: status word with severity helpers and common names
//! - **QualifiedName / LocalizedText / DiagnosticInfo / ExtensionObject**
//!
//! # Examples
//!
//! ```
//! use uascope_codec::types::NodeId;
//!
//! let node: NodeId = "ns=1;s=dynamic.double.value".parse().unwrap();
//! assert_eq!(node.to_opc_string(), "ns=1;s=dynamic.double.value");
//! ```

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::encoding::{BinaryDecode, BinaryEncode, Decoder, Encoder};
use crate::error::{CodecError, CodecResult};

// =============================================================================
// UaDateTime
// =============================================================================

/// Seconds between the OPC UA epoch (1601-01-01) and the Unix epoch.
const EPOCH_DIFF_SECS: i64 = 11_644_473_600;

/// Ticks per second (one tick is 100 ns).
const TICKS_PER_SEC: i64 = 10_000_000;

/// OPC UA DateTime: 100 ns intervals since 1601-01-01 00:00:00 UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct UaDateTime(pub i64);

impl UaDateTime {
    /// The null DateTime (tick 0).
    pub const NULL: UaDateTime = UaDateTime(0);

    /// Returns the current time.
    pub fn now() -> Self {
        Self::from_chrono(&Utc::now())
    }

    /// Converts from a chrono UTC timestamp, saturating outside the
    /// representable range.
    pub fn from_chrono(dt: &DateTime<Utc>) -> Self {
        let secs = dt.timestamp().saturating_add(EPOCH_DIFF_SECS);
        let ticks = secs
            .saturating_mul(TICKS_PER_SEC)
            .saturating_add(i64::from(dt.timestamp_subsec_nanos()) / 100);
        Self(ticks.max(0))
    }

    /// Converts to a chrono UTC timestamp, if representable.
    pub fn to_chrono(self) -> Option<DateTime<Utc>> {
        let unix_secs = self.0 / TICKS_PER_SEC - EPOCH_DIFF_SECS;
        let nanos = (self.0 % TICKS_PER_SEC) * 100;
        Utc.timestamp_opt(unix_secs, nanos as u32).single()
    }

    /// Returns `true` if this is the null DateTime.
    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for UaDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_chrono() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339()),
            None => write!(f, "<invalid datetime {}>", self.0),
        }
    }
}

impl BinaryEncode for UaDateTime {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        encoder.write_i64(self.0);
        Ok(())
    }
}

impl BinaryDecode for UaDateTime {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        Ok(Self(decoder.read_i64()?))
    }
}

// =============================================================================
// Guid
// =============================================================================

/// Encodes a GUID in its structured wire form (u32, u16, u16, [u8; 8]).
pub fn encode_guid(encoder: &mut Encoder, guid: &Uuid) {
    let (d1, d2, d3, d4) = guid.as_fields();
    encoder.write_u32(d1);
    encoder.write_u16(d2);
    encoder.write_u16(d3);
    encoder.write_bytes(d4);
}

/// Decodes a GUID from its structured wire form.
pub fn decode_guid(decoder: &mut Decoder<'_>) -> CodecResult<Uuid> {
    let d1 = decoder.read_u32()?;
    let d2 = decoder.read_u16()?;
    let d3 = decoder.read_u16()?;
    let d4: [u8; 8] = decoder.read_bytes(8)?.try_into().unwrap();
    Ok(Uuid::from_fields(d1, d2, d3, &d4))
}

// =============================================================================
// StatusCode
// =============================================================================

/// OPC UA status code.
///
/// The top two bits carry the severity: `00` good, `01` uncertain, `10` bad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StatusCode(pub u32);

impl StatusCode {
    /// The operation succeeded.
    pub const GOOD: StatusCode = StatusCode(0x0000_0000);
    /// Unspecified failure.
    pub const BAD: StatusCode = StatusCode(0x8000_0000);
    /// The operation timed out.
    pub const BAD_TIMEOUT: StatusCode = StatusCode(0x800A_0000);
    /// The secure channel id is not valid.
    pub const BAD_SECURE_CHANNEL_ID_INVALID: StatusCode = StatusCode(0x8022_0000);
    /// The session id is not valid.
    pub const BAD_SESSION_ID_INVALID: StatusCode = StatusCode(0x8025_0000);
    /// The session was closed by the client.
    pub const BAD_SESSION_CLOSED: StatusCode = StatusCode(0x8026_0000);
    /// The session has not been activated.
    pub const BAD_SESSION_NOT_ACTIVATED: StatusCode = StatusCode(0x8027_0000);
    /// The request carried too many operations.
    pub const BAD_TOO_MANY_OPERATIONS: StatusCode = StatusCode(0x8010_0000);
    /// The node id refers to an unknown node.
    pub const BAD_NODE_ID_UNKNOWN: StatusCode = StatusCode(0x8034_0000);
    /// The attribute is not supported for the node.
    pub const BAD_ATTRIBUTE_ID_INVALID: StatusCode = StatusCode(0x8035_0000);
    /// The subscription id is not valid.
    pub const BAD_SUBSCRIPTION_ID_INVALID: StatusCode = StatusCode(0x8028_0000);
    /// There are too many publish requests queued.
    pub const BAD_TOO_MANY_PUBLISH_REQUESTS: StatusCode = StatusCode(0x806D_0000);
    /// No subscription is available for the publish request.
    pub const BAD_NO_SUBSCRIPTION: StatusCode = StatusCode(0x8079_0000);
    /// The request was cancelled due to secure channel closure.
    pub const BAD_SECURE_CHANNEL_CLOSED: StatusCode = StatusCode(0x8086_0000);
    /// The operation could not complete because the connection was closed.
    pub const BAD_CONNECTION_CLOSED: StatusCode = StatusCode(0x80AE_0000);

    /// Returns `true` if the severity is Good.
    #[inline]
    pub fn is_good(self) -> bool {
        self.0 & 0xC000_0000 == 0
    }

    /// Returns `true` if the severity is Uncertain.
    #[inline]
    pub fn is_uncertain(self) -> bool {
        self.0 & 0xC000_0000 == 0x4000_0000
    }

    /// Returns `true` if the severity is Bad.
    #[inline]
    pub fn is_bad(self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    /// Returns the symbolic name for well-known codes.
    pub fn name(self) -> &'static str {
        match self.0 {
            0x0000_0000 => "Good",
            0x8000_0000 => "Bad",
            0x8001_0000 => "BadUnexpectedError",
            0x8002_0000 => "BadInternalError",
            0x8005_0000 => "BadCommunicationError",
            0x8006_0000 => "BadEncodingError",
            0x8007_0000 => "BadDecodingError",
            0x800A_0000 => "BadTimeout",
            0x800B_0000 => "BadServiceUnsupported",
            0x800F_0000 => "BadServerNotConnected",
            0x8010_0000 => "BadTooManyOperations",
            0x8022_0000 => "BadSecureChannelIdInvalid",
            0x8025_0000 => "BadSessionIdInvalid",
            0x8026_0000 => "BadSessionClosed",
            0x8027_0000 => "BadSessionNotActivated",
            0x8028_0000 => "BadSubscriptionIdInvalid",
            0x802A_0000 => "BadNonceInvalid",
            0x8034_0000 => "BadNodeIdUnknown",
            0x8035_0000 => "BadAttributeIdInvalid",
            0x803B_0000 => "BadNotReadable",
            0x803C_0000 => "BadNotWritable",
            0x806D_0000 => "BadTooManyPublishRequests",
            0x8079_0000 => "BadNoSubscription",
            0x8086_0000 => "BadSecureChannelClosed",
            0x80AE_0000 => "BadConnectionClosed",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#010x})", self.name(), self.0)
    }
}

impl BinaryEncode for StatusCode {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        encoder.write_u32(self.0);
        Ok(())
    }
}

impl BinaryDecode for StatusCode {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        Ok(Self(decoder.read_u32()?))
    }
}

// =============================================================================
// NodeId
// =============================================================================

/// The identifier part of a [`NodeId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Identifier {
    /// Numeric identifier (most common).
    Numeric(u32),
    /// String identifier.
    String(String),
    /// GUID identifier.
    Guid(Uuid),
    /// Opaque (byte string) identifier.
    Opaque(Vec<u8>),
}

/// OPC UA node identifier: namespace index plus identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    /// Namespace index (0 = OPC UA standard namespace).
    pub namespace: u16,
    /// The identifier.
    pub identifier: Identifier,
}

impl NodeId {
    /// Creates a numeric node id.
    #[inline]
    pub fn numeric(namespace: u16, value: u32) -> Self {
        Self {
            namespace,
            identifier: Identifier::Numeric(value),
        }
    }

    /// Creates a string node id.
    #[inline]
    pub fn string(namespace: u16, value: impl Into<String>) -> Self {
        Self {
            namespace,
            identifier: Identifier::String(value.into()),
        }
    }

    /// Creates a GUID node id.
    #[inline]
    pub fn guid(namespace: u16, value: Uuid) -> Self {
        Self {
            namespace,
            identifier: Identifier::Guid(value),
        }
    }

    /// Creates an opaque node id.
    #[inline]
    pub fn opaque(namespace: u16, value: Vec<u8>) -> Self {
        Self {
            namespace,
            identifier: Identifier::Opaque(value),
        }
    }

    /// The null node id (ns=0, i=0).
    #[inline]
    pub const fn null() -> Self {
        Self {
            namespace: 0,
            identifier: Identifier::Numeric(0),
        }
    }

    /// Returns `true` if this is the null node id.
    pub fn is_null(&self) -> bool {
        self.namespace == 0 && matches!(self.identifier, Identifier::Numeric(0))
    }

    /// Objects folder node (ns=0, i=85).
    pub const OBJECTS_FOLDER: NodeId = NodeId {
        namespace: 0,
        identifier: Identifier::Numeric(85),
    };

    /// Root folder node (ns=0, i=84).
    pub const ROOT_FOLDER: NodeId = NodeId {
        namespace: 0,
        identifier: Identifier::Numeric(84),
    };

    /// Server object node (ns=0, i=2253).
    pub const SERVER: NodeId = NodeId {
        namespace: 0,
        identifier: Identifier::Numeric(2253),
    };

    /// Server_ServerStatus_State variable (ns=0, i=2259), used for keep-alive.
    pub const SERVER_STATUS_STATE: NodeId = NodeId {
        namespace: 0,
        identifier: Identifier::Numeric(2259),
    };

    /// HierarchicalReferences reference type (ns=0, i=33).
    pub const HIERARCHICAL_REFERENCES: NodeId = NodeId {
        namespace: 0,
        identifier: Identifier::Numeric(33),
    };

    /// Returns the numeric value if this is a numeric identifier.
    pub fn as_numeric(&self) -> Option<u32> {
        match self.identifier {
            Identifier::Numeric(v) => Some(v),
            _ => None,
        }
    }

    /// Converts to the OPC UA text format (`ns=2;s=MyNode`).
    pub fn to_opc_string(&self) -> String {
        let id = match &self.identifier {
            Identifier::Numeric(v) => format!("i={v}"),
            Identifier::String(v) => format!("s={v}"),
            Identifier::Guid(v) => format!("g={v}"),
            Identifier::Opaque(v) => format!("b={}", BASE64.encode(v)),
        };
        if self.namespace == 0 {
            id
        } else {
            format!("ns={};{}", self.namespace, id)
        }
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_opc_string())
    }
}

impl FromStr for NodeId {
    type Err = CodecError;

    /// Parses the OPC UA text format: `[ns=<u16>;]{i|s|g|b}=<identifier>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| CodecError::not_encodable(format!("'{s}': {reason}"));

        let (namespace, rest) = match s.strip_prefix("ns=") {
            Some(rest) => {
                let (ns, id) = rest
                    .split_once(';')
                    .ok_or_else(|| invalid("missing ';' after namespace"))?;
                let ns: u16 = ns.parse().map_err(|_| invalid("invalid namespace index"))?;
                (ns, id)
            }
            None => (0, s),
        };

        let (kind, value) = rest
            .split_once('=')
            .ok_or_else(|| invalid("missing identifier discriminator"))?;
        match kind {
            "i" => {
                let v: u32 = value.parse().map_err(|_| invalid("invalid numeric id"))?;
                Ok(NodeId::numeric(namespace, v))
            }
            "s" => Ok(NodeId::string(namespace, value)),
            "g" => {
                let v = Uuid::parse_str(value).map_err(|_| invalid("invalid GUID"))?;
                Ok(NodeId::guid(namespace, v))
            }
            "b" => {
                let v = BASE64.decode(value).map_err(|_| invalid("invalid base64"))?;
                Ok(NodeId::opaque(namespace, v))
            }
            _ => Err(invalid("unknown identifier kind")),
        }
    }
}

impl BinaryEncode for NodeId {
    /// Encodes with the most compact form the value permits.
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        match &self.identifier {
            Identifier::Numeric(v) if self.namespace == 0 && *v <= 0xFF => {
                encoder.write_u8(0x00);
                encoder.write_u8(*v as u8);
            }
            Identifier::Numeric(v) if self.namespace <= 0xFF && *v <= 0xFFFF => {
                encoder.write_u8(0x01);
                encoder.write_u8(self.namespace as u8);
                encoder.write_u16(*v as u16);
            }
            Identifier::Numeric(v) => {
                encoder.write_u8(0x02);
                encoder.write_u16(self.namespace);
                encoder.write_u32(*v);
            }
            Identifier::String(v) => {
                encoder.write_u8(0x03);
                encoder.write_u16(self.namespace);
                encoder.write_string(v)?;
            }
            Identifier::Guid(v) => {
                encoder.write_u8(0x04);
                encoder.write_u16(self.namespace);
                encode_guid(encoder, v);
            }
            Identifier::Opaque(v) => {
                encoder.write_u8(0x05);
                encoder.write_u16(self.namespace);
                encoder.write_opt_byte_string(Some(v))?;
            }
        }
        Ok(())
    }
}

impl BinaryDecode for NodeId {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        // Mask off the ExpandedNodeId flag bits so this decoder can be shared.
        let encoding = decoder.read_u8()?;
        decode_node_id_body(decoder, encoding & 0x3F)
    }
}

// =============================================================================
// ExpandedNodeId
// =============================================================================

/// NodeId extended with an optional namespace URI and server index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ExpandedNodeId {
    /// The base node id.
    pub node_id: NodeId,
    /// Explicit namespace URI, overriding the namespace index when present.
    pub namespace_uri: Option<String>,
    /// Index into the server table (0 = local server).
    pub server_index: u32,
}

impl ExpandedNodeId {
    /// Wraps a local node id.
    pub fn local(node_id: NodeId) -> Self {
        Self {
            node_id,
            namespace_uri: None,
            server_index: 0,
        }
    }
}

impl fmt::Display for ExpandedNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.node_id)
    }
}

impl BinaryEncode for ExpandedNodeId {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        let mut inner = Encoder::new();
        self.node_id.encode(&mut inner)?;
        let mut bytes = inner.finish();
        if self.namespace_uri.is_some() {
            bytes[0] |= 0x80;
        }
        if self.server_index != 0 {
            bytes[0] |= 0x40;
        }
        encoder.write_bytes(&bytes);
        if let Some(uri) = &self.namespace_uri {
            encoder.write_string(uri)?;
        }
        if self.server_index != 0 {
            encoder.write_u32(self.server_index);
        }
        Ok(())
    }
}

impl BinaryDecode for ExpandedNodeId {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        // The encoding byte carries both the NodeId kind (low bits) and the
        // ExpandedNodeId flags (high bits).
        let flags = decoder.read_u8()?;
        let node_id = decode_node_id_body(decoder, flags & 0x3F)?;
        let namespace_uri = if flags & 0x80 != 0 {
            Some(decoder.read_string()?)
        } else {
            None
        };
        let server_index = if flags & 0x40 != 0 {
            decoder.read_u32()?
        } else {
            0
        };
        Ok(Self {
            node_id,
            namespace_uri,
            server_index,
        })
    }
}

/// Decodes a NodeId body given an already-consumed encoding byte.
fn decode_node_id_body(decoder: &mut Decoder<'_>, encoding: u8) -> CodecResult<NodeId> {
    match encoding {
        0x00 => Ok(NodeId::numeric(0, u32::from(decoder.read_u8()?))),
        0x01 => {
            let ns = u16::from(decoder.read_u8()?);
            Ok(NodeId::numeric(ns, u32::from(decoder.read_u16()?)))
        }
        0x02 => {
            let ns = decoder.read_u16()?;
            Ok(NodeId::numeric(ns, decoder.read_u32()?))
        }
        0x03 => {
            let ns = decoder.read_u16()?;
            Ok(NodeId::string(ns, decoder.read_string()?))
        }
        0x04 => {
            let ns = decoder.read_u16()?;
            Ok(NodeId::guid(ns, decode_guid(decoder)?))
        }
        0x05 => {
            let ns = decoder.read_u16()?;
            Ok(NodeId::opaque(ns, decoder.read_byte_string()?))
        }
        other => Err(CodecError::UnknownNodeIdEncoding { encoding: other }),
    }
}

// =============================================================================
// QualifiedName
// =============================================================================

/// Qualified name: namespace index plus name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct QualifiedName {
    /// Namespace index.
    pub namespace: u16,
    /// The name (null encodes as -1 length).
    pub name: Option<String>,
}

impl QualifiedName {
    /// Creates a qualified name.
    pub fn new(namespace: u16, name: impl Into<String>) -> Self {
        Self {
            namespace,
            name: Some(name.into()),
        }
    }

    /// The null qualified name.
    pub const fn null() -> Self {
        Self {
            namespace: 0,
            name: None,
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) if self.namespace != 0 => write!(f, "{}:{}", self.namespace, name),
            Some(name) => write!(f, "{name}"),
            None => write!(f, "<null>"),
        }
    }
}

impl BinaryEncode for QualifiedName {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        encoder.write_u16(self.namespace);
        encoder.write_opt_string(self.name.as_deref())
    }
}

impl BinaryDecode for QualifiedName {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        Ok(Self {
            namespace: decoder.read_u16()?,
            name: decoder.read_opt_string()?,
        })
    }
}

// =============================================================================
// LocalizedText
// =============================================================================

/// Localized text with optional locale and text fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LocalizedText {
    /// Locale id (e.g. `en-US`).
    pub locale: Option<String>,
    /// The text.
    pub text: Option<String>,
}

impl LocalizedText {
    /// Creates text without a locale.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            locale: None,
            text: Some(text.into()),
        }
    }

    /// Creates text with a locale.
    pub fn with_locale(locale: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            locale: Some(locale.into()),
            text: Some(text.into()),
        }
    }
}

impl fmt::Display for LocalizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text.as_deref().unwrap_or(""))
    }
}

impl BinaryEncode for LocalizedText {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        let mut mask = 0u8;
        if self.locale.is_some() {
            mask |= 0x01;
        }
        if self.text.is_some() {
            mask |= 0x02;
        }
        encoder.write_u8(mask);
        if let Some(locale) = &self.locale {
            encoder.write_string(locale)?;
        }
        if let Some(text) = &self.text {
            encoder.write_string(text)?;
        }
        Ok(())
    }
}

impl BinaryDecode for LocalizedText {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        let mask = decoder.read_u8()?;
        let locale = if mask & 0x01 != 0 {
            Some(decoder.read_string()?)
        } else {
            None
        };
        let text = if mask & 0x02 != 0 {
            Some(decoder.read_string()?)
        } else {
            None
        };
        Ok(Self { locale, text })
    }
}

// =============================================================================
// DiagnosticInfo
// =============================================================================

/// Diagnostic information attached to service results.
///
/// The client never sends diagnostics, but must be able to consume them when
/// a server includes them in a response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DiagnosticInfo {
    /// Index into the string table for the symbolic id.
    pub symbolic_id: Option<i32>,
    /// Index into the string table for the namespace URI.
    pub namespace_uri: Option<i32>,
    /// Index into the string table for the locale.
    pub locale: Option<i32>,
    /// Index into the string table for the localized text.
    pub localized_text: Option<i32>,
    /// Vendor-specific additional information.
    pub additional_info: Option<String>,
    /// Status code of an inner operation.
    pub inner_status_code: Option<StatusCode>,
    /// Nested diagnostic info.
    pub inner_diagnostic_info: Option<Box<DiagnosticInfo>>,
}

impl BinaryEncode for DiagnosticInfo {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        let mut mask = 0u8;
        if self.symbolic_id.is_some() {
            mask |= 0x01;
        }
        if self.namespace_uri.is_some() {
            mask |= 0x02;
        }
        if self.locale.is_some() {
            mask |= 0x08;
        }
        if self.localized_text.is_some() {
            mask |= 0x04;
        }
        if self.additional_info.is_some() {
            mask |= 0x10;
        }
        if self.inner_status_code.is_some() {
            mask |= 0x20;
        }
        if self.inner_diagnostic_info.is_some() {
            mask |= 0x40;
        }
        encoder.write_u8(mask);
        if let Some(v) = self.symbolic_id {
            encoder.write_i32(v);
        }
        if let Some(v) = self.namespace_uri {
            encoder.write_i32(v);
        }
        if let Some(v) = self.locale {
            encoder.write_i32(v);
        }
        if let Some(v) = self.localized_text {
            encoder.write_i32(v);
        }
        if let Some(v) = &self.additional_info {
            encoder.write_string(v)?;
        }
        if let Some(v) = self.inner_status_code {
            v.encode(encoder)?;
        }
        if let Some(v) = &self.inner_diagnostic_info {
            v.encode(encoder)?;
        }
        Ok(())
    }
}

impl BinaryDecode for DiagnosticInfo {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        decoder.enter()?;
        let mask = decoder.read_u8()?;
        let mut info = DiagnosticInfo::default();
        if mask & 0x01 != 0 {
            info.symbolic_id = Some(decoder.read_i32()?);
        }
        if mask & 0x02 != 0 {
            info.namespace_uri = Some(decoder.read_i32()?);
        }
        if mask & 0x08 != 0 {
            info.locale = Some(decoder.read_i32()?);
        }
        if mask & 0x04 != 0 {
            info.localized_text = Some(decoder.read_i32()?);
        }
        if mask & 0x10 != 0 {
            info.additional_info = Some(decoder.read_string()?);
        }
        if mask & 0x20 != 0 {
            info.inner_status_code = Some(StatusCode::decode(decoder)?);
        }
        if mask & 0x40 != 0 {
            info.inner_diagnostic_info = Some(Box::new(DiagnosticInfo::decode(decoder)?));
        }
        decoder.leave();
        Ok(info)
    }
}

// =============================================================================
// ExtensionObject
// =============================================================================

/// Extension object: a type id plus an optionally-present encoded body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExtensionObject {
    /// The encoding node id of the contained type.
    pub type_id: NodeId,
    /// The body, if present.
    pub body: Option<Vec<u8>>,
}

impl ExtensionObject {
    /// The null extension object.
    pub fn null() -> Self {
        Self::default()
    }

    /// Wraps an already-encoded binary body.
    pub fn binary(type_id: NodeId, body: Vec<u8>) -> Self {
        Self {
            type_id,
            body: Some(body),
        }
    }

    /// Encodes `value` and wraps it with the given DefaultBinary type id.
    pub fn from_encodable<T: BinaryEncode>(type_id: NodeId, value: &T) -> CodecResult<Self> {
        Ok(Self::binary(type_id, value.encode_to_vec()?))
    }

    /// Decodes the body as `T`, verifying the type id.
    pub fn decode_body<T: BinaryDecode>(&self, expected_type: u32) -> CodecResult<T> {
        if self.type_id.as_numeric() != Some(expected_type) || self.type_id.namespace != 0 {
            return Err(CodecError::UnexpectedTypeId {
                expected: expected_type,
                actual: self.type_id.to_string(),
            });
        }
        let body = self.body.as_deref().ok_or(CodecError::UnexpectedEof {
            needed: 1,
            offset: 0,
        })?;
        T::decode_from_slice(body)
    }
}

impl BinaryEncode for ExtensionObject {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        self.type_id.encode(encoder)?;
        match &self.body {
            None => encoder.write_u8(0x00),
            Some(body) => {
                encoder.write_u8(0x01);
                encoder.write_opt_byte_string(Some(body))?;
            }
        }
        Ok(())
    }
}

impl BinaryDecode for ExtensionObject {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        let type_id = NodeId::decode(decoder)?;
        let encoding = decoder.read_u8()?;
        let body = match encoding {
            0x00 => None,
            // XML bodies (0x02) are carried opaquely; the client never
            // interprets them.
            0x01 | 0x02 => decoder.read_opt_byte_string()?,
            other => {
                return Err(CodecError::InvalidEnumValue {
                    name: "ExtensionObjectEncoding",
                    value: i64::from(other),
                })
            }
        };
        Ok(Self { type_id, body })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<T: BinaryEncode + BinaryDecode + PartialEq + fmt::Debug>(value: &T) -> T {
        let bytes = value.encode_to_vec().unwrap();
        let decoded = T::decode_from_slice(&bytes).unwrap();
        assert_eq!(&decoded, value);
        decoded
    }

    #[test]
    fn test_datetime_chrono_conversion() {
        let now = Utc::now();
        let ua = UaDateTime::from_chrono(&now);
        let back = ua.to_chrono().unwrap();
        // Resolution is 100 ns, chrono carries nanoseconds.
        assert!((back - now).num_microseconds().unwrap().abs() < 1);
        assert!(!ua.is_null());
        assert!(UaDateTime::NULL.is_null());
    }

    #[test]
    fn test_node_id_compact_encodings() {
        // Two-byte form.
        let short = NodeId::numeric(0, 85);
        assert_eq!(short.encode_to_vec().unwrap(), vec![0x00, 85]);

        // Four-byte form.
        let four = NodeId::numeric(3, 1000);
        assert_eq!(four.encode_to_vec().unwrap(), vec![0x01, 3, 0xE8, 0x03]);

        // Full numeric form.
        let full = NodeId::numeric(300, 70000);
        let bytes = full.encode_to_vec().unwrap();
        assert_eq!(bytes[0], 0x02);
        round_trip(&full);
    }

    #[test]
    fn test_node_id_all_kinds_round_trip() {
        round_trip(&NodeId::numeric(2, 1001));
        round_trip(&NodeId::string(1, "dynamic.double.value"));
        round_trip(&NodeId::guid(4, Uuid::new_v4()));
        round_trip(&NodeId::opaque(5, vec![1, 2, 3, 4]));
    }

    #[test]
    fn test_node_id_well_known_constants() {
        assert!(NodeId::null().is_null());
        assert_eq!(NodeId::OBJECTS_FOLDER, NodeId::numeric(0, 85));
        assert_eq!(NodeId::HIERARCHICAL_REFERENCES, NodeId::numeric(0, 33));
        assert_eq!(NodeId::SERVER_STATUS_STATE.as_numeric(), Some(2259));
    }

    #[test]
    fn test_node_id_parse() {
        let n: NodeId = "ns=1;s=dynamic.double.value".parse().unwrap();
        assert_eq!(n, NodeId::string(1, "dynamic.double.value"));

        let n: NodeId = "i=2259".parse().unwrap();
        assert_eq!(n, NodeId::SERVER_STATUS_STATE);

        assert!("ns=1".parse::<NodeId>().is_err());
        assert!("ns=99999;i=1".parse::<NodeId>().is_err());
        assert!("x=5".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_expanded_node_id_with_uri() {
        let expanded = ExpandedNodeId {
            node_id: NodeId::numeric(2, 42),
            namespace_uri: Some("urn:example".to_string()),
            server_index: 7,
        };
        round_trip(&expanded);
        round_trip(&ExpandedNodeId::local(NodeId::string(1, "a")));
    }

    #[test]
    fn test_status_code_severity() {
        assert!(StatusCode::GOOD.is_good());
        assert!(StatusCode::BAD_TIMEOUT.is_bad());
        assert!(StatusCode(0x4000_0000).is_uncertain());
        assert_eq!(StatusCode::BAD_TIMEOUT.name(), "BadTimeout");
    }

    #[test]
    fn test_localized_text_masks() {
        round_trip(&LocalizedText::default());
        round_trip(&LocalizedText::new("DynamicData"));
        round_trip(&LocalizedText::with_locale("en-US", "DynamicData"));

        // Text-only value must encode mask 0x02 and skip the locale field.
        let bytes = LocalizedText::new("x").encode_to_vec().unwrap();
        assert_eq!(bytes[0], 0x02);
    }

    #[test]
    fn test_qualified_name_round_trip() {
        round_trip(&QualifiedName::null());
        round_trip(&QualifiedName::new(1, "DynamicDoubleValue"));
    }

    #[test]
    fn test_diagnostic_info_nested() {
        let info = DiagnosticInfo {
            symbolic_id: Some(3),
            additional_info: Some("inner".to_string()),
            inner_status_code: Some(StatusCode::BAD),
            inner_diagnostic_info: Some(Box::new(DiagnosticInfo {
                locale: Some(1),
                ..Default::default()
            })),
            ..Default::default()
        };
        round_trip(&info);
    }

    #[test]
    fn test_extension_object_body() {
        let inner = NodeId::string(2, "payload");
        let obj =
            ExtensionObject::from_encodable(NodeId::numeric(0, 999), &inner).unwrap();
        let out = round_trip(&obj);
        let decoded: NodeId = out.decode_body(999).unwrap();
        assert_eq!(decoded, inner);

        // Wrong expected type id is rejected.
        assert!(out.decode_body::<NodeId>(1000).is_err());
    }
}
