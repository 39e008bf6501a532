// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Variant and DataValue.
//!
//! A `Variant` holds any scalar built-in value or a single-dimension array of
//! one scalar type. `DataValue` pairs a variant with status and timestamps,
//! using the field mask encoding of Part 6.

use std::fmt;

use uuid::Uuid;

use crate::encoding::{BinaryDecode, BinaryEncode, Decoder, Encoder};
use crate::error::{CodecError, CodecResult};
use crate::types::{
    decode_guid, encode_guid, ExpandedNodeId, LocalizedText, NodeId, QualifiedName, StatusCode,
    UaDateTime,
};

// =============================================================================
// Variant
// =============================================================================

/// Array flag bit in the variant encoding byte.
const ARRAY_FLAG: u8 = 0x80;

/// Array-dimensions flag bit in the variant encoding byte.
const DIMENSIONS_FLAG: u8 = 0x40;

/// A value of any OPC UA built-in scalar type, or an array of one such type.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Variant {
    /// The absence of a value.
    #[default]
    Null,
    /// Boolean.
    Boolean(bool),
    /// Signed byte.
    SByte(i8),
    /// Unsigned byte.
    Byte(u8),
    /// 16-bit signed integer.
    Int16(i16),
    /// 16-bit unsigned integer.
    UInt16(u16),
    /// 32-bit signed integer.
    Int32(i32),
    /// 32-bit unsigned integer.
    UInt32(u32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit unsigned integer.
    UInt64(u64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit double.
    Double(f64),
    /// String.
    String(Option<String>),
    /// DateTime.
    DateTime(UaDateTime),
    /// GUID.
    Guid(Uuid),
    /// Byte string.
    ByteString(Option<Vec<u8>>),
    /// Node id.
    NodeId(NodeId),
    /// Expanded node id.
    ExpandedNodeId(ExpandedNodeId),
    /// Status code.
    StatusCode(StatusCode),
    /// Qualified name.
    QualifiedName(QualifiedName),
    /// Localized text.
    LocalizedText(LocalizedText),
    /// Single-dimension array of one scalar type.
    Array(Vec<Variant>),
}

impl Variant {
    /// Returns the wire type id for a scalar variant, or `None` for
    /// `Null` and `Array`.
    fn scalar_type_id(&self) -> Option<u8> {
        Some(match self {
            Self::Null | Self::Array(_) => return None,
            Self::Boolean(_) => 1,
            Self::SByte(_) => 2,
            Self::Byte(_) => 3,
            Self::Int16(_) => 4,
            Self::UInt16(_) => 5,
            Self::Int32(_) => 6,
            Self::UInt32(_) => 7,
            Self::Int64(_) => 8,
            Self::UInt64(_) => 9,
            Self::Float(_) => 10,
            Self::Double(_) => 11,
            Self::String(_) => 12,
            Self::DateTime(_) => 13,
            Self::Guid(_) => 14,
            Self::ByteString(_) => 15,
            Self::NodeId(_) => 17,
            Self::ExpandedNodeId(_) => 18,
            Self::StatusCode(_) => 19,
            Self::QualifiedName(_) => 20,
            Self::LocalizedText(_) => 21,
        })
    }

    /// Returns the human-readable type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Boolean(_) => "Boolean",
            Self::SByte(_) => "SByte",
            Self::Byte(_) => "Byte",
            Self::Int16(_) => "Int16",
            Self::UInt16(_) => "UInt16",
            Self::Int32(_) => "Int32",
            Self::UInt32(_) => "UInt32",
            Self::Int64(_) => "Int64",
            Self::UInt64(_) => "UInt64",
            Self::Float(_) => "Float",
            Self::Double(_) => "Double",
            Self::String(_) => "String",
            Self::DateTime(_) => "DateTime",
            Self::Guid(_) => "Guid",
            Self::ByteString(_) => "ByteString",
            Self::NodeId(_) => "NodeId",
            Self::ExpandedNodeId(_) => "ExpandedNodeId",
            Self::StatusCode(_) => "StatusCode",
            Self::QualifiedName(_) => "QualifiedName",
            Self::LocalizedText(_) => "LocalizedText",
            Self::Array(_) => "Array",
        }
    }

    /// Returns `true` for the null variant.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Coerces a numeric or boolean value to f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Boolean(v) => Some(f64::from(u8::from(*v))),
            Self::SByte(v) => Some(f64::from(*v)),
            Self::Byte(v) => Some(f64::from(*v)),
            Self::Int16(v) => Some(f64::from(*v)),
            Self::UInt16(v) => Some(f64::from(*v)),
            Self::Int32(v) => Some(f64::from(*v)),
            Self::UInt32(v) => Some(f64::from(*v)),
            Self::Int64(v) => Some(*v as f64),
            Self::UInt64(v) => Some(*v as f64),
            Self::Float(v) => Some(f64::from(*v)),
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Coerces an integer value to i64, rejecting lossy conversions.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Boolean(v) => Some(i64::from(*v)),
            Self::SByte(v) => Some(i64::from(*v)),
            Self::Byte(v) => Some(i64::from(*v)),
            Self::Int16(v) => Some(i64::from(*v)),
            Self::UInt16(v) => Some(i64::from(*v)),
            Self::Int32(v) => Some(i64::from(*v)),
            Self::UInt32(v) => Some(i64::from(*v)),
            Self::Int64(v) => Some(*v),
            Self::UInt64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Returns the string contents, if this is a string variant.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(Some(v)) => Some(v),
            _ => None,
        }
    }

    fn encode_scalar_body(&self, encoder: &mut Encoder) -> CodecResult<()> {
        match self {
            Self::Null | Self::Array(_) => unreachable!("not a scalar"),
            Self::Boolean(v) => encoder.write_bool(*v),
            Self::SByte(v) => encoder.write_i8(*v),
            Self::Byte(v) => encoder.write_u8(*v),
            Self::Int16(v) => encoder.write_i16(*v),
            Self::UInt16(v) => encoder.write_u16(*v),
            Self::Int32(v) => encoder.write_i32(*v),
            Self::UInt32(v) => encoder.write_u32(*v),
            Self::Int64(v) => encoder.write_i64(*v),
            Self::UInt64(v) => encoder.write_u64(*v),
            Self::Float(v) => encoder.write_f32(*v),
            Self::Double(v) => encoder.write_f64(*v),
            Self::String(v) => encoder.write_opt_string(v.as_deref())?,
            Self::DateTime(v) => v.encode(encoder)?,
            Self::Guid(v) => encode_guid(encoder, v),
            Self::ByteString(v) => encoder.write_opt_byte_string(v.as_deref())?,
            Self::NodeId(v) => v.encode(encoder)?,
            Self::ExpandedNodeId(v) => v.encode(encoder)?,
            Self::StatusCode(v) => v.encode(encoder)?,
            Self::QualifiedName(v) => v.encode(encoder)?,
            Self::LocalizedText(v) => v.encode(encoder)?,
        }
        Ok(())
    }

    fn decode_scalar_body(decoder: &mut Decoder<'_>, type_id: u8) -> CodecResult<Self> {
        Ok(match type_id {
            1 => Self::Boolean(decoder.read_bool()?),
            2 => Self::SByte(decoder.read_i8()?),
            3 => Self::Byte(decoder.read_u8()?),
            4 => Self::Int16(decoder.read_i16()?),
            5 => Self::UInt16(decoder.read_u16()?),
            6 => Self::Int32(decoder.read_i32()?),
            7 => Self::UInt32(decoder.read_u32()?),
            8 => Self::Int64(decoder.read_i64()?),
            9 => Self::UInt64(decoder.read_u64()?),
            10 => Self::Float(decoder.read_f32()?),
            11 => Self::Double(decoder.read_f64()?),
            12 => Self::String(decoder.read_opt_string()?),
            13 => Self::DateTime(UaDateTime::decode(decoder)?),
            14 => Self::Guid(decode_guid(decoder)?),
            15 => Self::ByteString(decoder.read_opt_byte_string()?),
            17 => Self::NodeId(NodeId::decode(decoder)?),
            18 => Self::ExpandedNodeId(ExpandedNodeId::decode(decoder)?),
            19 => Self::StatusCode(StatusCode::decode(decoder)?),
            20 => Self::QualifiedName(QualifiedName::decode(decoder)?),
            21 => Self::LocalizedText(LocalizedText::decode(decoder)?),
            other => return Err(CodecError::UnknownVariantType { type_id: other }),
        })
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::SByte(v) => write!(f, "{v}"),
            Self::Byte(v) => write!(f, "{v}"),
            Self::Int16(v) => write!(f, "{v}"),
            Self::UInt16(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::UInt32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::UInt64(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::String(Some(v)) => write!(f, "{v}"),
            Self::String(None) | Self::ByteString(None) => write!(f, "null"),
            Self::DateTime(v) => write!(f, "{v}"),
            Self::Guid(v) => write!(f, "{v}"),
            Self::ByteString(Some(v)) => write!(f, "<{} bytes>", v.len()),
            Self::NodeId(v) => write!(f, "{v}"),
            Self::ExpandedNodeId(v) => write!(f, "{v}"),
            Self::StatusCode(v) => write!(f, "{v}"),
            Self::QualifiedName(v) => write!(f, "{v}"),
            Self::LocalizedText(v) => write!(f, "{v}"),
            Self::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl BinaryEncode for Variant {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        match self {
            Self::Null => {
                encoder.write_u8(0);
                Ok(())
            }
            Self::Array(items) => {
                // All elements must share one scalar type.
                let type_id = items
                    .first()
                    .and_then(Variant::scalar_type_id)
                    .ok_or_else(|| {
                        CodecError::not_encodable("array variant must hold scalar elements")
                    })?;
                for item in items {
                    if item.scalar_type_id() != Some(type_id) {
                        return Err(CodecError::not_encodable(format!(
                            "mixed element types in array variant ({} vs {})",
                            items[0].type_name(),
                            item.type_name()
                        )));
                    }
                }
                encoder.write_u8(type_id | ARRAY_FLAG);
                encoder.write_array_len(Some(items.len()))?;
                for item in items {
                    item.encode_scalar_body(encoder)?;
                }
                Ok(())
            }
            scalar => {
                let type_id = scalar.scalar_type_id().expect("scalar variant");
                encoder.write_u8(type_id);
                scalar.encode_scalar_body(encoder)
            }
        }
    }
}

impl BinaryDecode for Variant {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        decoder.enter()?;
        let encoding = decoder.read_u8()?;
        let type_id = encoding & 0x3F;
        let value = if encoding == 0 {
            Self::Null
        } else if encoding & ARRAY_FLAG != 0 {
            let len = decoder.read_array_len()?.unwrap_or(0);
            let mut items = Vec::with_capacity(len.min(4096));
            for _ in 0..len {
                items.push(Self::decode_scalar_body(decoder, type_id)?);
            }
            if encoding & DIMENSIONS_FLAG != 0 {
                // Multi-dimensional arrays are flattened; consume dimensions.
                let dims = decoder.read_array_len()?.unwrap_or(0);
                for _ in 0..dims {
                    decoder.read_i32()?;
                }
            }
            Self::Array(items)
        } else {
            Self::decode_scalar_body(decoder, type_id)?
        };
        decoder.leave();
        Ok(value)
    }
}

impl From<f64> for Variant {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<i32> for Variant {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<bool> for Variant {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Self::String(Some(v.to_string()))
    }
}

// =============================================================================
// DataValue
// =============================================================================

/// A value with its quality and timestamps.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataValue {
    /// The value, if present.
    pub value: Option<Variant>,
    /// Status code; absent means Good.
    pub status: Option<StatusCode>,
    /// Timestamp assigned by the data source.
    pub source_timestamp: Option<UaDateTime>,
    /// Sub-tick picoseconds for the source timestamp.
    pub source_picoseconds: Option<u16>,
    /// Timestamp assigned by the server.
    pub server_timestamp: Option<UaDateTime>,
    /// Sub-tick picoseconds for the server timestamp.
    pub server_picoseconds: Option<u16>,
}

impl DataValue {
    /// Creates a good-quality value with the current source timestamp.
    pub fn new(value: Variant) -> Self {
        Self {
            value: Some(value),
            source_timestamp: Some(UaDateTime::now()),
            ..Default::default()
        }
    }

    /// Creates a value carrying only a variant, no status or timestamps.
    pub fn value_only(value: Variant) -> Self {
        Self {
            value: Some(value),
            ..Default::default()
        }
    }

    /// Creates a value-less result carrying only a status code.
    pub fn from_status(status: StatusCode) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Returns the effective status (absent status means Good).
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::GOOD)
    }

    /// Returns `true` if the effective status is Good.
    pub fn is_good(&self) -> bool {
        self.status().is_good()
    }
}

impl BinaryEncode for DataValue {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        let mut mask = 0u8;
        if self.value.is_some() {
            mask |= 0x01;
        }
        if self.status.is_some() {
            mask |= 0x02;
        }
        if self.source_timestamp.is_some() {
            mask |= 0x04;
        }
        if self.server_timestamp.is_some() {
            mask |= 0x08;
        }
        if self.source_picoseconds.is_some() {
            mask |= 0x10;
        }
        if self.server_picoseconds.is_some() {
            mask |= 0x20;
        }
        encoder.write_u8(mask);
        if let Some(v) = &self.value {
            v.encode(encoder)?;
        }
        if let Some(v) = self.status {
            v.encode(encoder)?;
        }
        if let Some(v) = self.source_timestamp {
            v.encode(encoder)?;
        }
        if let Some(v) = self.source_picoseconds {
            encoder.write_u16(v);
        }
        if let Some(v) = self.server_timestamp {
            v.encode(encoder)?;
        }
        if let Some(v) = self.server_picoseconds {
            encoder.write_u16(v);
        }
        Ok(())
    }
}

impl BinaryDecode for DataValue {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        let mask = decoder.read_u8()?;
        let mut dv = DataValue::default();
        if mask & 0x01 != 0 {
            dv.value = Some(Variant::decode(decoder)?);
        }
        if mask & 0x02 != 0 {
            dv.status = Some(StatusCode::decode(decoder)?);
        }
        if mask & 0x04 != 0 {
            dv.source_timestamp = Some(UaDateTime::decode(decoder)?);
        }
        if mask & 0x10 != 0 {
            dv.source_picoseconds = Some(decoder.read_u16()?);
        }
        if mask & 0x08 != 0 {
            dv.server_timestamp = Some(UaDateTime::decode(decoder)?);
        }
        if mask & 0x20 != 0 {
            dv.server_picoseconds = Some(decoder.read_u16()?);
        }
        Ok(dv)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: &Variant) {
        let bytes = value.encode_to_vec().unwrap();
        assert_eq!(&Variant::decode_from_slice(&bytes).unwrap(), value);
    }

    #[test]
    fn test_null_variant_is_one_byte() {
        assert_eq!(Variant::Null.encode_to_vec().unwrap(), vec![0]);
    }

    #[test]
    fn test_scalar_round_trips() {
        round_trip(&Variant::Double(983.5));
        round_trip(&Variant::Boolean(true));
        round_trip(&Variant::String(Some("DynamicData".to_string())));
        round_trip(&Variant::String(None));
        round_trip(&Variant::NodeId(NodeId::string(1, "dynamic.double.value")));
        round_trip(&Variant::StatusCode(StatusCode::BAD_TIMEOUT));
        round_trip(&Variant::LocalizedText(LocalizedText::with_locale(
            "en-US",
            "DynamicData",
        )));
    }

    #[test]
    fn test_double_wire_form() {
        // Type id 11 followed by the little-endian IEEE 754 bits.
        let bytes = Variant::Double(0.5).encode_to_vec().unwrap();
        assert_eq!(bytes[0], 11);
        assert_eq!(&bytes[1..], &0.5f64.to_le_bytes());
    }

    #[test]
    fn test_array_round_trip() {
        round_trip(&Variant::Array(vec![
            Variant::Int32(1),
            Variant::Int32(2),
            Variant::Int32(3),
        ]));
    }

    #[test]
    fn test_mixed_array_rejected() {
        let v = Variant::Array(vec![Variant::Int32(1), Variant::Double(2.0)]);
        assert!(v.encode_to_vec().is_err());
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(Variant::Int16(-3).as_f64(), Some(-3.0));
        assert_eq!(Variant::UInt64(u64::MAX).as_i64(), None);
        assert_eq!(Variant::Double(2.5).as_i64(), None);
    }

    #[test]
    fn test_data_value_masks() {
        let full = DataValue {
            value: Some(Variant::Double(1.5)),
            status: Some(StatusCode::GOOD),
            source_timestamp: Some(UaDateTime::now()),
            server_timestamp: Some(UaDateTime::now()),
            ..Default::default()
        };
        let bytes = full.encode_to_vec().unwrap();
        assert_eq!(bytes[0], 0x0F);
        assert_eq!(DataValue::decode_from_slice(&bytes).unwrap(), full);

        // Empty data value encodes as a lone zero mask.
        assert_eq!(DataValue::default().encode_to_vec().unwrap(), vec![0]);
    }

    #[test]
    fn test_effective_status_defaults_to_good() {
        let dv = DataValue::value_only(Variant::Int32(5));
        assert!(dv.is_good());
        assert_eq!(dv.status(), StatusCode::GOOD);
    }
}
