// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Encoding and decoding error types.
//!
//! Decoding operates on untrusted input from the network, so every failure
//! mode maps to a typed error rather than a panic.

use thiserror::Error;

/// Result alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

// =============================================================================
// CodecError
// =============================================================================

/// Errors produced while encoding or decoding OPC UA binary data.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The input ended before the value was fully decoded.
    #[error("Unexpected end of input: needed {needed} more byte(s) at offset {offset}")]
    UnexpectedEof {
        /// Bytes still required.
        needed: usize,
        /// Offset where the shortfall occurred.
        offset: usize,
    },

    /// A length-prefixed field declared a negative length other than -1.
    #[error("Invalid length prefix: {length}")]
    InvalidLength {
        /// The declared length.
        length: i32,
    },

    /// A declared array or string length exceeds the remaining input.
    #[error("Declared length {declared} exceeds remaining input ({remaining} bytes)")]
    LengthExceedsInput {
        /// Declared element or byte count.
        declared: usize,
        /// Bytes remaining in the buffer.
        remaining: usize,
    },

    /// A string field contained invalid UTF-8.
    #[error("Invalid UTF-8 in string field")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// Unknown NodeId encoding byte.
    #[error("Unknown NodeId encoding byte: {encoding:#04x}")]
    UnknownNodeIdEncoding {
        /// The encoding byte.
        encoding: u8,
    },

    /// Unknown Variant type id.
    #[error("Unknown Variant type id: {type_id}")]
    UnknownVariantType {
        /// The type id from the encoding byte.
        type_id: u8,
    },

    /// A decoded enumeration value is out of range.
    #[error("Value {value} is not valid for enumeration {name}")]
    InvalidEnumValue {
        /// Enumeration name.
        name: &'static str,
        /// The offending value.
        value: i64,
    },

    /// The message body carried an unexpected type id.
    #[error("Unexpected message type id: expected i={expected}, got {actual}")]
    UnexpectedTypeId {
        /// Expected DefaultBinary type id.
        expected: u32,
        /// The type id actually present.
        actual: String,
    },

    /// Nesting depth limit exceeded while decoding recursive structures.
    #[error("Maximum decoding depth {max} exceeded")]
    DepthLimitExceeded {
        /// Configured maximum depth.
        max: u32,
    },

    /// A string field exceeds a protocol-imposed length cap.
    #[error("String of {length} byte(s) exceeds the {max} byte limit")]
    StringTooLong {
        /// Byte length of the offending string.
        length: usize,
        /// The cap in force.
        max: usize,
    },

    /// An encoded value cannot be represented on the wire.
    #[error("Value not encodable: {reason}")]
    NotEncodable {
        /// Why the value was rejected.
        reason: String,
    },
}

impl CodecError {
    /// Creates a not-encodable error.
    pub fn not_encodable(reason: impl Into<String>) -> Self {
        Self::NotEncodable {
            reason: reason.into(),
        }
    }
}
