// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA binary codec.
//!
//! Implements the DefaultBinary encoding for the built-in types, the variant
//! and data value containers, and the service messages a diagnostic client
//! needs: secure channel, session, read/write, browse and subscriptions.
//!
//! All multi-byte values are little-endian. Decoding is bounds-checked
//! against the input slice; declared lengths larger than the remaining input
//! are rejected before any allocation, and nested structures are depth
//! limited.
//!
//! # Example
//!
//! ```
//! use uascope_codec::encoding::{BinaryDecode, BinaryEncode};
//! use uascope_codec::types::NodeId;
//!
//! let node: NodeId = "ns=1;s=dynamic.double.value".parse().unwrap();
//! let bytes = node.encode_to_vec().unwrap();
//! assert_eq!(NodeId::decode_from_slice(&bytes).unwrap(), node);
//! ```

#![warn(missing_docs)]

pub mod encoding;
pub mod error;
pub mod services;
pub mod types;
pub mod variant;

pub use encoding::{BinaryDecode, BinaryEncode, Decoder, Encoder};
pub use error::{CodecError, CodecResult};
pub use types::{
    DiagnosticInfo, ExpandedNodeId, ExtensionObject, LocalizedText, NodeId, QualifiedName,
    StatusCode, UaDateTime,
};
pub use variant::{DataValue, Variant};
