// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA TCP transport.
//!
//! Handles the byte-level conversation on one connection: the
//! hello/acknowledge handshake with buffer limit negotiation, frame headers,
//! and the chunked send and reassembly of secured messages. Security policy
//! None only; the security headers are written and parsed but nothing is
//! signed or encrypted.
//!
//! [`UaStream`] is generic over the underlying byte stream so the full
//! protocol can be exercised against an in-memory pipe in tests.

#![warn(missing_docs)]

pub mod connection;
pub mod error;
pub mod frame;
pub mod limits;

pub use connection::{EndpointTarget, Inbound, TcpConversation, UaStream, SECURITY_POLICY_NONE_URI};
pub use error::{TransportError, TransportResult};
pub use frame::{Acknowledge, ChunkKind, ErrorMessage, FrameHeader, Hello, MessageKind};
pub use limits::TransportLimits;
