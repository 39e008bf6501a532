// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA diagnostic client: secure channel, session and subscription
//! management over the binary transport.
//!
//! [`Client::connect`] runs the whole connection sequence (TCP, handshake,
//! OpenSecureChannel, endpoint discovery, CreateSession, ActivateSession)
//! and hands back a cloneable handle. A background task owns the connection,
//! matching responses to requests by id so reads, writes, browses and the
//! subscription publish pump can share it. The task also keeps the link
//! healthy: periodic keep-alive reads, secure channel token renewal before
//! expiry, and reconnection with exponential backoff that recreates the
//! session and every live subscription.
//!
//! ```no_run
//! use uascope_client::{Client, ClientConfig};
//! use uascope_codec::NodeId;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::builder("opc.tcp://plc:4840").build()?;
//! let client = Client::connect(config).await?;
//! let value = client.read(&NodeId::string(2, "Process.Temperature")).await?;
//! println!("{value:?}");
//! client.disconnect().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod channel;
mod client;
mod config;
mod error;
mod retry;
mod session;
mod subscription;

pub use client::{ByteStream, Client, ClientStats};
pub use config::{ClientConfig, ClientConfigBuilder, IdentityToken, SecurityMode};
pub use error::{ClientError, ClientResult};
pub use retry::{Backoff, RetryConfig};
pub use session::SessionState;
pub use subscription::{DataChange, SubscriptionHandle, SubscriptionOptions};
