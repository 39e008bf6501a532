// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! uascope command-line tool.
//!
//! Diagnostic CLI for OPC UA servers: endpoint discovery, one-shot and
//! scheduled reads, address space browsing and live subscription
//! monitoring over the binary TCP transport.
//!
//! Module layout:
//!
//! - [`cli`]: argument parsing and command definitions
//! - [`commands`]: one module per subcommand
//! - [`config`]: optional TOML configuration file and flag merging
//! - [`logging`]: tracing subscriber setup
//! - [`error`]: CLI error type and exit codes

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;

/// Crate version from Cargo.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Binary name.
pub const NAME: &str = "uascope";
