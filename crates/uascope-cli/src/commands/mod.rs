// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Command implementations.
//!
//! One module per subcommand; [`execute`] dispatches. Command output is
//! printed to stdout, logs go to stderr.

use uascope_client::Client;
use uascope_codec::{DataValue, NodeId};

use crate::cli::{Cli, Commands};
use crate::config;
use crate::error::{CliError, CliResult};

pub mod browse;
pub mod endpoints;
pub mod monitor;
pub mod poll;
pub mod read;

// =============================================================================
// Command Dispatcher
// =============================================================================

/// Executes the parsed CLI command.
pub async fn execute(cli: Cli) -> CliResult<()> {
    match cli.command.clone() {
        Commands::Endpoints => endpoints::execute(&cli).await,
        Commands::Read(args) => read::execute(&cli, args).await,
        Commands::Poll(args) => poll::execute(&cli, args).await,
        Commands::Browse(args) => browse::execute(&cli, args).await,
        Commands::Monitor(args) => monitor::execute(&cli, args).await,
        Commands::Version => {
            println!("{} {}", crate::NAME, crate::VERSION);
            Ok(())
        }
    }
}

// =============================================================================
// Shared Helpers
// =============================================================================

/// Resolves the configuration and connects.
pub(crate) async fn connect(cli: &Cli) -> CliResult<Client> {
    let config = config::resolve(cli)?;
    Ok(Client::connect(config).await?)
}

/// Parses a node id argument.
pub(crate) fn parse_node(text: &str) -> CliResult<NodeId> {
    text.parse().map_err(|source| CliError::InvalidNodeId {
        text: text.to_string(),
        source,
    })
}

/// Renders a data value as `value [status] @ timestamp`; status and
/// timestamp appear only when the status is bad or a source timestamp
/// was returned.
pub(crate) fn format_value(value: &DataValue) -> String {
    let mut out = match &value.value {
        Some(variant) => variant.to_string(),
        None => "null".to_string(),
    };
    let status = value.status();
    if !status.is_good() {
        out.push_str(&format!(" [{status}]"));
    }
    if let Some(timestamp) = &value.source_timestamp {
        out.push_str(&format!(" @ {timestamp}"));
    }
    out
}
