// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The `read` command: read node values once.

use uascope_codec::services::attribute::ReadValueId;

use crate::cli::{Cli, ReadArgs};
use crate::commands::{connect, format_value, parse_node};
use crate::error::CliResult;

/// Reads the Value attribute of each node and prints one line per node.
pub async fn execute(cli: &Cli, args: ReadArgs) -> CliResult<()> {
    let nodes = args
        .nodes
        .iter()
        .map(|text| parse_node(text))
        .collect::<CliResult<Vec<_>>>()?;

    let client = connect(cli).await?;
    let reads = nodes.iter().cloned().map(ReadValueId::value_of).collect();
    let values = client.read_many(reads).await?;

    for (node, value) in nodes.iter().zip(&values) {
        println!("{node} = {}", format_value(value));
    }

    client.disconnect().await?;
    Ok(())
}
