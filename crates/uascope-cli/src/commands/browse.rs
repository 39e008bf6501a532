// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The `browse` command: list the references of a node.

use crate::cli::{BrowseArgs, Cli};
use crate::commands::{connect, parse_node};
use crate::error::CliResult;

/// Browses forward hierarchical references from the starting node.
pub async fn execute(cli: &Cli, args: BrowseArgs) -> CliResult<()> {
    let node = parse_node(&args.node)?;

    let client = connect(cli).await?;
    let references = client.browse(&node).await?;

    println!("{} reference(s) from {node}", references.len());
    for reference in &references {
        println!(
            "  {:<14} {:<32} {}",
            format!("{:?}", reference.node_class),
            reference.browse_name.to_string(),
            reference.node_id
        );
    }

    client.disconnect().await?;
    Ok(())
}
