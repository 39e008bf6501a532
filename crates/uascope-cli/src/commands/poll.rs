// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The `poll` command: read one node at a fixed interval.

use std::time::Duration;

use crate::cli::{Cli, PollArgs};
use crate::commands::{connect, format_value, parse_node};
use crate::error::{CliError, CliResult};

/// Polls the node until the count is reached or Ctrl-C. Per-tick read
/// failures are reported on stderr and polling continues.
pub async fn execute(cli: &Cli, args: PollArgs) -> CliResult<()> {
    let node = parse_node(&args.node)?;
    if args.interval == 0 {
        return Err(CliError::config("--interval must be non-zero"));
    }

    let client = connect(cli).await?;
    let mut ticks = client.poll(node.clone(), Duration::from_millis(args.interval));

    let mut done = 0u64;
    loop {
        tokio::select! {
            result = ticks.recv() => {
                let Some(result) = result else { break };
                match result {
                    Ok(value) => println!("{node} = {}", format_value(&value)),
                    Err(err) => eprintln!("{node}: read failed: {err}"),
                }
                done += 1;
                if args.count != 0 && done >= args.count {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    drop(ticks);
    client.disconnect().await?;
    Ok(())
}
