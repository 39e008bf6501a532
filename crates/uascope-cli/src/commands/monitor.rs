// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The `monitor` command: subscribe and stream data changes.

use std::time::Duration;

use tracing::{info, warn};

use uascope_client::SubscriptionOptions;

use crate::cli::{Cli, MonitorArgs};
use crate::commands::{connect, format_value, parse_node};
use crate::error::CliResult;

/// Creates a subscription over the given nodes and prints each data
/// change until Ctrl-C or the stream closes.
pub async fn execute(cli: &Cli, args: MonitorArgs) -> CliResult<()> {
    let nodes = args
        .nodes
        .iter()
        .map(|text| parse_node(text))
        .collect::<CliResult<Vec<_>>>()?;

    let client = connect(cli).await?;
    let options = SubscriptionOptions {
        publishing_interval: Duration::from_millis(args.publishing_interval),
        sampling_interval: args.sampling_interval.map(Duration::from_millis),
        queue_size: args.queue_size,
        ..SubscriptionOptions::default()
    };
    let (handle, mut changes) = client.subscribe(nodes, options).await?;
    info!(subscription_id = handle.id, "monitoring, press Ctrl-C to stop");

    loop {
        tokio::select! {
            change = changes.recv() => {
                let Some(change) = change else {
                    warn!("data change stream closed");
                    break;
                };
                println!("{} = {}", change.node_id, format_value(&change.value));
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    if let Err(err) = client.unsubscribe(handle).await {
        warn!(error = %err, "unsubscribe failed");
    }
    client.disconnect().await?;
    Ok(())
}
