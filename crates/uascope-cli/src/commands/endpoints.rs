// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The `endpoints` command: list the endpoints a server advertises.

use tracing::debug;

use crate::cli::Cli;
use crate::commands::connect;
use crate::error::CliResult;

/// Connects, fetches the endpoint list and prints one block per endpoint.
pub async fn execute(cli: &Cli) -> CliResult<()> {
    let client = connect(cli).await?;
    let endpoints = client.get_endpoints().await?;
    debug!(count = endpoints.len(), "endpoints fetched");

    println!("{} endpoint(s)", endpoints.len());
    for endpoint in &endpoints {
        println!();
        println!(
            "  url:       {}",
            endpoint.endpoint_url.as_deref().unwrap_or("<none>")
        );
        println!("  server:    {}", endpoint.server.application_name);
        println!(
            "  security:  {:?} / {}",
            endpoint.security_mode,
            endpoint.security_policy_uri.as_deref().unwrap_or("<none>")
        );
        println!("  level:     {}", endpoint.security_level);
        let tokens: Vec<String> = endpoint
            .user_identity_tokens
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .map(|policy| format!("{:?}", policy.token_type))
            .collect();
        println!(
            "  tokens:    {}",
            if tokens.is_empty() {
                "<none>".to_string()
            } else {
                tokens.join(", ")
            }
        );
    }

    client.disconnect().await?;
    Ok(())
}
