// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! uascope binary entry point.

use uascope_cli::cli::Cli;
use uascope_cli::{commands, error, logging};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();
    logging::init_logging(cli.effective_log_level(), cli.log_format);

    if let Err(err) = commands::execute(cli).await {
        error::report_error_and_exit(err);
    }
}
