// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI argument parsing and command definitions.
//!
//! Subcommands:
//!
//! - `endpoints`: list the endpoints a server advertises
//! - `read`: read node values once
//! - `poll`: read one node at a fixed interval
//! - `browse`: list the references of a node
//! - `monitor`: subscribe and stream data changes until Ctrl-C
//! - `version`: show version information

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// =============================================================================
// Main CLI Structure
// =============================================================================

/// uascope - OPC UA diagnostic client
///
/// Connects to an OPC UA server over the binary TCP transport (security
/// policy None) for endpoint discovery, reads, browsing and subscriptions.
#[derive(Parser, Debug)]
#[command(
    name = "uascope",
    version = crate::VERSION,
    about = "OPC UA diagnostic client",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Server endpoint URL (opc.tcp://host:port)
    #[arg(short, long, env = "UASCOPE_ENDPOINT", global = true)]
    pub endpoint: Option<String>,

    /// Configuration file path (TOML)
    #[arg(short, long, env = "UASCOPE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Per-request timeout in milliseconds
    #[arg(long, env = "UASCOPE_TIMEOUT", global = true)]
    pub timeout: Option<u64>,

    /// Username for session activation (anonymous if omitted)
    #[arg(short, long, env = "UASCOPE_USERNAME", global = true)]
    pub username: Option<String>,

    /// Password for session activation
    #[arg(short, long, env = "UASCOPE_PASSWORD", global = true)]
    pub password: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        short,
        long,
        default_value = "warn",
        env = "UASCOPE_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json, compact)
    #[arg(long, default_value = "text", env = "UASCOPE_LOG_FORMAT", global = true)]
    pub log_format: LogFormat,

    /// Enable quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands for the uascope CLI.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List the endpoints the server advertises
    ///
    /// Shows each endpoint's URL, security mode and policy, and the user
    /// token kinds it accepts.
    Endpoints,

    /// Read node values once
    ///
    /// Reads the Value attribute of each node and prints value, status
    /// and source timestamp.
    Read(ReadArgs),

    /// Read one node at a fixed interval
    ///
    /// Prints one line per tick; read failures are reported and polling
    /// continues. Stops after --count reads or on Ctrl-C.
    Poll(PollArgs),

    /// List the references of a node
    ///
    /// Follows hierarchical references forward from the starting node
    /// (the Objects folder by default).
    Browse(BrowseArgs),

    /// Subscribe and stream data changes until Ctrl-C
    ///
    /// Creates a subscription with one monitored item per node and prints
    /// each data change as it arrives.
    Monitor(MonitorArgs),

    /// Show detailed version information
    Version,
}

// =============================================================================
// Command Arguments
// =============================================================================

/// Arguments for the `read` command.
#[derive(Args, Debug, Clone)]
pub struct ReadArgs {
    /// Node ids to read, e.g. "ns=2;s=Process.Temperature"
    #[arg(required = true)]
    pub nodes: Vec<String>,
}

/// Arguments for the `poll` command.
#[derive(Args, Debug, Clone)]
pub struct PollArgs {
    /// Node id to poll
    pub node: String,

    /// Interval between reads in milliseconds
    #[arg(short, long, default_value = "1000")]
    pub interval: u64,

    /// Number of reads (0 = until Ctrl-C)
    #[arg(short = 'n', long, default_value = "0")]
    pub count: u64,
}

/// Arguments for the `browse` command.
#[derive(Args, Debug, Clone)]
pub struct BrowseArgs {
    /// Starting node id (default: Objects folder)
    #[arg(default_value = "i=85")]
    pub node: String,
}

/// Arguments for the `monitor` command.
#[derive(Args, Debug, Clone)]
pub struct MonitorArgs {
    /// Node ids to monitor
    #[arg(required = true)]
    pub nodes: Vec<String>,

    /// Requested publishing interval in milliseconds
    #[arg(long, default_value = "500")]
    pub publishing_interval: u64,

    /// Sampling interval in milliseconds (server default if omitted)
    #[arg(long)]
    pub sampling_interval: Option<u64>,

    /// Queue depth per monitored item
    #[arg(long, default_value = "1")]
    pub queue_size: u32,
}

// =============================================================================
// Enums
// =============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for structured logging
    Json,
    /// Compact format for minimal output
    Compact,
}

// =============================================================================
// Helper Methods
// =============================================================================

impl Cli {
    /// Parse CLI arguments from the command line.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Check if verbose logging is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose && !self.quiet
    }

    /// Get the effective log level based on flags.
    pub fn effective_log_level(&self) -> &str {
        if self.quiet {
            "error"
        } else if self.verbose {
            "debug"
        } else {
            &self.log_level
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_command() {
        let cli = Cli::parse_from(["uascope", "-e", "opc.tcp://plc:4840", "endpoints"]);
        assert_eq!(cli.endpoint.as_deref(), Some("opc.tcp://plc:4840"));
        assert!(matches!(cli.command, Commands::Endpoints));
    }

    #[test]
    fn test_read_command() {
        let cli = Cli::parse_from(["uascope", "read", "i=2258", "ns=2;s=Pump.Speed"]);
        if let Commands::Read(args) = cli.command {
            assert_eq!(args.nodes, vec!["i=2258", "ns=2;s=Pump.Speed"]);
        } else {
            panic!("Expected Read command");
        }
    }

    #[test]
    fn test_read_requires_nodes() {
        assert!(Cli::try_parse_from(["uascope", "read"]).is_err());
    }

    #[test]
    fn test_poll_defaults() {
        let cli = Cli::parse_from(["uascope", "poll", "i=2258"]);
        if let Commands::Poll(args) = cli.command {
            assert_eq!(args.node, "i=2258");
            assert_eq!(args.interval, 1000);
            assert_eq!(args.count, 0);
        } else {
            panic!("Expected Poll command");
        }
    }

    #[test]
    fn test_poll_count() {
        let cli = Cli::parse_from(["uascope", "poll", "i=2258", "-i", "250", "-n", "5"]);
        if let Commands::Poll(args) = cli.command {
            assert_eq!(args.interval, 250);
            assert_eq!(args.count, 5);
        } else {
            panic!("Expected Poll command");
        }
    }

    #[test]
    fn test_browse_default_node() {
        let cli = Cli::parse_from(["uascope", "browse"]);
        if let Commands::Browse(args) = cli.command {
            assert_eq!(args.node, "i=85");
        } else {
            panic!("Expected Browse command");
        }
    }

    #[test]
    fn test_monitor_command() {
        let cli = Cli::parse_from([
            "uascope",
            "monitor",
            "ns=2;s=Process.Temperature",
            "--publishing-interval",
            "200",
        ]);
        if let Commands::Monitor(args) = cli.command {
            assert_eq!(args.nodes.len(), 1);
            assert_eq!(args.publishing_interval, 200);
            assert_eq!(args.sampling_interval, None);
        } else {
            panic!("Expected Monitor command");
        }
    }

    #[test]
    fn test_quiet_mode() {
        let cli = Cli::parse_from(["uascope", "-q", "version"]);
        assert!(cli.quiet);
        assert_eq!(cli.effective_log_level(), "error");
    }

    #[test]
    fn test_verbose_mode() {
        let cli = Cli::parse_from(["uascope", "-v", "version"]);
        assert!(cli.verbose);
        assert!(cli.is_verbose());
        assert_eq!(cli.effective_log_level(), "debug");
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["uascope", "read", "i=2258", "-e", "opc.tcp://plc:4840"]);
        assert_eq!(cli.endpoint.as_deref(), Some("opc.tcp://plc:4840"));
    }
}
