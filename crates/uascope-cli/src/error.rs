// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the uascope binary.

use std::path::PathBuf;

use thiserror::Error;
use uascope_client::ClientError;
use uascope_codec::CodecError;

/// Result type alias for uascope CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the uascope binary.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Configuration file could not be read or parsed.
    #[error("Configuration file {path}: {reason}")]
    ConfigFile {
        /// The file that failed.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// A node id argument did not parse.
    #[error("Invalid node id '{text}'")]
    InvalidNodeId {
        /// The offending argument.
        text: String,
        /// The parse failure.
        #[source]
        source: CodecError,
    },

    /// Client error.
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Returns the exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) | Self::ConfigFile { .. } => 1,
            Self::InvalidNodeId { .. } => 2,
            Self::Client(_) => 3,
            Self::Io(_) => 4,
        }
    }
}

// =============================================================================
// Error Reporting
// =============================================================================

/// Reports an error with its cause chain.
pub fn report_error(error: &CliError) {
    eprintln!("Error: {}", error);

    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        eprintln!("  Caused by: {}", cause);
        source = cause.source();
    }
}

/// Reports an error and exits with the appropriate code.
pub fn report_error_and_exit(error: CliError) -> ! {
    report_error(&error);
    std::process::exit(error.exit_code())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CliError::config("no endpoint");
        assert_eq!(err.to_string(), "Configuration error: no endpoint");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::config("test").exit_code(), 1);
        let bad_node = "not-a-node".parse::<uascope_codec::NodeId>().unwrap_err();
        let err = CliError::InvalidNodeId {
            text: "not-a-node".to_string(),
            source: bad_node,
        };
        assert_eq!(err.exit_code(), 2);
        assert_eq!(CliError::from(ClientError::Disconnected).exit_code(), 3);
    }
}
