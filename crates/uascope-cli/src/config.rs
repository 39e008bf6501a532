// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration file loading and flag merging.
//!
//! The CLI works without a configuration file; everything can come from
//! flags and environment variables. A TOML file (`--config`) supplies the
//! same settings plus the tuning knobs that have no flag. Precedence is
//! flags over file over defaults.
//!
//! ```toml
//! endpoint_url = "opc.tcp://plc:4840"
//! session_name = "line 3 diagnostics"
//! request_timeout_ms = 5000
//!
//! [identity]
//! kind = "user-name"
//! user = "operator"
//! password = "secret"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use uascope_client::{ClientConfig, IdentityToken, RetryConfig};

use crate::cli::Cli;
use crate::error::{CliError, CliResult};

// =============================================================================
// File Schema
// =============================================================================

/// TOML configuration file schema. Durations are plain milliseconds.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// The `opc.tcp://` endpoint URL.
    pub endpoint_url: Option<String>,
    /// Application URI sent in the client description.
    pub application_uri: Option<String>,
    /// Application name sent in the client description.
    pub application_name: Option<String>,
    /// Session name shown in server diagnostics.
    pub session_name: Option<String>,
    /// User identity for session activation.
    pub identity: Option<IdentityToken>,
    /// Requested session timeout.
    pub session_timeout_ms: Option<u64>,
    /// Per-call timeout for service requests.
    pub request_timeout_ms: Option<u64>,
    /// Interval between keep-alive reads.
    pub keep_alive_interval_ms: Option<u64>,
    /// Keep-alive failures tolerated before reconnecting.
    pub keep_alive_failures: Option<u32>,
    /// Reconnect backoff policy.
    pub retry: Option<RetryConfig>,
}

impl FileConfig {
    fn apply(self, config: &mut ClientConfig) {
        if let Some(endpoint_url) = self.endpoint_url {
            config.endpoint_url = endpoint_url;
        }
        if let Some(application_uri) = self.application_uri {
            config.application_uri = application_uri;
        }
        if let Some(application_name) = self.application_name {
            config.application_name = application_name;
        }
        if let Some(session_name) = self.session_name {
            config.session_name = session_name;
        }
        if let Some(identity) = self.identity {
            config.identity = identity;
        }
        if let Some(ms) = self.session_timeout_ms {
            config.session_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.request_timeout_ms {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.keep_alive_interval_ms {
            config.keep_alive_interval = Duration::from_millis(ms);
        }
        if let Some(failures) = self.keep_alive_failures {
            config.keep_alive_failures = failures;
        }
        if let Some(retry) = self.retry {
            config.retry = retry;
        }
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// Builds the client configuration from defaults, the optional file and
/// the command-line flags, in that order.
pub fn resolve(cli: &Cli) -> CliResult<ClientConfig> {
    let file = match &cli.config {
        Some(path) => load(path)?,
        None => FileConfig::default(),
    };
    let file_has_endpoint = file.endpoint_url.is_some();

    let mut config = ClientConfig::default();
    file.apply(&mut config);

    match &cli.endpoint {
        Some(endpoint) => config.endpoint_url = endpoint.clone(),
        None if !file_has_endpoint => {
            return Err(CliError::config(
                "no endpoint: pass --endpoint or set endpoint_url in the config file",
            ));
        }
        None => {}
    }
    if let Some(user) = &cli.username {
        config.identity = IdentityToken::UserName {
            user: user.clone(),
            password: cli.password.clone().unwrap_or_default(),
        };
    }
    if let Some(ms) = cli.timeout {
        config.request_timeout = Duration::from_millis(ms);
    }

    config.validate()?;
    Ok(config)
}

fn load(path: &Path) -> CliResult<FileConfig> {
    let text = std::fs::read_to_string(path).map_err(|err| CliError::ConfigFile {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    toml::from_str(&text).map_err(|err| CliError::ConfigFile {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(args)
    }

    #[test]
    fn test_endpoint_flag_is_enough() {
        let config = resolve(&cli(&["uascope", "-e", "opc.tcp://plc:4840", "endpoints"])).unwrap();
        assert_eq!(config.endpoint_url, "opc.tcp://plc:4840");
        assert!(matches!(config.identity, IdentityToken::Anonymous));
    }

    #[test]
    fn test_missing_endpoint_is_rejected() {
        let err = resolve(&cli(&["uascope", "endpoints"])).unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_username_flag_sets_identity() {
        let config = resolve(&cli(&[
            "uascope",
            "-e",
            "opc.tcp://plc:4840",
            "-u",
            "operator",
            "-p",
            "secret",
            "endpoints",
        ]))
        .unwrap();
        assert!(matches!(
            config.identity,
            IdentityToken::UserName { ref user, ref password }
                if user == "operator" && password == "secret"
        ));
    }

    #[test]
    fn test_file_parses_and_flags_win() {
        let text = r#"
            endpoint_url = "opc.tcp://from-file:4840"
            session_name = "bench"
            request_timeout_ms = 1500

            [identity]
            kind = "user-name"
            user = "operator"
            password = "secret"
        "#;
        let file: FileConfig = toml::from_str(text).unwrap();
        assert_eq!(file.request_timeout_ms, Some(1500));

        let mut config = ClientConfig::default();
        file.apply(&mut config);
        assert_eq!(config.endpoint_url, "opc.tcp://from-file:4840");
        assert_eq!(config.session_name, "bench");
        assert_eq!(config.request_timeout, Duration::from_millis(1500));
        assert!(matches!(config.identity, IdentityToken::UserName { .. }));
    }

    #[test]
    fn test_unknown_file_key_is_rejected() {
        let err = toml::from_str::<FileConfig>("endpint_url = \"x\"").unwrap_err();
        assert!(err.to_string().contains("endpint_url"));
    }

    #[test]
    fn test_timeout_flag_overrides_file_default() {
        let config = resolve(&cli(&[
            "uascope",
            "-e",
            "opc.tcp://plc:4840",
            "--timeout",
            "250",
            "endpoints",
        ]))
        .unwrap();
        assert_eq!(config.request_timeout, Duration::from_millis(250));
    }
}
