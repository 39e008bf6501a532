// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Client configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uascope_transport::{EndpointTarget, TransportLimits};

use crate::error::{ClientError, ClientResult};
use crate::retry::RetryConfig;

/// Message security mode. Only [`SecurityMode::None`] has a wire
/// implementation; the other modes are accepted by the parser so
/// configuration files can name them, and rejected at connect time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecurityMode {
    /// No signing or encryption.
    #[default]
    None,
    /// Signed messages.
    Sign,
    /// Signed and encrypted messages.
    SignAndEncrypt,
}

/// User identity presented at session activation.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum IdentityToken {
    /// Anonymous access.
    #[default]
    Anonymous,
    /// Username and password.
    UserName {
        /// The user name.
        user: String,
        /// The password.
        password: String,
    },
}

// Keep credentials out of Debug output and logs.
impl fmt::Debug for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => write!(f, "Anonymous"),
            Self::UserName { user, .. } => f
                .debug_struct("UserName")
                .field("user", user)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// Everything the client needs to connect and stay connected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// The `opc.tcp://` endpoint URL.
    pub endpoint_url: String,
    /// Application URI sent in the client description.
    pub application_uri: String,
    /// Application name sent in the client description.
    pub application_name: String,
    /// Session name shown in server diagnostics.
    pub session_name: String,
    /// Security mode (only None connects).
    pub security_mode: SecurityMode,
    /// User identity for session activation.
    pub identity: IdentityToken,
    /// Requested session timeout.
    pub session_timeout: Duration,
    /// Requested secure channel token lifetime.
    pub channel_lifetime: Duration,
    /// Per-call timeout for service requests.
    pub request_timeout: Duration,
    /// Interval between keep-alive reads.
    pub keep_alive_interval: Duration,
    /// Keep-alive failures tolerated before the connection counts as lost.
    pub keep_alive_failures: u32,
    /// Transport buffer limits offered in the hello.
    pub transport: TransportLimitsConfig,
    /// Reconnect backoff policy.
    pub retry: RetryConfig,
}

/// Serializable mirror of [`TransportLimits`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportLimitsConfig {
    /// Largest frame accepted.
    pub receive_buffer_size: u32,
    /// Largest frame sent.
    pub send_buffer_size: u32,
    /// Largest reassembled message accepted (0 = no limit).
    pub max_message_size: u32,
    /// Most chunks per message (0 = no limit).
    pub max_chunk_count: u32,
}

impl Default for TransportLimitsConfig {
    fn default() -> Self {
        let limits = TransportLimits::default();
        Self {
            receive_buffer_size: limits.receive_buffer_size,
            send_buffer_size: limits.send_buffer_size,
            max_message_size: limits.max_message_size,
            max_chunk_count: limits.max_chunk_count,
        }
    }
}

impl From<&TransportLimitsConfig> for TransportLimits {
    fn from(config: &TransportLimitsConfig) -> Self {
        Self {
            receive_buffer_size: config.receive_buffer_size,
            send_buffer_size: config.send_buffer_size,
            max_message_size: config.max_message_size,
            max_chunk_count: config.max_chunk_count,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "opc.tcp://localhost:4840".to_string(),
            application_uri: "urn:uascope:client".to_string(),
            application_name: "uascope".to_string(),
            session_name: "uascope session".to_string(),
            security_mode: SecurityMode::None,
            identity: IdentityToken::Anonymous,
            session_timeout: Duration::from_secs(60),
            channel_lifetime: Duration::from_secs(3600),
            request_timeout: Duration::from_secs(5),
            keep_alive_interval: Duration::from_secs(10),
            keep_alive_failures: 3,
            transport: TransportLimitsConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Starts a builder for the given endpoint.
    pub fn builder(endpoint_url: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self {
                endpoint_url: endpoint_url.into(),
                ..Default::default()
            },
        }
    }

    /// Validates the configuration before any connection attempt.
    pub fn validate(&self) -> ClientResult<()> {
        EndpointTarget::parse(&self.endpoint_url)?;
        if self.security_mode != SecurityMode::None {
            return Err(ClientError::SecurityModeUnsupported {
                mode: self.security_mode,
            });
        }
        if self.request_timeout.is_zero() {
            return Err(ClientError::config("request_timeout must be non-zero"));
        }
        if self.session_timeout.is_zero() {
            return Err(ClientError::config("session_timeout must be non-zero"));
        }
        if self.keep_alive_failures == 0 {
            return Err(ClientError::config(
                "keep_alive_failures must be at least 1",
            ));
        }
        Ok(())
    }

    /// The transport limits to offer in the hello.
    pub fn transport_limits(&self) -> TransportLimits {
        (&self.transport).into()
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Sets the application URI and name.
    pub fn application(mut self, uri: impl Into<String>, name: impl Into<String>) -> Self {
        self.config.application_uri = uri.into();
        self.config.application_name = name.into();
        self
    }

    /// Sets the session name.
    pub fn session_name(mut self, name: impl Into<String>) -> Self {
        self.config.session_name = name.into();
        self
    }

    /// Sets the user identity.
    pub fn identity(mut self, identity: IdentityToken) -> Self {
        self.config.identity = identity;
        self
    }

    /// Sets the security mode.
    pub fn security_mode(mut self, mode: SecurityMode) -> Self {
        self.config.security_mode = mode;
        self
    }

    /// Sets the per-call request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Sets the requested session timeout.
    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.config.session_timeout = timeout;
        self
    }

    /// Sets the keep-alive cadence and failure tolerance.
    pub fn keep_alive(mut self, interval: Duration, failures: u32) -> Self {
        self.config.keep_alive_interval = interval;
        self.config.keep_alive_failures = failures;
        self
    }

    /// Sets the reconnect policy.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> ClientResult<ClientConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_accepts_valid_config() {
        let config = ClientConfig::builder("opc.tcp://plc:4840")
            .application("urn:test", "test")
            .identity(IdentityToken::UserName {
                user: "op".to_string(),
                password: "secret".to_string(),
            })
            .build()
            .unwrap();
        assert_eq!(config.endpoint_url, "opc.tcp://plc:4840");
    }

    #[test]
    fn test_bad_scheme_is_rejected() {
        let err = ClientConfig::builder("http://plc:4840").build().unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_sign_mode_is_rejected() {
        let err = ClientConfig::builder("opc.tcp://plc:4840")
            .security_mode(SecurityMode::Sign)
            .build()
            .unwrap_err();
        assert!(matches!(err, ClientError::SecurityModeUnsupported { .. }));
    }

    #[test]
    fn test_debug_redacts_password() {
        let identity = IdentityToken::UserName {
            user: "op".to_string(),
            password: "secret".to_string(),
        };
        let text = format!("{identity:?}");
        assert!(!text.contains("secret"));
        assert!(text.contains("redacted"));
    }
}
