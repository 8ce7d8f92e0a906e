// crates/mailgate-config/src/lib.rs
// ============================================================================
// Module: Mailgate Configuration
// Description: Canonical configuration model for the Mailgate gateway.
// Purpose: Provide validated, defaulted TOML configuration for all crates.
// Dependencies: serde, toml, url, thiserror
// ============================================================================

//! ## Overview
//! This crate is the single source of truth for Mailgate configuration. The
//! model loads from TOML, fills defaults matching the reference deployment
//! (one-hour session idle window, five-minute sweep interval, 24-hour token
//! TTL), and validates every field before a server is constructed. Invalid
//! configuration is rejected up front, never discovered per-request.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default bind address for the HTTP endpoint.
pub const DEFAULT_BIND: &str = "127.0.0.1:8417";
/// Default maximum request body size in bytes (1 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
/// Default session idle threshold in seconds (one hour).
pub const DEFAULT_SESSION_IDLE_SECS: i64 = 60 * 60;
/// Default sweep interval in seconds (five minutes).
pub const DEFAULT_SWEEP_INTERVAL_SECS: i64 = 5 * 60;
/// Default bearer token time-to-live in seconds (24 hours).
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;
/// Maximum accepted configuration file size in bytes.
const MAX_CONFIG_BYTES: u64 = 256 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("config read failed: {path}: {error}")]
    Read {
        /// Path to the configuration file.
        path: String,
        /// Error details.
        error: String,
    },
    /// Configuration file exceeds the size limit.
    #[error("config file too large: {path}")]
    TooLarge {
        /// Path to the configuration file.
        path: String,
    },
    /// Configuration file is not valid TOML for this model.
    #[error("config parse failed: {0}")]
    Parse(String),
    /// A field failed validation.
    #[error("config invalid: {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },
}

// ============================================================================
// SECTION: Server Configuration
// ============================================================================

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address to bind.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum allowed request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Session lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Inactivity window after which a session is evicted, in seconds.
    #[serde(default = "default_session_idle_secs")]
    pub idle_threshold_secs: i64,
    /// Interval between sweeper passes, in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: i64,
    /// Bearer token time-to-live, in seconds.
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_threshold_secs: default_session_idle_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            token_ttl_secs: default_token_ttl_secs(),
        }
    }
}

/// OAuth client settings for the auth collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OauthConfig {
    /// OAuth client identifier.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Callback address the consent flow redirects to.
    pub callback_url: String,
}

/// Top-level Mailgate configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MailgateConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Session lifecycle settings.
    #[serde(default)]
    pub session: SessionConfig,
    /// OAuth client settings, when server-resident auth is enabled.
    #[serde(default)]
    pub oauth: Option<OauthConfig>,
}

impl MailgateConfig {
    /// Loads and validates configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, parsed, or
    /// validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let metadata = std::fs::metadata(path).map_err(|err| ConfigError::Read {
            path: path.display().to_string(),
            error: err.to_string(),
        })?;
        if metadata.len() > MAX_CONFIG_BYTES {
            return Err(ConfigError::TooLarge {
                path: path.display().to_string(),
            });
        }
        let raw = std::fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.display().to_string(),
            error: err.to_string(),
        })?;
        let config: Self =
            toml::from_str(&raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every field of the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "server.max_body_bytes",
                reason: "must be non-zero".to_string(),
            });
        }
        if self.session.idle_threshold_secs <= 0 {
            return Err(ConfigError::Invalid {
                field: "session.idle_threshold_secs",
                reason: "must be positive".to_string(),
            });
        }
        if self.session.sweep_interval_secs <= 0 {
            return Err(ConfigError::Invalid {
                field: "session.sweep_interval_secs",
                reason: "must be positive".to_string(),
            });
        }
        if self.session.sweep_interval_secs > self.session.idle_threshold_secs {
            return Err(ConfigError::Invalid {
                field: "session.sweep_interval_secs",
                reason: "must not exceed the idle threshold".to_string(),
            });
        }
        if self.session.token_ttl_secs <= 0 {
            return Err(ConfigError::Invalid {
                field: "session.token_ttl_secs",
                reason: "must be positive".to_string(),
            });
        }
        if let Some(oauth) = &self.oauth {
            if oauth.client_id.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "oauth.client_id",
                    reason: "must not be empty".to_string(),
                });
            }
            if oauth.client_secret.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "oauth.client_secret",
                    reason: "must not be empty".to_string(),
                });
            }
            let url = Url::parse(&oauth.callback_url).map_err(|err| ConfigError::Invalid {
                field: "oauth.callback_url",
                reason: err.to_string(),
            })?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(ConfigError::Invalid {
                    field: "oauth.callback_url",
                    reason: "scheme must be http or https".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Returns the parsed bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the address does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server.bind.parse().map_err(|_| ConfigError::Invalid {
            field: "server.bind",
            reason: format!("not a socket address: {}", self.server.bind),
        })
    }
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default bind address.
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

/// Default maximum body size.
const fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

/// Default session idle threshold.
const fn default_session_idle_secs() -> i64 {
    DEFAULT_SESSION_IDLE_SECS
}

/// Default sweep interval.
const fn default_sweep_interval_secs() -> i64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

/// Default token time-to-live.
const fn default_token_ttl_secs() -> i64 {
    DEFAULT_TOKEN_TTL_SECS
}
