// crates/mailgate-cli/src/serve_policy.rs
// ============================================================================
// Module: Serve Policy
// Description: Network exposure policy checks for the CLI server launcher.
// Purpose: Enforce safe-by-default bind behavior with explicit opt-in.
// Dependencies: std
// ============================================================================

//! ## Overview
//! The gateway binds loopback-only by default. Exposing it on a network
//! address requires explicit opt-in through the `--allow-non-loopback` flag
//! or the `MAILGATE_ALLOW_NON_LOOPBACK` environment variable; anything else
//! fails closed before a listener is opened.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::net::SocketAddr;

use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment variable enabling non-loopback server binds.
pub const ALLOW_NON_LOOPBACK_ENV: &str = "MAILGATE_ALLOW_NON_LOOPBACK";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Serve policy failures for bind safety.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServePolicyError {
    /// Environment variable was set to an invalid value.
    #[error("{ALLOW_NON_LOOPBACK_ENV} must be 0/1/true/false, got: {value}")]
    InvalidEnv {
        /// Raw environment value.
        value: String,
    },
    /// Bind string failed to parse.
    #[error("bind address does not parse: {bind}")]
    InvalidBind {
        /// Raw bind value.
        bind: String,
    },
    /// Non-loopback binding requires explicit opt-in.
    #[error(
        "refusing to bind non-loopback address {bind}; pass --allow-non-loopback or set \
         {ALLOW_NON_LOOPBACK_ENV}=1"
    )]
    NonLoopbackOptInRequired {
        /// Bind address.
        bind: String,
    },
}

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Resolves the non-loopback opt-in from the CLI flag and environment.
///
/// The flag wins; otherwise the environment variable is consulted.
///
/// # Errors
///
/// Returns [`ServePolicyError::InvalidEnv`] when the environment value is
/// not a recognized boolean.
pub fn resolve_allow_non_loopback(flag: bool) -> Result<bool, ServePolicyError> {
    if flag {
        return Ok(true);
    }
    let Some(value) = env::var_os(ALLOW_NON_LOOPBACK_ENV) else {
        return Ok(false);
    };
    let value = value.to_string_lossy().to_string();
    parse_allow_value(&value)
}

/// Parses an opt-in environment value.
fn parse_allow_value(value: &str) -> Result<bool, ServePolicyError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" | "" => Ok(false),
        _ => Err(ServePolicyError::InvalidEnv {
            value: value.to_string(),
        }),
    }
}

/// Validates the bind address against the loopback-only policy.
///
/// # Errors
///
/// Returns [`ServePolicyError::InvalidBind`] when the address does not
/// parse and [`ServePolicyError::NonLoopbackOptInRequired`] when a
/// non-loopback bind was requested without opt-in.
pub fn enforce_local_only(
    bind: &str,
    allow_non_loopback: bool,
) -> Result<SocketAddr, ServePolicyError> {
    let addr: SocketAddr = bind.parse().map_err(|_| ServePolicyError::InvalidBind {
        bind: bind.to_string(),
    })?;
    if !addr.ip().is_loopback() && !allow_non_loopback {
        return Err(ServePolicyError::NonLoopbackOptInRequired {
            bind: bind.to_string(),
        });
    }
    Ok(addr)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
