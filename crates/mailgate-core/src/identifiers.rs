// crates/mailgate-core/src/identifiers.rs
// ============================================================================
// Module: Mailgate Identifiers
// Description: Canonical opaque identifiers for sessions, tenants, and requests.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde, rand, sha2
// ============================================================================

//! ## Overview
//! This module defines the canonical identifiers used throughout Mailgate.
//! Session identifiers are minted from OS randomness and are unguessable;
//! auth identities are derived deterministically from the session identifier
//! so credential state can be keyed without exposing the session id itself.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use rand::RngCore;
use rand::rngs::OsRng;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Number of random bytes backing a minted session identifier.
const SESSION_ID_BYTES: usize = 16;
/// Maximum accepted length for a client-presented session identifier.
pub const MAX_SESSION_ID_LENGTH: usize = 128;
/// Maximum accepted length for an operation name.
pub const MAX_OPERATION_NAME_LENGTH: usize = 64;

// ============================================================================
// SECTION: Session Identifier
// ============================================================================

/// Opaque, unguessable session identifier.
///
/// # Invariants
/// - Minted values are lowercase hex from OS randomness.
/// - Client-presented values are validated before lookup, never trusted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Mints a fresh unguessable session identifier.
    #[must_use]
    pub fn mint() -> Self {
        let mut bytes = [0u8; SESSION_ID_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let mut out = String::with_capacity(SESSION_ID_BYTES * 2);
        for byte in bytes {
            out.push_str(&format!("{byte:02x}"));
        }
        Self(out)
    }

    /// Parses a client-presented session identifier.
    ///
    /// Returns `None` when the value is empty, too long, or contains
    /// characters outside the minted alphabet plus `-` and `_`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.len() > MAX_SESSION_ID_LENGTH {
            return None;
        }
        let valid = trimmed
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
        if !valid {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// SECTION: Auth Identity
// ============================================================================

/// Secondary identifier keying credential and token state for one tenant.
///
/// # Invariants
/// - Derived deterministically from a session identifier; the derivation is
///   one-way so the identity never reveals the session id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthIdentity(String);

impl AuthIdentity {
    /// Derives the auth identity for a session identifier.
    #[must_use]
    pub fn derive(session_id: &SessionId) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"mailgate-auth-identity:");
        hasher.update(session_id.as_str().as_bytes());
        let digest = hasher.finalize();
        let mut out = String::with_capacity(32);
        // First 16 bytes of the digest are sufficient to key tenant state.
        for byte in digest.iter().take(16) {
            out.push_str(&format!("{byte:02x}"));
        }
        Self(out)
    }

    /// Builds an auth identity from an already-derived wire value.
    #[must_use]
    pub fn from_wire(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AuthIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// SECTION: Request Identifier
// ============================================================================

/// Opaque per-request identifier taken from the JSON-RPC envelope.
///
/// # Invariants
/// - Uniqueness is scoped to one session's in-flight window; the transport
///   rejects a duplicate id while the original request is still pending.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Creates a request identifier from its wire form.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// SECTION: Operation Name
// ============================================================================

/// Validated name of a domain operation exposed as an MCP tool.
///
/// # Invariants
/// - Lowercase ASCII alphanumerics and underscores only; bounded length.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationName(String);

impl OperationName {
    /// Parses an operation name, rejecting invalid values.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        if value.is_empty() || value.len() > MAX_OPERATION_NAME_LENGTH {
            return None;
        }
        let valid = value
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_');
        if !valid {
            return None;
        }
        Some(Self(value.to_string()))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
