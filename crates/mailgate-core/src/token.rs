// crates/mailgate-core/src/token.rs
// ============================================================================
// Module: Token Registry
// Description: Issuance and validation of session re-entry bearer tokens.
// Purpose: Provide fail-closed, self-cleaning secondary authentication.
// Dependencies: rand, sha2, serde
// ============================================================================

//! ## Overview
//! Bearer tokens let a caller re-enter an authenticated mailbox identity
//! without repeating the full auth handshake. A token is valid only while
//! all three checks hold: the mapping exists, the credential record's stored
//! token still equals the presented one, and the token is younger than its
//! TTL. Any failed check deletes the mapping before returning not-ok, so a
//! retry with the same token fails identically. Tokens may attach a request
//! to a different session than the one that issued them; that decoupling is
//! deliberate and enables multi-client access to one mailbox identity.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;

use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Digest;
use sha2::Sha256;

use crate::credentials::CredentialStore;
use crate::error::GatewayError;
use crate::identifiers::AuthIdentity;
use crate::time::Duration;
use crate::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Number of random bytes backing an issued bearer token.
const TOKEN_BYTES: usize = 32;
/// Default token time-to-live: 24 hours.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

// ============================================================================
// SECTION: Records
// ============================================================================

/// Internal token record held by the registry.
#[derive(Debug, Clone)]
struct TokenRecord {
    /// Identity the token proves.
    auth_identity: AuthIdentity,
    /// Host-supplied issuance time.
    issued_at: Timestamp,
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Registry of opaque bearer tokens keyed by their raw value.
///
/// # Invariants
/// - Every mutation is a single atomic map operation; no read-modify-write
///   spans a suspension point.
/// - Raw token values never appear in logs; audit sinks get fingerprints.
#[derive(Debug)]
pub struct TokenRegistry {
    /// Token records keyed by the raw token string.
    tokens: Mutex<BTreeMap<String, TokenRecord>>,
    /// Maximum token age before validation fails.
    ttl: Duration,
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_TTL)
    }
}

impl TokenRegistry {
    /// Creates a registry with the given token time-to-live.
    #[must_use]
    pub const fn new(ttl: Duration) -> Self {
        Self {
            tokens: Mutex::new(BTreeMap::new()),
            ttl,
        }
    }

    /// Returns the configured token time-to-live.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issues a fresh token for `identity`.
    ///
    /// The raw token is returned exactly once and is not retrievable again;
    /// a lost token requires a reissue. Issuance records the token on the
    /// identity's credential record, which invalidates any previously issued
    /// token for the same identity via the validation cross-check.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::AuthenticationRequired`] when the identity
    /// has no completed credential record, and [`GatewayError::Internal`]
    /// when a table lock is poisoned.
    pub fn issue(
        &self,
        identity: &AuthIdentity,
        now: Timestamp,
        credentials: &CredentialStore,
    ) -> Result<String, GatewayError> {
        let token = mint_token();
        if !credentials.set_bearer_token(identity, &token)? {
            return Err(GatewayError::AuthenticationRequired);
        }
        let mut tokens = self
            .tokens
            .lock()
            .map_err(|_| GatewayError::Internal("token registry lock poisoned".to_string()))?;
        tokens.insert(
            token.clone(),
            TokenRecord {
                auth_identity: identity.clone(),
                issued_at: now,
            },
        );
        Ok(token)
    }

    /// Validates a presented token and returns the identity it proves.
    ///
    /// All three checks are mandatory: mapping presence, credential-record
    /// stored-token equality, and age below the TTL. On any failure the
    /// mapping is deleted before the error is returned (fail-closed,
    /// self-cleaning), so the same token fails identically on retry.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::TokenExpiredOrInvalid`] on any failed check
    /// and [`GatewayError::Internal`] when a table lock is poisoned.
    pub fn validate(
        &self,
        token: &str,
        now: Timestamp,
        credentials: &CredentialStore,
    ) -> Result<AuthIdentity, GatewayError> {
        let record = {
            let tokens = self
                .tokens
                .lock()
                .map_err(|_| GatewayError::Internal("token registry lock poisoned".to_string()))?;
            tokens.get(token).cloned()
        };
        let Some(record) = record else {
            return Err(GatewayError::TokenExpiredOrInvalid);
        };
        let stored_matches = credentials.bearer_token_matches(&record.auth_identity, token)?;
        let fresh = now.since(record.issued_at) < self.ttl;
        if !stored_matches || !fresh {
            self.revoke(token)?;
            if stored_matches {
                // Age check failed: also clear the credential record's
                // stored token so nothing references the dead value.
                credentials.clear_bearer_token(&record.auth_identity)?;
            }
            return Err(GatewayError::TokenExpiredOrInvalid);
        }
        Ok(record.auth_identity)
    }

    /// Deletes a token mapping; returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the table lock is poisoned.
    pub fn revoke(&self, token: &str) -> Result<bool, GatewayError> {
        let mut tokens = self
            .tokens
            .lock()
            .map_err(|_| GatewayError::Internal("token registry lock poisoned".to_string()))?;
        Ok(tokens.remove(token).is_some())
    }

    /// Removes all tokens older than the TTL; returns how many were swept.
    ///
    /// Runs on the sweeper's clock, decoupled from session idleness: a
    /// token can outlive or be outlived by the session that issued it.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the table lock is poisoned.
    pub fn sweep_expired(&self, now: Timestamp) -> Result<usize, GatewayError> {
        let mut tokens = self
            .tokens
            .lock()
            .map_err(|_| GatewayError::Internal("token registry lock poisoned".to_string()))?;
        let before = tokens.len();
        tokens.retain(|_, record| now.since(record.issued_at) < self.ttl);
        Ok(before - tokens.len())
    }

    /// Returns the number of live token mappings.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the table lock is poisoned.
    pub fn len(&self) -> Result<usize, GatewayError> {
        let tokens = self
            .tokens
            .lock()
            .map_err(|_| GatewayError::Internal("token registry lock poisoned".to_string()))?;
        Ok(tokens.len())
    }

    /// Returns true when no tokens are live.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the table lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, GatewayError> {
        Ok(self.len()? == 0)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Mints a cryptographically unguessable token string.
fn mint_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let mut out = String::with_capacity(TOKEN_BYTES * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Returns the sha256 fingerprint of a token for audit labeling.
///
/// Raw token values must never be logged; sinks record this digest instead.
#[must_use]
pub fn token_fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================
