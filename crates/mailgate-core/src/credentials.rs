// crates/mailgate-core/src/credentials.rs
// ============================================================================
// Module: Credential Store
// Description: Per-tenant mail-API credential records keyed by auth identity.
// Purpose: Hold external-service credentials with strict tenant separation.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! The credential store maps each tenant's [`AuthIdentity`] to exactly one
//! [`CredentialRecord`]. Records are created when the out-of-band auth
//! collaborator reports success, read on every domain operation, and removed
//! when corrupted or expired. Records are never merged or shared between
//! identities; the registry of sessions never reaches into this table on
//! behalf of a different tenant.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::Deserialize;
use serde::Serialize;

use crate::error::GatewayError;
use crate::identifiers::AuthIdentity;
use crate::time::Timestamp;

// ============================================================================
// SECTION: Records
// ============================================================================

/// External-service credential material for one mailbox identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailCredentials {
    /// Short-lived access credential for the mail API.
    pub access_token: String,
    /// Long-lived refresh credential, when the grant supplied one.
    pub refresh_token: Option<String>,
    /// Expiry of the access credential, when known.
    pub expires_at: Option<Timestamp>,
}

/// One tenant's credential record.
///
/// # Invariants
/// - Keyed by `auth_identity`; exactly one record per tenant.
/// - `bearer_token` holds the currently valid re-entry token, if any; a
///   reissue replaces it, invalidating the previous token on cross-check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Identity this record belongs to.
    pub auth_identity: AuthIdentity,
    /// Credential material for the mail API.
    pub credentials: MailCredentials,
    /// Currently valid bearer token for session re-entry, if issued.
    pub bearer_token: Option<String>,
    /// Host-supplied creation time.
    pub created_at: Timestamp,
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Authoritative table of credential records, one per auth identity.
///
/// # Invariants
/// - Every mutation is a single atomic map operation under one lock
///   acquisition; no mutation spans a suspension point.
#[derive(Debug, Default)]
pub struct CredentialStore {
    /// Credential records keyed by auth identity.
    records: Mutex<BTreeMap<AuthIdentity, CredentialRecord>>,
}

impl CredentialStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the record for its identity.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the table lock is poisoned.
    pub fn put(&self, record: CredentialRecord) -> Result<(), GatewayError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| GatewayError::Internal("credential store lock poisoned".to_string()))?;
        records.insert(record.auth_identity.clone(), record);
        Ok(())
    }

    /// Returns a copy of the record for `identity`, when present.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the table lock is poisoned.
    pub fn get(&self, identity: &AuthIdentity) -> Result<Option<CredentialRecord>, GatewayError> {
        let records = self
            .records
            .lock()
            .map_err(|_| GatewayError::Internal("credential store lock poisoned".to_string()))?;
        Ok(records.get(identity).cloned())
    }

    /// Removes the record for `identity`; returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the table lock is poisoned.
    pub fn remove(&self, identity: &AuthIdentity) -> Result<bool, GatewayError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| GatewayError::Internal("credential store lock poisoned".to_string()))?;
        Ok(records.remove(identity).is_some())
    }

    /// Records `token` as the identity's current bearer token.
    ///
    /// Returns false when the identity has no credential record; tokens are
    /// only issued against completed authentications.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the table lock is poisoned.
    pub fn set_bearer_token(
        &self,
        identity: &AuthIdentity,
        token: &str,
    ) -> Result<bool, GatewayError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| GatewayError::Internal("credential store lock poisoned".to_string()))?;
        match records.get_mut(identity) {
            Some(record) => {
                record.bearer_token = Some(token.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Clears the identity's stored bearer token, when present.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the table lock is poisoned.
    pub fn clear_bearer_token(&self, identity: &AuthIdentity) -> Result<(), GatewayError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| GatewayError::Internal("credential store lock poisoned".to_string()))?;
        if let Some(record) = records.get_mut(identity) {
            record.bearer_token = None;
        }
        Ok(())
    }

    /// Returns true when the identity's stored token equals `token`.
    ///
    /// Used by token validation to reject stale mappings after a reissue.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the table lock is poisoned.
    pub fn bearer_token_matches(
        &self,
        identity: &AuthIdentity,
        token: &str,
    ) -> Result<bool, GatewayError> {
        let records = self
            .records
            .lock()
            .map_err(|_| GatewayError::Internal("credential store lock poisoned".to_string()))?;
        Ok(records
            .get(identity)
            .and_then(|record| record.bearer_token.as_deref())
            .is_some_and(|stored| stored == token))
    }

    /// Returns the number of stored records.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the table lock is poisoned.
    pub fn len(&self) -> Result<usize, GatewayError> {
        let records = self
            .records
            .lock()
            .map_err(|_| GatewayError::Internal("credential store lock poisoned".to_string()))?;
        Ok(records.len())
    }

    /// Returns true when no records are stored.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the table lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, GatewayError> {
        Ok(self.len()? == 0)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
