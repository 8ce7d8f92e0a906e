// crates/mailgate-core/src/interfaces.rs
// ============================================================================
// Module: Collaborator Interfaces
// Description: Seams for the auth handshake and mail-API collaborators.
// Purpose: Keep the external service and browser consent flow opaque to core.
// Dependencies: async-trait, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The gateway treats the browser-based consent flow and the mail API as
//! opaque collaborators behind these traits. The core only needs two
//! guarantees: a completed credential is retrievable exactly once per auth
//! attempt, and domain results are returned or fail without interpretation.
//! Retry policy, if any, belongs to the collaborator, never to this layer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::credentials::CredentialRecord;
use crate::credentials::MailCredentials;
use crate::identifiers::AuthIdentity;
use crate::identifiers::OperationName;

// ============================================================================
// SECTION: Auth Collaborator
// ============================================================================

/// Handle returned when an auth handshake begins.
#[derive(Debug, Clone)]
pub struct AuthStart {
    /// Consent URL the caller must open to grant access.
    pub auth_url: String,
}

/// Auth collaborator errors.
#[derive(Debug, Clone, Error)]
pub enum AuthFlowError {
    /// The handshake could not be started.
    #[error("auth start failed: {0}")]
    Start(String),
    /// The callback reported a terminal failure.
    #[error("auth failed: {0}")]
    Failed(String),
}

/// Out-of-band authentication collaborator.
///
/// Pending state is retained until explicitly completed or the owning
/// session is swept; completion in the server-resident path is unbounded.
#[async_trait]
pub trait AuthFlow: Send + Sync {
    /// Starts a handshake for `identity` and returns the consent URL.
    async fn begin_auth(&self, identity: &AuthIdentity) -> Result<AuthStart, AuthFlowError>;

    /// Polls for handshake completion.
    ///
    /// Returns `Ok(Some(credentials))` exactly once per completed attempt,
    /// `Ok(None)` while the handshake is still pending.
    async fn poll_completion(
        &self,
        identity: &AuthIdentity,
    ) -> Result<Option<MailCredentials>, AuthFlowError>;
}

// ============================================================================
// SECTION: Domain Collaborator
// ============================================================================

/// Opaque failure from the mail-API collaborator.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DomainError {
    /// Underlying message reported back to the caller verbatim.
    pub message: String,
}

impl DomainError {
    /// Creates a domain error from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Mail-API operation dispatcher.
///
/// The gateway resolves the [`CredentialRecord`] for the current request
/// context and dispatches by name; it does not interpret `result`.
#[async_trait]
pub trait DomainExecutor: Send + Sync {
    /// Executes `operation` with `args` under the tenant's credentials.
    async fn execute(
        &self,
        operation: &OperationName,
        args: Value,
        record: &CredentialRecord,
    ) -> Result<Value, DomainError>;
}
