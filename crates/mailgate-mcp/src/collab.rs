// crates/mailgate-mcp/src/collab.rs
// ============================================================================
// Module: Unconfigured Collaborators
// Description: Fail-closed placeholders for the auth and mail collaborators.
// Purpose: Let the gateway start without external wiring and refuse cleanly.
// Dependencies: mailgate-core, async-trait
// ============================================================================

//! ## Overview
//! Deployments wire real collaborators at startup; these placeholders stand
//! in when none is configured. Both refuse every call with a stable message
//! rather than panicking, so a misconfigured gateway degrades to explicit
//! errors instead of crashing mid-request.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use mailgate_core::AuthFlow;
use mailgate_core::AuthFlowError;
use mailgate_core::AuthIdentity;
use mailgate_core::AuthStart;
use mailgate_core::CredentialRecord;
use mailgate_core::DomainError;
use mailgate_core::DomainExecutor;
use mailgate_core::MailCredentials;
use mailgate_core::OperationName;
use serde_json::Value;

// ============================================================================
// SECTION: Implementations
// ============================================================================

/// Auth collaborator that refuses every handshake.
#[derive(Debug, Default)]
pub struct UnconfiguredAuthFlow;

#[async_trait]
impl AuthFlow for UnconfiguredAuthFlow {
    async fn begin_auth(&self, _identity: &AuthIdentity) -> Result<AuthStart, AuthFlowError> {
        Err(AuthFlowError::Start(
            "no auth collaborator configured".to_string(),
        ))
    }

    async fn poll_completion(
        &self,
        _identity: &AuthIdentity,
    ) -> Result<Option<MailCredentials>, AuthFlowError> {
        Err(AuthFlowError::Failed(
            "no auth collaborator configured".to_string(),
        ))
    }
}

/// Domain collaborator that refuses every operation.
#[derive(Debug, Default)]
pub struct UnconfiguredExecutor;

#[async_trait]
impl DomainExecutor for UnconfiguredExecutor {
    async fn execute(
        &self,
        operation: &OperationName,
        _args: Value,
        _record: &CredentialRecord,
    ) -> Result<Value, DomainError> {
        Err(DomainError::new(format!(
            "no mail collaborator configured for operation: {operation}"
        )))
    }
}
