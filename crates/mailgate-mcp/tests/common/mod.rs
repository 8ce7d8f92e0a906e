// crates/mailgate-mcp/tests/common/mod.rs
// ============================================================================
// Module: Integration Test Support
// Description: Shared collaborator doubles and gateway fixture.
// Purpose: Drive the full dispatch path without a network or real mail API.
// Dependencies: mailgate-core, mailgate-config, mailgate-mcp
// ============================================================================

//! ## Overview
//! Builds a gateway over in-process collaborator doubles: an auth flow that
//! completes on first poll and a mail executor that echoes the operation,
//! arguments, and acting identity. Tests drive `GatewayState::dispatch`,
//! the same path the HTTP handler wraps.

#![allow(
    dead_code,
    reason = "Each integration test binary uses a subset of these helpers."
)]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use std::sync::Arc;

use async_trait::async_trait;
use mailgate_config::MailgateConfig;
use mailgate_core::AuthFlow;
use mailgate_core::AuthFlowError;
use mailgate_core::AuthIdentity;
use mailgate_core::AuthStart;
use mailgate_core::CredentialRecord;
use mailgate_core::DomainError;
use mailgate_core::DomainExecutor;
use mailgate_core::MailCredentials;
use mailgate_core::OperationName;
use mailgate_mcp::Clock;
use mailgate_mcp::GatewayState;
use mailgate_mcp::ManualClock;
use mailgate_mcp::NoopAuditSink;
use mailgate_mcp::NoopMetrics;
use mailgate_mcp::RpcReply;
use serde_json::Value;
use serde_json::json;

/// Auth double whose handshake completes on the first poll.
pub struct InstantAuthFlow;

#[async_trait]
impl AuthFlow for InstantAuthFlow {
    async fn begin_auth(&self, _identity: &AuthIdentity) -> Result<AuthStart, AuthFlowError> {
        Ok(AuthStart {
            auth_url: "https://auth.example/consent".to_string(),
        })
    }

    async fn poll_completion(
        &self,
        _identity: &AuthIdentity,
    ) -> Result<Option<MailCredentials>, AuthFlowError> {
        Ok(Some(MailCredentials {
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at: None,
        }))
    }
}

/// Executor double that echoes the operation, arguments, and identity,
/// yielding first so concurrent requests interleave on the executor.
pub struct EchoExecutor;

#[async_trait]
impl DomainExecutor for EchoExecutor {
    async fn execute(
        &self,
        operation: &OperationName,
        args: Value,
        record: &CredentialRecord,
    ) -> Result<Value, DomainError> {
        tokio::task::yield_now().await;
        Ok(json!({
            "operation": operation.as_str(),
            "args": args,
            "identity": record.auth_identity.as_str(),
        }))
    }
}

/// Gateway fixture over the doubles and a manual clock.
pub struct TestGateway {
    /// Shared dispatch state.
    pub state: Arc<GatewayState>,
    /// Hand-driven clock.
    pub clock: Arc<ManualClock>,
}

impl TestGateway {
    /// Builds a gateway with default configuration.
    #[must_use]
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::default());
        let state = Arc::new(GatewayState::new(
            &MailgateConfig::default(),
            Arc::new(InstantAuthFlow),
            Arc::new(EchoExecutor),
            Arc::clone(&clock) as Arc<dyn Clock>,
            Arc::new(NoopAuditSink),
            Arc::new(NoopMetrics),
        ));
        Self {
            state,
            clock,
        }
    }

    /// Dispatches a raw JSON-RPC request.
    pub async fn dispatch(
        &self,
        session: Option<&str>,
        bearer: Option<&str>,
        id: &str,
        method: &str,
        params: Value,
    ) -> RpcReply {
        let body = serde_json::to_vec(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))
        .expect("body serializes");
        self.state.dispatch(session, bearer, &body).await
    }

    /// Initializes a fresh session and returns its id.
    pub async fn initialize(&self) -> String {
        let reply = self.dispatch(None, None, "init", "initialize", json!({})).await;
        assert!(reply.created, "initialize mints a session");
        reply.session_id.expect("session id present")
    }

    /// Runs the authenticate tool on `session` and returns the bearer token.
    pub async fn authenticate(&self, session: &str) -> String {
        let reply = self
            .dispatch(
                Some(session),
                None,
                "auth",
                "tools/call",
                json!({"name": "authenticate", "arguments": {}}),
            )
            .await;
        let payload = tool_payload(&reply);
        assert_eq!(payload["status"], "authenticated");
        payload["bearer_token"].as_str().expect("token issued").to_string()
    }

    /// Calls one tool on `session` and returns the reply.
    pub async fn call_tool(
        &self,
        session: &str,
        bearer: Option<&str>,
        id: &str,
        name: &str,
        arguments: Value,
    ) -> RpcReply {
        self.dispatch(
            Some(session),
            bearer,
            id,
            "tools/call",
            json!({"name": name, "arguments": arguments}),
        )
        .await
    }
}

impl Default for TestGateway {
    fn default() -> Self {
        Self::new()
    }
}

/// Extracts and parses the tool result text from a reply.
#[must_use]
pub fn tool_payload(reply: &RpcReply) -> Value {
    let result = reply.response.result.as_ref().expect("tool call succeeded");
    let text = result["content"][0]["text"].as_str().expect("text content");
    serde_json::from_str(text).expect("payload parses")
}
