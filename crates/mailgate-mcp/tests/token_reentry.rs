// crates/mailgate-mcp/tests/token_reentry.rs
// ============================================================================
// Module: Token Re-Entry Integration Tests
// Description: End-to-end bearer token issuance, re-entry, and expiry.
// Purpose: Validate fail-closed validation and the session/token decoupling.
// Dependencies: mailgate-mcp, mailgate-core, tokio
// ============================================================================

//! ## Overview
//! Bearer tokens decouple mailbox identity from session lifetime: a token
//! issued on one session may attach a later session to the same mailbox,
//! survives the issuing session's teardown, is invalidated by reissue, and
//! ages out after its TTL with the mapping deleted on first failure.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

mod common;

use axum::http::StatusCode;
use mailgate_core::AuthIdentity;
use mailgate_core::Duration;
use mailgate_core::SessionId;
use mailgate_mcp::rpc;
use serde_json::json;

use common::TestGateway;
use common::tool_payload;

// ============================================================================
// SECTION: Re-Entry
// ============================================================================

#[tokio::test]
async fn token_re_enters_the_mailbox_from_a_new_session() {
    let gateway = TestGateway::new();
    let issuing = gateway.initialize().await;
    let token = gateway.authenticate(&issuing).await;
    let mailbox = AuthIdentity::derive(&SessionId::parse(&issuing).expect("valid id"));

    let fresh = gateway.initialize().await;
    let reply = gateway
        .call_tool(&fresh, Some(&token), "r1", "read_email", json!({"message_id": "m1"}))
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(tool_payload(&reply)["identity"], mailbox.as_str());
}

#[tokio::test]
async fn token_survives_the_issuing_sessions_teardown() {
    let gateway = TestGateway::new();
    let issuing = gateway.initialize().await;
    let token = gateway.authenticate(&issuing).await;

    let parsed = SessionId::parse(&issuing).expect("valid id");
    assert!(gateway.state.registry().close(&parsed).expect("close succeeds"));

    let fresh = gateway.initialize().await;
    let reply = gateway
        .call_tool(&fresh, Some(&token), "r1", "search_emails", json!({"query": "q"}))
        .await;
    assert_eq!(reply.status, StatusCode::OK);
}

#[tokio::test]
async fn without_a_token_a_fresh_session_stays_unauthenticated() {
    let gateway = TestGateway::new();
    let issuing = gateway.initialize().await;
    let _token = gateway.authenticate(&issuing).await;

    let fresh = gateway.initialize().await;
    let reply = gateway
        .call_tool(&fresh, None, "r1", "read_email", json!({"message_id": "m1"}))
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.response.error.expect("error").code, rpc::CODE_AUTH_REQUIRED);
}

// ============================================================================
// SECTION: Invalidation
// ============================================================================

#[tokio::test]
async fn reissue_invalidates_the_previous_token() {
    let gateway = TestGateway::new();
    let session = gateway.initialize().await;
    let first = gateway.authenticate(&session).await;
    let second = gateway.authenticate(&session).await;
    assert_ne!(first, second);

    let reply = gateway
        .dispatch(Some(&session), Some(&first), "r1", "ping", json!({}))
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.response.error.expect("error").code, rpc::CODE_TOKEN_INVALID);

    let reply = gateway
        .dispatch(Some(&session), Some(&second), "r2", "ping", json!({}))
        .await;
    assert_eq!(reply.status, StatusCode::OK);
}

#[tokio::test]
async fn expired_token_fails_and_stays_failed() {
    let gateway = TestGateway::new();
    let session = gateway.initialize().await;
    let token = gateway.authenticate(&session).await;

    gateway.clock.advance(Duration::from_secs(24 * 60 * 60 + 1));

    // Sessions idle out independently; re-initialize and present the token.
    let fresh = gateway.initialize().await;
    let reply = gateway
        .dispatch(Some(&fresh), Some(&token), "r1", "ping", json!({}))
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert!(gateway.state.tokens().is_empty().expect("registry readable"));

    let retry = gateway
        .dispatch(Some(&fresh), Some(&token), "r2", "ping", json!({}))
        .await;
    assert_eq!(retry.response.error.expect("error").code, rpc::CODE_TOKEN_INVALID);
}
