// crates/mailgate-mcp/tests/session_isolation.rs
// ============================================================================
// Module: Session Isolation Integration Tests
// Description: End-to-end tenant separation across interleaved sessions.
// Purpose: Validate that responses and credentials never cross sessions.
// Dependencies: mailgate-mcp, mailgate-core, tokio
// ============================================================================

//! ## Overview
//! The failure mode these tests guard against: a second tenant connecting
//! degrades or corrupts the first tenant's already-working session. Covers
//! the interleaved create/use sequence, credential separation, and a
//! concurrent fan-out where every response must land on the session that
//! asked for it.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

mod common;

use axum::http::StatusCode;
use mailgate_core::AuthIdentity;
use mailgate_core::SessionId;
use mailgate_mcp::rpc;
use serde_json::Value;
use serde_json::json;

use common::TestGateway;
use common::tool_payload;

// ============================================================================
// SECTION: Interleaving Regression
// ============================================================================

#[tokio::test]
async fn second_session_does_not_disturb_the_first() {
    let gateway = TestGateway::new();

    // S1 connects, authenticates, and works.
    let s1 = gateway.initialize().await;
    gateway.authenticate(&s1).await;
    let reply = gateway
        .call_tool(&s1, None, "s1-r1", "search_emails", json!({"query": "alpha"}))
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    let s1_identity = AuthIdentity::derive(&SessionId::parse(&s1).expect("valid id"));
    assert_eq!(tool_payload(&reply)["identity"], s1_identity.as_str());

    // S2 connects mid-stream.
    let s2 = gateway.initialize().await;
    assert_ne!(s1, s2);

    // S1 keeps working exactly as before, with its own identity and its
    // own request id on the response.
    let reply = gateway
        .call_tool(&s1, None, "s1-r2", "search_emails", json!({"query": "beta"}))
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.response.id, Value::String("s1-r2".to_string()));
    let payload = tool_payload(&reply);
    assert_eq!(payload["identity"], s1_identity.as_str());
    assert_eq!(payload["args"]["query"], "beta");

    // S2 shares nothing: no credentials, no identity.
    let reply = gateway
        .call_tool(&s2, None, "s2-r1", "search_emails", json!({"query": "gamma"}))
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.response.error.expect("error").code, rpc::CODE_AUTH_REQUIRED);
}

#[tokio::test]
async fn sessions_authenticate_into_distinct_identities() {
    let gateway = TestGateway::new();
    let s1 = gateway.initialize().await;
    let s2 = gateway.initialize().await;
    gateway.authenticate(&s1).await;
    gateway.authenticate(&s2).await;

    let reply1 = gateway
        .call_tool(&s1, None, "r1", "read_email", json!({"message_id": "m1"}))
        .await;
    let reply2 = gateway
        .call_tool(&s2, None, "r2", "read_email", json!({"message_id": "m2"}))
        .await;
    let identity1 = tool_payload(&reply1)["identity"].clone();
    let identity2 = tool_payload(&reply2)["identity"].clone();
    assert_ne!(identity1, identity2);
}

#[tokio::test]
async fn closing_one_session_leaves_the_other_serving() {
    let gateway = TestGateway::new();
    let s1 = gateway.initialize().await;
    let s2 = gateway.initialize().await;
    gateway.authenticate(&s2).await;

    let parsed = SessionId::parse(&s1).expect("valid id");
    assert!(gateway.state.registry().close(&parsed).expect("close succeeds"));

    let reply = gateway.dispatch(Some(&s1), None, "r1", "ping", json!({})).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);

    let reply = gateway
        .call_tool(&s2, None, "r2", "read_email", json!({"message_id": "m1"}))
        .await;
    assert_eq!(reply.status, StatusCode::OK);
}

// ============================================================================
// SECTION: Concurrent Fan-Out
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_land_on_their_own_sessions() {
    let gateway = std::sync::Arc::new(TestGateway::new());

    let mut sessions = Vec::new();
    for _ in 0..8 {
        let session = gateway.initialize().await;
        gateway.authenticate(&session).await;
        sessions.push(session);
    }

    let mut handles = Vec::new();
    for (index, session) in sessions.iter().enumerate() {
        let gateway = std::sync::Arc::clone(&gateway);
        let session = session.clone();
        handles.push(tokio::spawn(async move {
            for round in 0..8 {
                let marker = format!("s{index}-r{round}");
                let reply = gateway
                    .call_tool(
                        &session,
                        None,
                        &marker,
                        "search_emails",
                        json!({"query": marker}),
                    )
                    .await;
                assert_eq!(reply.status, StatusCode::OK);
                // The response envelope carries this request's id and the
                // payload echoes this request's marker; anything else means
                // a response crossed sessions.
                assert_eq!(reply.response.id, Value::String(marker.clone()));
                let payload = tool_payload(&reply);
                assert_eq!(payload["args"]["query"], marker.as_str());
                let expected =
                    AuthIdentity::derive(&SessionId::parse(&session).expect("valid id"));
                assert_eq!(payload["identity"], expected.as_str());
            }
        }));
    }
    for handle in handles {
        handle.await.expect("task completed");
    }
}
