// crates/mailgate-mcp/src/sweeper/tests.rs
// ============================================================================
// Module: Idle Sweeper Tests
// Description: Unit tests for idle eviction and token expiry sweeps.
// Purpose: Validate threshold boundaries and close-path teardown.
// Dependencies: mailgate-core, tokio
// ============================================================================

//! ## Overview
//! Drives the sweeper with a manual clock: sessions idle beyond one hour are
//! evicted through the registry close path (tearing down their transports),
//! sessions at or under the threshold survive, and the token sweep runs on
//! its own 24-hour clock.

// ============================================================================
// SECTION: Lint Configuration
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use mailgate_core::AuthFlow;
use mailgate_core::AuthFlowError;
use mailgate_core::AuthIdentity;
use mailgate_core::AuthStart;
use mailgate_core::CredentialRecord;
use mailgate_core::CredentialStore;
use mailgate_core::DomainError;
use mailgate_core::DomainExecutor;
use mailgate_core::Duration;
use mailgate_core::GatewayError;
use mailgate_core::MailCredentials;
use mailgate_core::OperationName;
use mailgate_core::SessionId;
use mailgate_core::SessionRegistry;
use mailgate_core::Timestamp;
use mailgate_core::TokenRegistry;
use serde_json::Value;
use serde_json::json;

use super::DEFAULT_IDLE_THRESHOLD;
use super::DEFAULT_SWEEP_INTERVAL;
use super::IdleSweeper;
use crate::audit::AuditSink;
use crate::audit::ContextAlarmEvent;
use crate::audit::NoopAuditSink;
use crate::audit::RpcAuditEvent;
use crate::audit::SessionAuditEvent;
use crate::audit::SweepFailureEvent;
use crate::audit::TokenAuditEvent;
use crate::clock::Clock;
use crate::clock::ManualClock;
use crate::tools::ToolRouter;
use crate::unit::ProtocolUnit;

// ============================================================================
// SECTION: Doubles
// ============================================================================

/// Auth double that never completes.
struct PendingAuthFlow;

#[async_trait]
impl AuthFlow for PendingAuthFlow {
    async fn begin_auth(&self, _identity: &AuthIdentity) -> Result<AuthStart, AuthFlowError> {
        Ok(AuthStart {
            auth_url: "https://auth.example/consent".to_string(),
        })
    }

    async fn poll_completion(
        &self,
        _identity: &AuthIdentity,
    ) -> Result<Option<MailCredentials>, AuthFlowError> {
        Ok(None)
    }
}

/// Executor double that echoes its operation.
struct EchoExecutor;

#[async_trait]
impl DomainExecutor for EchoExecutor {
    async fn execute(
        &self,
        operation: &OperationName,
        _args: Value,
        _record: &CredentialRecord,
    ) -> Result<Value, DomainError> {
        Ok(json!({"operation": operation.as_str()}))
    }
}

/// Audit double that captures sweep failure details.
#[derive(Default)]
struct RecordingSink {
    /// Details of every recorded sweep failure.
    sweep_failures: Mutex<Vec<String>>,
}

impl AuditSink for RecordingSink {
    fn record_rpc(&self, _event: &RpcAuditEvent) {}

    fn record_session(&self, _event: &SessionAuditEvent) {}

    fn record_token(&self, _event: &TokenAuditEvent) {}

    fn record_context_alarm(&self, _event: &ContextAlarmEvent) {}

    fn record_sweep_failure(&self, event: &SweepFailureEvent) {
        self.sweep_failures.lock().expect("sink lock").push(event.detail.clone());
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Sweeper plus the registries it acts on.
struct Fixture {
    registry: Arc<SessionRegistry<ProtocolUnit>>,
    tokens: Arc<TokenRegistry>,
    credentials: Arc<CredentialStore>,
    clock: Arc<ManualClock>,
    sweeper: IdleSweeper,
}

/// Builds a sweeper over fresh registries with default windows.
fn fixture() -> Fixture {
    let registry = Arc::new(SessionRegistry::new());
    let tokens = Arc::new(TokenRegistry::new(Duration::from_secs(24 * 60 * 60)));
    let credentials = Arc::new(CredentialStore::new());
    let clock = Arc::new(ManualClock::starting_at(Timestamp::from_unix_millis(0)));
    let sweeper = IdleSweeper::new(
        Arc::clone(&registry),
        Arc::clone(&tokens),
        Arc::clone(&clock) as Arc<dyn Clock>,
        Arc::new(NoopAuditSink),
        DEFAULT_IDLE_THRESHOLD,
        DEFAULT_SWEEP_INTERVAL,
    );
    Fixture {
        registry,
        tokens,
        credentials,
        clock,
        sweeper,
    }
}

/// Creates a session at the clock's current time.
fn create_session(fixture: &Fixture) -> SessionId {
    let router = Arc::new(ToolRouter::new(
        Arc::clone(&fixture.credentials),
        Arc::clone(&fixture.tokens),
        Arc::new(PendingAuthFlow),
        Arc::new(EchoExecutor),
        Arc::clone(&fixture.clock) as Arc<dyn Clock>,
        Arc::new(NoopAuditSink),
    ));
    let (entry, created) = fixture
        .registry
        .resolve_or_create(None, true, fixture.clock.now(), |session_id, _| {
            Ok(ProtocolUnit::connect(session_id, router))
        })
        .expect("session created");
    assert!(created);
    entry.session_id().clone()
}

// ============================================================================
// SECTION: Session Sweep Tests
// ============================================================================

#[tokio::test]
async fn idle_session_is_evicted_and_its_transport_torn_down() {
    let fixture = fixture();
    let session_id = create_session(&fixture);
    let entry = fixture
        .registry
        .get(&session_id)
        .expect("registry readable")
        .expect("session present");

    fixture.clock.advance(Duration::from_secs(60 * 60 + 1));
    let report = fixture.sweeper.sweep_once().expect("sweep succeeds");
    assert_eq!(report.sessions_swept, 1);
    assert!(fixture
        .registry
        .get(&session_id)
        .expect("registry readable")
        .is_none());
    assert!(entry.unit().transport().is_closed());
}

#[tokio::test]
async fn session_at_exactly_the_threshold_survives() {
    let fixture = fixture();
    let session_id = create_session(&fixture);

    fixture.clock.advance(DEFAULT_IDLE_THRESHOLD);
    let report = fixture.sweeper.sweep_once().expect("sweep succeeds");
    assert_eq!(report.sessions_swept, 0);
    assert!(fixture
        .registry
        .get(&session_id)
        .expect("registry readable")
        .is_some());
}

#[tokio::test]
async fn recent_activity_resets_the_idle_window() {
    let fixture = fixture();
    let session_id = create_session(&fixture);

    fixture.clock.advance(Duration::from_secs(50 * 60));
    let entry = fixture
        .registry
        .get(&session_id)
        .expect("registry readable")
        .expect("session present");
    entry.touch(fixture.clock.now());

    fixture.clock.advance(Duration::from_secs(50 * 60));
    let report = fixture.sweeper.sweep_once().expect("sweep succeeds");
    assert_eq!(report.sessions_swept, 0);
}

// ============================================================================
// SECTION: Token Sweep Tests
// ============================================================================

#[tokio::test]
async fn token_sweep_runs_on_its_own_clock() {
    let fixture = fixture();
    let session_id = create_session(&fixture);
    let identity = AuthIdentity::derive(&session_id);
    fixture
        .credentials
        .put(CredentialRecord {
            auth_identity: identity.clone(),
            credentials: MailCredentials {
                access_token: "access".to_string(),
                refresh_token: None,
                expires_at: None,
            },
            bearer_token: None,
            created_at: fixture.clock.now(),
        })
        .expect("record stored");
    fixture
        .tokens
        .issue(&identity, fixture.clock.now(), &fixture.credentials)
        .expect("token issued");

    // One sweep interval later: the session may idle out long before the
    // token does.
    fixture.clock.advance(Duration::from_secs(2 * 60 * 60));
    let report = fixture.sweeper.sweep_once().expect("sweep succeeds");
    assert_eq!(report.sessions_swept, 1);
    assert_eq!(report.tokens_swept, 0);
    assert_eq!(fixture.tokens.len().expect("len readable"), 1);

    fixture.clock.advance(Duration::from_secs(23 * 60 * 60));
    let report = fixture.sweeper.sweep_once().expect("sweep succeeds");
    assert_eq!(report.tokens_swept, 1);
    assert!(fixture.tokens.is_empty().expect("empty readable"));
}

// ============================================================================
// SECTION: Failure Reporting Tests
// ============================================================================

#[tokio::test]
async fn failed_cycle_is_recorded_to_the_audit_sink() {
    let sink = Arc::new(RecordingSink::default());
    let clock = Arc::new(ManualClock::starting_at(Timestamp::from_unix_millis(0)));
    let sweeper = IdleSweeper::new(
        Arc::new(SessionRegistry::new()),
        Arc::new(TokenRegistry::new(Duration::from_secs(24 * 60 * 60))),
        Arc::clone(&clock) as Arc<dyn Clock>,
        Arc::clone(&sink) as Arc<dyn AuditSink>,
        DEFAULT_IDLE_THRESHOLD,
        DEFAULT_SWEEP_INTERVAL,
    );

    // A healthy cycle leaves no failure trail.
    sweeper.sweep_once().expect("sweep succeeds");
    assert!(sink.sweep_failures.lock().expect("sink lock").is_empty());

    // The loop records through the same path for any failing cycle.
    sweeper.record_failure(&GatewayError::Internal("registry lock poisoned".to_string()));
    let failures = sink.sweep_failures.lock().expect("sink lock");
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("registry lock poisoned"));
}
