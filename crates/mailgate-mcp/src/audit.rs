// crates/mailgate-mcp/src/audit.rs
// ============================================================================
// Module: Gateway Audit Logging
// Description: Structured audit events for request, session, and token flows.
// Purpose: Emit redacted audit logs without hard dependencies.
// Dependencies: mailgate-core, serde
// ============================================================================

//! ## Overview
//! This module defines audit event payloads and sinks for gateway logging.
//! It is intentionally lightweight so deployments can route events to their
//! preferred logging pipeline without redesign. Raw bearer tokens never
//! appear in events; sinks receive sha256 fingerprints. The context-lost
//! alarm is the one event class that indicates a violated propagation
//! invariant and should page, not just log.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use mailgate_core::Timestamp;
use serde::Serialize;

use crate::telemetry::RpcMethod;
use crate::telemetry::RpcOutcome;

// ============================================================================
// SECTION: Events
// ============================================================================

/// Per-request audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct RpcAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: i64,
    /// Session the request ran on, when resolved.
    pub session_id: Option<String>,
    /// JSON-RPC request identifier, when present.
    pub request_id: Option<String>,
    /// JSON-RPC method classification.
    pub method: RpcMethod,
    /// Tool name when available (tools/call).
    pub tool: Option<String>,
    /// Request outcome.
    pub outcome: RpcOutcome,
    /// JSON-RPC error code when present.
    pub error_code: Option<i64>,
    /// Stable error kind label when present.
    pub error_kind: Option<&'static str>,
    /// Request body size in bytes.
    pub request_bytes: usize,
    /// Response body size in bytes.
    pub response_bytes: usize,
}

/// Session lifecycle action label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionAction {
    /// Session created via initialization.
    Created,
    /// Session closed explicitly.
    Closed,
    /// Session evicted by the idle sweeper.
    Swept,
}

/// Session lifecycle audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct SessionAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: i64,
    /// Lifecycle action.
    pub action: SessionAction,
    /// Session identifier.
    pub session_id: String,
    /// Requests handled when known (close/sweep).
    pub request_count: Option<u64>,
    /// Idle time at eviction, in milliseconds.
    pub idle_ms: Option<i64>,
}

impl SessionAuditEvent {
    /// Builds a session lifecycle event.
    #[must_use]
    pub fn new(action: SessionAction, session_id: &str, now: Timestamp) -> Self {
        Self {
            event: "session_lifecycle",
            timestamp_ms: now.as_unix_millis(),
            action,
            session_id: session_id.to_string(),
            request_count: None,
            idle_ms: None,
        }
    }

    /// Returns a copy with the request counter attached.
    #[must_use]
    pub fn with_request_count(mut self, count: u64) -> Self {
        self.request_count = Some(count);
        self
    }

    /// Returns a copy with the idle duration attached.
    #[must_use]
    pub fn with_idle_ms(mut self, idle_ms: i64) -> Self {
        self.idle_ms = Some(idle_ms);
        self
    }
}

/// Token issuance/validation audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct TokenAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: i64,
    /// Decision outcome.
    pub decision: &'static str,
    /// Token fingerprint (sha256), never the raw token.
    pub token_fingerprint: String,
    /// Identity the token proves, when the decision is allow.
    pub auth_identity: Option<String>,
    /// Failure reason label for deny events.
    pub reason: Option<&'static str>,
}

impl TokenAuditEvent {
    /// Builds an allow event.
    #[must_use]
    pub fn allowed(fingerprint: String, identity: &str, now: Timestamp) -> Self {
        Self {
            event: "token_authz",
            timestamp_ms: now.as_unix_millis(),
            decision: "allow",
            token_fingerprint: fingerprint,
            auth_identity: Some(identity.to_string()),
            reason: None,
        }
    }

    /// Builds a deny event.
    #[must_use]
    pub fn denied(fingerprint: String, reason: &'static str, now: Timestamp) -> Self {
        Self {
            event: "token_authz",
            timestamp_ms: now.as_unix_millis(),
            decision: "deny",
            token_fingerprint: fingerprint,
            auth_identity: None,
            reason: Some(reason),
        }
    }
}

/// Correctness-critical alarm raised when ambient identity is missing or
/// mismatched at response-emission time.
#[derive(Debug, Clone, Serialize)]
pub struct ContextAlarmEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: i64,
    /// Session identifier when it could still be determined.
    pub session_id: Option<String>,
    /// Request identifier when known.
    pub request_id: Option<String>,
    /// Human-readable detail for the alarm.
    pub detail: String,
}

impl ContextAlarmEvent {
    /// Builds a context-lost alarm.
    #[must_use]
    pub fn new(
        session_id: Option<String>,
        request_id: Option<String>,
        detail: impl Into<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            event: "context_lost_alarm",
            timestamp_ms: now.as_unix_millis(),
            session_id,
            request_id,
            detail: detail.into(),
        }
    }
}

/// Failed sweep cycle event payload.
///
/// A single failure is transient; repeated failures mean eviction has
/// stopped and resources are accumulating.
#[derive(Debug, Clone, Serialize)]
pub struct SweepFailureEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: i64,
    /// Human-readable failure detail.
    pub detail: String,
}

impl SweepFailureEvent {
    /// Builds a sweep failure event.
    #[must_use]
    pub fn new(detail: impl Into<String>, now: Timestamp) -> Self {
        Self {
            event: "sweep_failure",
            timestamp_ms: now.as_unix_millis(),
            detail: detail.into(),
        }
    }
}

// ============================================================================
// SECTION: Sink Trait
// ============================================================================

/// Audit sink for gateway events.
pub trait AuditSink: Send + Sync {
    /// Records a per-request event.
    fn record_rpc(&self, event: &RpcAuditEvent);
    /// Records a session lifecycle event.
    fn record_session(&self, event: &SessionAuditEvent);
    /// Records a token decision event.
    fn record_token(&self, event: &TokenAuditEvent);
    /// Records a context-lost alarm.
    fn record_context_alarm(&self, event: &ContextAlarmEvent);
    /// Records a failed sweep cycle.
    fn record_sweep_failure(&self, event: &SweepFailureEvent);
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl StderrAuditSink {
    /// Writes one serialized event line to stderr.
    fn write_line(event: &impl Serialize) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

impl AuditSink for StderrAuditSink {
    fn record_rpc(&self, event: &RpcAuditEvent) {
        Self::write_line(event);
    }

    fn record_session(&self, event: &SessionAuditEvent) {
        Self::write_line(event);
    }

    fn record_token(&self, event: &TokenAuditEvent) {
        Self::write_line(event);
    }

    fn record_context_alarm(&self, event: &ContextAlarmEvent) {
        Self::write_line(event);
    }

    fn record_sweep_failure(&self, event: &SweepFailureEvent) {
        Self::write_line(event);
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Writes one serialized event line to the file.
    fn write_line(&self, event: &impl Serialize) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl AuditSink for FileAuditSink {
    fn record_rpc(&self, event: &RpcAuditEvent) {
        self.write_line(event);
    }

    fn record_session(&self, event: &SessionAuditEvent) {
        self.write_line(event);
    }

    fn record_token(&self, event: &TokenAuditEvent) {
        self.write_line(event);
    }

    fn record_context_alarm(&self, event: &ContextAlarmEvent) {
        self.write_line(event);
    }

    fn record_sweep_failure(&self, event: &SweepFailureEvent) {
        self.write_line(event);
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record_rpc(&self, _event: &RpcAuditEvent) {}

    fn record_session(&self, _event: &SessionAuditEvent) {}

    fn record_token(&self, _event: &TokenAuditEvent) {}

    fn record_context_alarm(&self, _event: &ContextAlarmEvent) {}

    fn record_sweep_failure(&self, _event: &SweepFailureEvent) {}
}

// ============================================================================
// SECTION: Tests
// ============================================================================
