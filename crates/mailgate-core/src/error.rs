// crates/mailgate-core/src/error.rs
// ============================================================================
// Module: Mailgate Error Taxonomy
// Description: Structured error classes for session, token, and context faults.
// Purpose: Keep recovery guidance explicit and fail-closed across the gateway.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! This module defines the gateway-wide error taxonomy. Registry and token
//! failures are recoverable and convert to structured responses at the
//! transport boundary. [`GatewayError::ContextLost`] is the one class that
//! indicates a violated propagation invariant and must be treated as a
//! correctness-critical alarm, never silently substituted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Gateway error taxonomy shared by the core and all transports.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Unknown or missing session id on a non-initialization request.
    /// Recovered by instructing the caller to re-initialize.
    #[error("invalid session: {}", session_id.as_deref().unwrap_or("<missing>"))]
    InvalidSession {
        /// Presented session identifier, when one was supplied.
        session_id: Option<String>,
    },
    /// No credential and no valid bearer token attached to the context.
    #[error("authentication required: run the authenticate tool to connect a mailbox")]
    AuthenticationRequired,
    /// Presented bearer token is unknown, superseded, or aged out. The
    /// registry entry is already deleted when this surfaces.
    #[error("bearer token expired or invalid; authenticate again to obtain a new token")]
    TokenExpiredOrInvalid,
    /// Ambient identity was absent (or mismatched) at response-emission
    /// time. Fatal for that one response; never guess a session.
    #[error("request context lost at response emission (session {})", session_id.as_deref().unwrap_or("<unknown>"))]
    ContextLost {
        /// Session identifier when it could still be determined.
        session_id: Option<String>,
    },
    /// Opaque failure from the mail-API collaborator. Never retried here.
    #[error("domain operation failed: {0}")]
    DomainOperation(String),
    /// Work was dispatched at, or a response emitted after, session
    /// teardown. Detectable and non-fatal to the process.
    #[error("session closed: {session_id}")]
    SessionClosed {
        /// Identifier of the torn-down session.
        session_id: String,
    },
    /// Protocol-unit construction failed; no partial registration remains.
    #[error("session initialization failed: {0}")]
    SessionInit(String),
    /// Malformed request payload or parameters.
    #[error("invalid params: {0}")]
    InvalidParams(String),
    /// Internal invariant failure (poisoned lock, serialization).
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns a stable machine-readable code for wire payloads and audit.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidSession { .. } => "invalid_session",
            Self::AuthenticationRequired => "authentication_required",
            Self::TokenExpiredOrInvalid => "token_expired_or_invalid",
            Self::ContextLost { .. } => "context_lost",
            Self::DomainOperation(_) => "domain_operation_failure",
            Self::SessionClosed { .. } => "session_closed",
            Self::SessionInit(_) => "session_init_failure",
            Self::InvalidParams(_) => "invalid_params",
            Self::Internal(_) => "internal",
        }
    }

    /// Returns true when this error signals a violated propagation
    /// invariant that warrants process-level alerting.
    #[must_use]
    pub const fn is_correctness_alarm(&self) -> bool {
        matches!(self, Self::ContextLost { .. })
    }
}
