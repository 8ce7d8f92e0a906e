// crates/mailgate-core/src/context.rs
// ============================================================================
// Module: Request Context Propagation
// Description: Ambient, task-scoped tenant identity for interleaved requests.
// Purpose: Answer "which tenant is this work for" from any await point.
// Dependencies: tokio, serde
// ============================================================================

//! ## Overview
//! Many tenants' requests interleave as asynchronous continuations on shared
//! executor threads, so correctness cannot rely on call-stack locality. This
//! module carries the per-request [`RequestContext`] in a tokio task-local,
//! established once at the inbound boundary and **re-applied from a captured
//! snapshot** at the outbound boundary. The outbound re-application must use
//! the exact snapshot taken at request entry, never whatever happens to be
//! ambient when the emitting continuation resumes; a stale ambient value is
//! precisely how one tenant's response gets delivered to another tenant's
//! connection.
//!
//! ## Invariants
//! - [`ContextSnapshot::capture`] fails closed when no context is ambient.
//! - Emission paths re-enter through a snapshot; they never read the
//!   ambient value directly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;

use serde::Serialize;

use crate::error::GatewayError;
use crate::identifiers::AuthIdentity;
use crate::identifiers::RequestId;
use crate::identifiers::SessionId;
use crate::time::Timestamp;

// ============================================================================
// SECTION: Request Context
// ============================================================================

/// Ephemeral per-request identity carried through the asynchronous graph.
///
/// # Invariants
/// - Exists only for the duration of one request's execution graph.
/// - `auth_identity` may be overridden by a validated bearer token and can
///   therefore differ from the identity derived from `session_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestContext {
    /// Session the request arrived on.
    pub session_id: SessionId,
    /// Identity keying credential and token state for this request.
    pub auth_identity: AuthIdentity,
    /// JSON-RPC request identifier.
    pub request_id: RequestId,
    /// Host-supplied timestamp at request entry.
    pub started_at: Timestamp,
}

tokio::task_local! {
    /// Ambient request context for the currently executing logical task.
    static REQUEST_CONTEXT: RequestContext;
}

/// Runs `fut` with `context` established as the ambient request context.
///
/// This is the inbound load-bearing boundary: it must wrap the transport's
/// "accept and begin processing this request" entry point so every await
/// point underneath can answer which tenant it serves.
pub async fn with_request_context<F>(context: RequestContext, fut: F) -> F::Output
where
    F: Future,
{
    REQUEST_CONTEXT.scope(context, fut).await
}

/// Returns a clone of the ambient request context, when one is established.
#[must_use]
pub fn current_request_context() -> Option<RequestContext> {
    REQUEST_CONTEXT.try_with(Clone::clone).ok()
}

// ============================================================================
// SECTION: Context Snapshot
// ============================================================================

/// Identity snapshot taken at request entry and re-applied at emission.
///
/// # Invariants
/// - Carries the exact context that was ambient at capture time; emission
///   paths must go through [`ContextSnapshot::reenter_sync`] or
///   [`ContextSnapshot::reenter`] rather than reading the ambient value.
#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    /// Context captured at the inbound boundary.
    context: RequestContext,
}

impl ContextSnapshot {
    /// Captures the ambient context for later re-application.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ContextLost`] when no context is ambient,
    /// which means the inbound boundary was not wrapped.
    pub fn capture() -> Result<Self, GatewayError> {
        current_request_context().map_or(
            Err(GatewayError::ContextLost {
                session_id: None,
            }),
            |context| {
                Ok(Self {
                    context,
                })
            },
        )
    }

    /// Builds a snapshot from an explicit context.
    ///
    /// Used where the context is constructed and consumed by the same
    /// caller, such as transport construction in tests.
    #[must_use]
    pub const fn from_context(context: RequestContext) -> Self {
        Self {
            context,
        }
    }

    /// Returns the captured context.
    #[must_use]
    pub const fn context(&self) -> &RequestContext {
        &self.context
    }

    /// Returns the captured session identifier.
    #[must_use]
    pub const fn session_id(&self) -> &SessionId {
        &self.context.session_id
    }

    /// Returns the captured request identifier.
    #[must_use]
    pub const fn request_id(&self) -> &RequestId {
        &self.context.request_id
    }

    /// Re-applies the captured context around a synchronous emission path.
    ///
    /// This is the outbound load-bearing boundary: whichever continuation
    /// performs the emission may resume on an execution unit last used by a
    /// different tenant, so the snapshot is installed explicitly for the
    /// duration of `f`.
    pub fn reenter_sync<T>(&self, f: impl FnOnce() -> T) -> T {
        REQUEST_CONTEXT.sync_scope(self.context.clone(), f)
    }

    /// Re-applies the captured context around an asynchronous emission path.
    pub async fn reenter<F>(&self, fut: F) -> F::Output
    where
        F: Future,
    {
        REQUEST_CONTEXT.scope(self.context.clone(), fut).await
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
