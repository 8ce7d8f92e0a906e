// crates/mailgate-core/src/registry.rs
// ============================================================================
// Module: Session Registry
// Description: Authoritative table of active tenant sessions.
// Purpose: Create, resolve, and destroy one isolated protocol unit per tenant.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! The session registry is the single authoritative table of active tenants.
//! The first initialization request with no session id mints an unguessable
//! id, constructs a fresh protocol unit for it, and registers the pair
//! atomically. Every later request resolves the existing entry and bumps its
//! activity counters. An unknown or missing id on a non-initialization
//! request fails closed with [`GatewayError::InvalidSession`]; the registry
//! never falls back to another tenant's entry.
//!
//! ## Invariants
//! - A session, its protocol unit, and its transport form a fixed 1:1:1
//!   triple for the session's lifetime; no other session references them.
//! - Unit construction happens before registration; a construction failure
//!   leaves no partial state visible to other sessions.
//! - Table mutations are single atomic map operations under one lock
//!   acquisition; activity bumps use atomics and take no lock at all.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use serde::Serialize;

use crate::error::GatewayError;
use crate::identifiers::AuthIdentity;
use crate::identifiers::SessionId;
use crate::time::Duration;
use crate::time::Timestamp;

// ============================================================================
// SECTION: Session Unit
// ============================================================================

/// Per-session protocol unit owned exclusively by one registry entry.
///
/// Implementations pair one protocol handler with one transport. The
/// registry calls [`SessionUnit::teardown`] exactly once per close; after
/// teardown no new work may be dispatched into the unit and any response
/// emission must surface as a detectable error.
pub trait SessionUnit: Send + Sync {
    /// Tears down the unit's transport. Idempotent.
    fn teardown(&self);
}

// ============================================================================
// SECTION: Session Entry
// ============================================================================

/// One tenant's registry entry: identity, counters, and its protocol unit.
///
/// # Invariants
/// - `auth_identity` is derived from `session_id` at creation and never
///   changes.
#[derive(Debug)]
pub struct SessionEntry<U> {
    /// Opaque session identifier.
    session_id: SessionId,
    /// Derived identity keying credential and token state.
    auth_identity: AuthIdentity,
    /// Host-supplied creation time.
    created_at: Timestamp,
    /// Last activity in unix millis, bumped on every request.
    last_activity_ms: AtomicI64,
    /// Number of requests handled on this session.
    request_count: AtomicU64,
    /// The session's dedicated protocol unit.
    unit: U,
}

impl<U> SessionEntry<U> {
    /// Returns the session identifier.
    #[must_use]
    pub const fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Returns the derived auth identity.
    #[must_use]
    pub const fn auth_identity(&self) -> &AuthIdentity {
        &self.auth_identity
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Returns the last-activity timestamp.
    #[must_use]
    pub fn last_activity(&self) -> Timestamp {
        Timestamp::from_unix_millis(self.last_activity_ms.load(Ordering::Relaxed))
    }

    /// Returns the number of requests handled so far.
    #[must_use]
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Records activity: bumps the request counter and activity time.
    pub fn touch(&self, now: Timestamp) {
        self.last_activity_ms.store(now.as_unix_millis(), Ordering::Relaxed);
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the session's protocol unit.
    #[must_use]
    pub const fn unit(&self) -> &U {
        &self.unit
    }
}

// ============================================================================
// SECTION: Stats
// ============================================================================

/// Read-only per-session summary for observability endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    /// Session identifier.
    pub session_id: SessionId,
    /// Requests handled on this session.
    pub request_count: u64,
    /// Milliseconds since session creation.
    pub age_ms: i64,
    /// Milliseconds since last activity.
    pub idle_ms: i64,
}

/// Aggregate registry statistics. Read-only, no side effects.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    /// Number of active sessions.
    pub count: usize,
    /// Per-session summaries ordered by session id.
    pub sessions: Vec<SessionSummary>,
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Authoritative table of active tenant sessions.
#[derive(Debug)]
pub struct SessionRegistry<U> {
    /// Active sessions keyed by session id.
    sessions: Mutex<BTreeMap<SessionId, Arc<SessionEntry<U>>>>,
}

impl<U> Default for SessionRegistry<U> {
    fn default() -> Self {
        Self {
            sessions: Mutex::new(BTreeMap::new()),
        }
    }
}

impl<U: SessionUnit> SessionRegistry<U> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves an existing session or creates a new one.
    ///
    /// A missing id on an initialization request mints a fresh session and
    /// returns it marked new. A known id returns the existing entry with its
    /// activity bumped. Anything else is [`GatewayError::InvalidSession`].
    ///
    /// `build` constructs the protocol unit for a new session and runs
    /// before the entry is registered, so a failure leaves no partial state.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidSession`] for unknown/missing ids,
    /// [`GatewayError::SessionInit`] when unit construction fails, and
    /// [`GatewayError::Internal`] when the table lock is poisoned.
    pub fn resolve_or_create(
        &self,
        presented: Option<&SessionId>,
        is_initialization: bool,
        now: Timestamp,
        build: impl FnOnce(&SessionId, &AuthIdentity) -> Result<U, GatewayError>,
    ) -> Result<(Arc<SessionEntry<U>>, bool), GatewayError> {
        if let Some(session_id) = presented {
            let entry = self.get(session_id)?.ok_or_else(|| GatewayError::InvalidSession {
                session_id: Some(session_id.to_string()),
            })?;
            entry.touch(now);
            return Ok((entry, false));
        }
        if !is_initialization {
            return Err(GatewayError::InvalidSession {
                session_id: None,
            });
        }
        let session_id = SessionId::mint();
        let auth_identity = AuthIdentity::derive(&session_id);
        let unit = build(&session_id, &auth_identity)
            .map_err(|err| GatewayError::SessionInit(err.to_string()))?;
        let entry = Arc::new(SessionEntry {
            session_id: session_id.clone(),
            auth_identity,
            created_at: now,
            last_activity_ms: AtomicI64::new(now.as_unix_millis()),
            request_count: AtomicU64::new(1),
            unit,
        });
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| GatewayError::Internal("session registry lock poisoned".to_string()))?;
        if sessions.contains_key(&session_id) {
            // A 128-bit random collision; refuse rather than alias tenants.
            return Err(GatewayError::Internal("session id collision".to_string()));
        }
        sessions.insert(session_id, Arc::clone(&entry));
        Ok((entry, true))
    }

    /// Looks up a session without bumping activity.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the table lock is poisoned.
    pub fn get(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<Arc<SessionEntry<U>>>, GatewayError> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| GatewayError::Internal("session registry lock poisoned".to_string()))?;
        Ok(sessions.get(session_id).cloned())
    }

    /// Closes a session: removes the entry and tears down its unit.
    ///
    /// Returns whether a session existed. Idempotent; safe to call while a
    /// request for the session is in flight (in-flight work completes or
    /// fails, but nothing new is dispatched into the torn-down unit).
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the table lock is poisoned.
    pub fn close(&self, session_id: &SessionId) -> Result<bool, GatewayError> {
        let removed = {
            let mut sessions = self.sessions.lock().map_err(|_| {
                GatewayError::Internal("session registry lock poisoned".to_string())
            })?;
            sessions.remove(session_id)
        };
        match removed {
            Some(entry) => {
                // Teardown runs outside the table lock.
                entry.unit().teardown();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Returns read-only registry statistics.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the table lock is poisoned.
    pub fn stats(&self, now: Timestamp) -> Result<SessionStats, GatewayError> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| GatewayError::Internal("session registry lock poisoned".to_string()))?;
        let summaries: Vec<SessionSummary> = sessions
            .values()
            .map(|entry| SessionSummary {
                session_id: entry.session_id().clone(),
                request_count: entry.request_count(),
                age_ms: now.since(entry.created_at()).as_millis(),
                idle_ms: now.since(entry.last_activity()).as_millis(),
            })
            .collect();
        Ok(SessionStats {
            count: summaries.len(),
            sessions: summaries,
        })
    }

    /// Returns the ids of sessions idle beyond `threshold`.
    ///
    /// Read-only scan; the sweeper closes each returned session via
    /// [`SessionRegistry::close`] so teardown follows the one canonical path.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the table lock is poisoned.
    pub fn idle_sessions(
        &self,
        now: Timestamp,
        threshold: Duration,
    ) -> Result<Vec<SessionId>, GatewayError> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| GatewayError::Internal("session registry lock poisoned".to_string()))?;
        Ok(sessions
            .values()
            .filter(|entry| now.since(entry.last_activity()) > threshold)
            .map(|entry| entry.session_id().clone())
            .collect())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
