// crates/mailgate-mcp/src/sweeper.rs
// ============================================================================
// Module: Idle Sweeper
// Description: Periodic eviction of idle sessions and expired tokens.
// Purpose: Bound resource growth from abandoned callers.
// Dependencies: mailgate-core, tokio
// ============================================================================

//! ## Overview
//! The sweeper wakes on a fixed interval, evicts sessions idle beyond the
//! configured threshold through the registry's one canonical close path,
//! and sweeps tokens older than their TTL. The two sweeps are independent:
//! a bearer token can outlive the session that issued it, and an active
//! session can hold an expired token. A sweep cycle that fails on one
//! session still attempts the rest.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use mailgate_core::Duration;
use mailgate_core::GatewayError;
use mailgate_core::SessionRegistry;
use mailgate_core::TokenRegistry;
use tokio::task::JoinHandle;

use crate::audit::AuditSink;
use crate::audit::SessionAction;
use crate::audit::SessionAuditEvent;
use crate::audit::SweepFailureEvent;
use crate::clock::Clock;
use crate::unit::ProtocolUnit;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default sweep interval: five minutes.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Default session idle threshold: one hour.
pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(60 * 60);

// ============================================================================
// SECTION: Sweep Report
// ============================================================================

/// Outcome of one sweep cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Sessions evicted this cycle.
    pub sessions_swept: usize,
    /// Expired tokens removed this cycle.
    pub tokens_swept: usize,
}

// ============================================================================
// SECTION: Sweeper
// ============================================================================

/// Periodic eviction task over the session and token registries.
pub struct IdleSweeper {
    /// Session table to scan and close against.
    registry: Arc<SessionRegistry<ProtocolUnit>>,
    /// Token table for the independent expiry sweep.
    tokens: Arc<TokenRegistry>,
    /// Wall-clock source driving idleness decisions.
    clock: Arc<dyn Clock>,
    /// Audit sink for eviction events.
    audit: Arc<dyn AuditSink>,
    /// Idle time beyond which a session is evicted.
    idle_threshold: Duration,
    /// Time between sweep cycles.
    interval: Duration,
}

impl IdleSweeper {
    /// Creates a sweeper over the given registries.
    #[must_use]
    pub fn new(
        registry: Arc<SessionRegistry<ProtocolUnit>>,
        tokens: Arc<TokenRegistry>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
        idle_threshold: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            tokens,
            clock,
            audit,
            idle_threshold,
            interval,
        }
    }

    /// Runs one sweep cycle.
    ///
    /// Sessions are closed through [`SessionRegistry::close`] so teardown
    /// follows the same path an operator close takes. A session that
    /// received a request between the idle scan and the close is still
    /// closed; the threshold is measured at scan time.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when a registry lock is poisoned.
    pub fn sweep_once(&self) -> Result<SweepReport, GatewayError> {
        let now = self.clock.now();
        let idle = self.registry.idle_sessions(now, self.idle_threshold)?;
        let mut sessions_swept = 0;
        for session_id in idle {
            let entry = self.registry.get(&session_id)?;
            if self.registry.close(&session_id)? {
                sessions_swept += 1;
                let mut event =
                    SessionAuditEvent::new(SessionAction::Swept, session_id.as_str(), now);
                if let Some(entry) = entry {
                    event = event
                        .with_request_count(entry.request_count())
                        .with_idle_ms(now.since(entry.last_activity()).as_millis());
                }
                self.audit.record_session(&event);
            }
        }
        let tokens_swept = self.tokens.sweep_expired(now)?;
        Ok(SweepReport {
            sessions_swept,
            tokens_swept,
        })
    }

    /// Records a failed sweep cycle to the audit sink.
    ///
    /// A persistently failing sweep means eviction has stopped; the trail
    /// is the only signal an operator gets.
    fn record_failure(&self, error: &GatewayError) {
        self.audit.record_sweep_failure(&SweepFailureEvent::new(
            error.to_string(),
            self.clock.now(),
        ));
    }

    /// Spawns the periodic sweep loop on the current runtime.
    ///
    /// A failed cycle is recorded to the audit sink and does not stop
    /// future cycles.
    #[must_use]
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let period = std::time::Duration::from_millis(
            u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
        );
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick fires immediately; skip it so a fresh gateway
            // does not sweep before anything can be idle.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(error) = self.sweep_once() {
                    self.record_failure(&error);
                }
            }
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
