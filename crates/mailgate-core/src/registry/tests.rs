// crates/mailgate-core/src/registry/tests.rs
// ============================================================================
// Module: Session Registry Tests
// Description: Unit tests for session creation, resolution, and teardown.
// Purpose: Validate isolation, invalid-session rejection, and idle scans.
// Dependencies: mailgate-core
// ============================================================================

//! ## Overview
//! Validates the registry contract: initialization mints isolated entries,
//! unknown or missing ids fail closed, close is idempotent and tears down
//! the unit exactly once, and idle scans respect the threshold boundary.

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
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use super::SessionRegistry;
use super::SessionUnit;
use crate::error::GatewayError;
use crate::identifiers::SessionId;
use crate::time::Duration;
use crate::time::Timestamp;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Test unit counting teardown calls.
#[derive(Debug, Default)]
struct CountingUnit {
    /// Number of teardown invocations.
    teardowns: Arc<AtomicUsize>,
}

impl SessionUnit for CountingUnit {
    fn teardown(&self) {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// Shorthand for a unix-millis timestamp.
const fn at(millis: i64) -> Timestamp {
    Timestamp::from_unix_millis(millis)
}

// ============================================================================
// SECTION: Creation Tests
// ============================================================================

#[test]
fn initialization_without_id_mints_new_session() {
    let registry = SessionRegistry::<CountingUnit>::new();
    let (entry, is_new) = registry
        .resolve_or_create(None, true, at(1_000), |_, _| Ok(CountingUnit::default()))
        .expect("creation succeeds");
    assert!(is_new);
    assert_eq!(entry.request_count(), 1);
    assert_eq!(entry.created_at(), at(1_000));
    let stats = registry.stats(at(1_000)).expect("stats");
    assert_eq!(stats.count, 1);
}

#[test]
fn concurrent_creations_stay_isolated() {
    let registry = SessionRegistry::<CountingUnit>::new();
    let (a, _) = registry
        .resolve_or_create(None, true, at(1_000), |_, _| Ok(CountingUnit::default()))
        .expect("a created");
    let (b, _) = registry
        .resolve_or_create(None, true, at(1_000), |_, _| Ok(CountingUnit::default()))
        .expect("b created");
    assert_ne!(a.session_id(), b.session_id());
    assert_ne!(a.auth_identity(), b.auth_identity());
}

#[test]
fn failed_unit_construction_registers_nothing() {
    let registry = SessionRegistry::<CountingUnit>::new();
    let result = registry.resolve_or_create(None, true, at(1_000), |_, _| {
        Err(GatewayError::Internal("transport bind failed".to_string()))
    });
    assert!(matches!(result, Err(GatewayError::SessionInit(_))));
    let stats = registry.stats(at(1_000)).expect("stats");
    assert_eq!(stats.count, 0);
}

// ============================================================================
// SECTION: Resolution Tests
// ============================================================================

#[test]
fn known_id_resolves_and_bumps_activity() {
    let registry = SessionRegistry::<CountingUnit>::new();
    let (entry, _) = registry
        .resolve_or_create(None, true, at(1_000), |_, _| Ok(CountingUnit::default()))
        .expect("created");
    let id = entry.session_id().clone();
    let (resolved, is_new) = registry
        .resolve_or_create(Some(&id), false, at(5_000), |_, _| Ok(CountingUnit::default()))
        .expect("resolved");
    assert!(!is_new);
    assert_eq!(resolved.session_id(), &id);
    assert_eq!(resolved.request_count(), 2);
    assert_eq!(resolved.last_activity(), at(5_000));
}

#[test]
fn unknown_id_is_rejected_and_creates_no_entry() {
    let registry = SessionRegistry::<CountingUnit>::new();
    let fabricated = SessionId::parse("deadbeefdeadbeefdeadbeefdeadbeef").expect("valid form");
    let result = registry.resolve_or_create(Some(&fabricated), false, at(1_000), |_, _| {
        Ok(CountingUnit::default())
    });
    assert!(matches!(result, Err(GatewayError::InvalidSession { session_id: Some(_) })));
    let stats = registry.stats(at(1_000)).expect("stats");
    assert_eq!(stats.count, 0);
}

#[test]
fn missing_id_on_non_initialization_is_rejected() {
    let registry = SessionRegistry::<CountingUnit>::new();
    let result =
        registry.resolve_or_create(None, false, at(1_000), |_, _| Ok(CountingUnit::default()));
    assert!(matches!(result, Err(GatewayError::InvalidSession { session_id: None })));
}

// ============================================================================
// SECTION: Close Tests
// ============================================================================

#[test]
fn close_tears_down_unit_once_and_is_idempotent() {
    let registry = SessionRegistry::<CountingUnit>::new();
    let teardowns = Arc::new(AtomicUsize::new(0));
    let unit_teardowns = Arc::clone(&teardowns);
    let (entry, _) = registry
        .resolve_or_create(None, true, at(1_000), move |_, _| {
            Ok(CountingUnit {
                teardowns: unit_teardowns,
            })
        })
        .expect("created");
    let id = entry.session_id().clone();
    assert!(registry.close(&id).expect("first close"));
    assert_eq!(teardowns.load(Ordering::SeqCst), 1);
    assert!(!registry.close(&id).expect("second close"));
    assert_eq!(teardowns.load(Ordering::SeqCst), 1);
    let result =
        registry.resolve_or_create(Some(&id), false, at(2_000), |_, _| Ok(CountingUnit::default()));
    assert!(matches!(result, Err(GatewayError::InvalidSession { .. })));
}

// ============================================================================
// SECTION: Idle Scan Tests
// ============================================================================

#[test]
fn idle_scan_respects_threshold_boundary() {
    let registry = SessionRegistry::<CountingUnit>::new();
    let threshold = Duration::from_secs(3_600);
    let (idle, _) = registry
        .resolve_or_create(None, true, at(0), |_, _| Ok(CountingUnit::default()))
        .expect("idle created");
    let (active, _) = registry
        .resolve_or_create(None, true, at(0), |_, _| Ok(CountingUnit::default()))
        .expect("active created");
    // Touch the active session just inside the threshold.
    active.touch(at(10_000));
    let now = at(threshold.as_millis() + 5_000);
    let evictable = registry.idle_sessions(now, threshold).expect("scan");
    assert_eq!(evictable, vec![idle.session_id().clone()]);
    // Exactly at the threshold is not yet idle.
    let boundary = at(threshold.as_millis());
    let at_boundary = registry.idle_sessions(boundary, threshold).expect("scan");
    assert!(at_boundary.is_empty());
}

#[test]
fn stats_reports_age_and_idle_per_session() {
    let registry = SessionRegistry::<CountingUnit>::new();
    let (entry, _) = registry
        .resolve_or_create(None, true, at(1_000), |_, _| Ok(CountingUnit::default()))
        .expect("created");
    entry.touch(at(4_000));
    let stats = registry.stats(at(10_000)).expect("stats");
    assert_eq!(stats.count, 1);
    assert_eq!(stats.sessions[0].age_ms, 9_000);
    assert_eq!(stats.sessions[0].idle_ms, 6_000);
    assert_eq!(stats.sessions[0].request_count, 2);
}
