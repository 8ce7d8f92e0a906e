// crates/mailgate-core/src/time.rs
// ============================================================================
// Module: Mailgate Time Model
// Description: Canonical timestamp and duration values for expiry decisions.
// Purpose: Provide deterministic, replayable time values across Mailgate records.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Mailgate uses explicit time values supplied by hosts to keep expiry logic
//! deterministic. The core never reads wall-clock time directly; transports
//! pass a [`Timestamp`] into every registry operation, and tests drive the
//! clock by hand.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Time Values
// ============================================================================

/// Canonical timestamp in unix epoch milliseconds.
///
/// # Invariants
/// - Values are explicitly provided by callers; the core never reads
///   wall-clock time. Monotonicity is a caller responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix epoch milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as unix epoch milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns the elapsed duration since `earlier`, saturating at zero.
    #[must_use]
    pub const fn since(self, earlier: Self) -> Duration {
        let delta = self.0.saturating_sub(earlier.0);
        if delta < 0 { Duration::from_millis(0) } else { Duration::from_millis(delta) }
    }

    /// Returns this timestamp advanced by `duration`, saturating on overflow.
    #[must_use]
    pub const fn advanced_by(self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration.as_millis()))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Non-negative duration in milliseconds used for thresholds and ages.
///
/// # Invariants
/// - Always non-negative; construction clamps negative inputs to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Duration(i64);

impl Duration {
    /// Creates a duration from milliseconds, clamping negatives to zero.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        if millis < 0 { Self(0) } else { Self(millis) }
    }

    /// Creates a duration from whole seconds.
    #[must_use]
    pub const fn from_secs(secs: i64) -> Self {
        Self::from_millis(secs.saturating_mul(1_000))
    }

    /// Returns the duration in milliseconds.
    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}
