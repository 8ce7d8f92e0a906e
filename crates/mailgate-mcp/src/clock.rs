// crates/mailgate-mcp/src/clock.rs
// ============================================================================
// Module: Host Clock
// Description: Wall-clock source supplying timestamps to the core.
// Purpose: Keep the core deterministic; only the host reads real time.
// Dependencies: mailgate-core
// ============================================================================

//! ## Overview
//! The core never reads wall-clock time; every registry operation takes an
//! explicit [`Timestamp`]. This module is where real time enters the
//! process. Tests substitute [`ManualClock`] to drive expiry and sweep
//! decisions deterministically.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use mailgate_core::Duration;
use mailgate_core::Timestamp;

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Timestamp source for the transport layer.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

// ============================================================================
// SECTION: Implementations
// ============================================================================

/// Clock backed by the operating system.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        Timestamp::from_unix_millis(millis)
    }
}

/// Hand-driven clock for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    /// Current time in unix millis.
    millis: AtomicI64,
}

impl ManualClock {
    /// Creates a clock starting at the given time.
    #[must_use]
    pub fn starting_at(start: Timestamp) -> Self {
        Self {
            millis: AtomicI64::new(start.as_unix_millis()),
        }
    }

    /// Sets the clock to an absolute time.
    pub fn set(&self, now: Timestamp) {
        self.millis.store(now.as_unix_millis(), Ordering::SeqCst);
    }

    /// Advances the clock by a duration.
    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.as_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_unix_millis(self.millis.load(Ordering::SeqCst))
    }
}
