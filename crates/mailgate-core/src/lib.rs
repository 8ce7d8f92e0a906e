// crates/mailgate-core/src/lib.rs
// ============================================================================
// Module: Mailgate Core
// Description: Deterministic session, token, and context state for Mailgate.
// Purpose: Provide the tenant-isolation state machine shared by all transports.
// Dependencies: serde, thiserror, rand, sha2, tokio
// ============================================================================

//! ## Overview
//! Mailgate Core owns the authoritative tables for tenant sessions, bearer
//! tokens, and mail credentials, plus the ambient request-context carrier
//! that keeps responses bound to the connection that produced the matching
//! request. The core never reads wall-clock time directly; hosts supply
//! explicit [`Timestamp`] values so expiry logic stays deterministic and
//! replayable under test.
//!
//! ## Layer Responsibilities
//! - Create, look up, and destroy one isolated protocol unit per tenant.
//! - Carry tenant identity across await boundaries via task-local context.
//! - Issue and validate time-limited bearer tokens (fail closed).
//!
//! ## Invariants
//! - Every shared-table mutation is a single atomic map operation; no
//!   read-modify-write ever spans a suspension point.
//! - Per-tenant state is only reachable through that tenant's session entry.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod context;
pub mod credentials;
pub mod error;
pub mod identifiers;
pub mod interfaces;
pub mod registry;
pub mod time;
pub mod token;


// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use context::ContextSnapshot;
pub use context::RequestContext;
pub use context::current_request_context;
pub use context::with_request_context;
pub use credentials::CredentialRecord;
pub use credentials::CredentialStore;
pub use credentials::MailCredentials;
pub use error::GatewayError;
pub use identifiers::AuthIdentity;
pub use identifiers::OperationName;
pub use identifiers::RequestId;
pub use identifiers::SessionId;
pub use interfaces::AuthFlow;
pub use interfaces::AuthFlowError;
pub use interfaces::AuthStart;
pub use interfaces::DomainError;
pub use interfaces::DomainExecutor;
pub use registry::SessionEntry;
pub use registry::SessionRegistry;
pub use registry::SessionStats;
pub use registry::SessionSummary;
pub use registry::SessionUnit;
pub use time::Duration;
pub use time::Timestamp;
pub use token::DEFAULT_TOKEN_TTL;
pub use token::TokenRegistry;
pub use token::token_fingerprint;
