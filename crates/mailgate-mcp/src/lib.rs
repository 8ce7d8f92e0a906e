// crates/mailgate-mcp/src/lib.rs
// ============================================================================
// Module: Mailgate MCP
// Description: MCP transport layer with per-session isolation for Mailgate.
// Purpose: Expose mail tools over JSON-RPC with strict tenant separation.
// Dependencies: mailgate-core, mailgate-config, axum, tokio
// ============================================================================

//! ## Overview
//! Mailgate MCP serves many unrelated callers from one process. Each caller
//! gets its own protocol unit (a fresh handler bound to a fresh transport),
//! resolved through the session registry on every request, and every
//! request's asynchronous lifetime carries an ambient identity snapshot so
//! the response lands on the connection that produced the matching request.
//! The bug class this layer exists to prevent is one tenant's result being
//! delivered to another tenant's connection, or never delivered at all.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod clock;
pub mod collab;
pub mod rpc;
pub mod server;
pub mod sweeper;
pub mod telemetry;
pub mod tools;
pub mod unit;


// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditSink;
pub use audit::ContextAlarmEvent;
pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::RpcAuditEvent;
pub use audit::SessionAuditEvent;
pub use audit::StderrAuditSink;
pub use audit::SweepFailureEvent;
pub use audit::TokenAuditEvent;
pub use clock::Clock;
pub use clock::ManualClock;
pub use clock::SystemClock;
pub use collab::UnconfiguredAuthFlow;
pub use collab::UnconfiguredExecutor;
pub use rpc::JsonRpcError;
pub use rpc::JsonRpcRequest;
pub use rpc::JsonRpcResponse;
pub use rpc::PROTOCOL_VERSION;
pub use server::GatewayServer;
pub use server::GatewayServerError;
pub use server::GatewayState;
pub use server::RpcReply;
pub use server::SESSION_ID_HEADER;
pub use sweeper::DEFAULT_IDLE_THRESHOLD;
pub use sweeper::DEFAULT_SWEEP_INTERVAL;
pub use sweeper::IdleSweeper;
pub use sweeper::SweepReport;
pub use telemetry::Metrics;
pub use telemetry::NoopMetrics;
pub use telemetry::RPC_LATENCY_BUCKETS_MS;
pub use telemetry::RpcMetricEvent;
pub use telemetry::RpcMethod;
pub use telemetry::RpcOutcome;
pub use tools::TOOL_NAMES;
pub use tools::ToolDefinition;
pub use tools::ToolRouter;
pub use unit::ProtocolUnit;
pub use unit::SessionHandler;
pub use unit::SessionTransport;
