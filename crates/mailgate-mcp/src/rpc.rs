// crates/mailgate-mcp/src/rpc.rs
// ============================================================================
// Module: JSON-RPC Envelope
// Description: Wire types and error mapping for JSON-RPC 2.0 requests.
// Purpose: Keep envelope handling uniform across handler and transport.
// Dependencies: serde, serde_json, mailgate-core
// ============================================================================

//! ## Overview
//! Wire envelope for the gateway's JSON-RPC 2.0 surface plus the mapping
//! from the gateway error taxonomy to stable JSON-RPC error codes and HTTP
//! statuses. Error codes are part of the wire contract; callers distinguish
//! "never authenticated" from "authentication lapsed" by code, not message.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::http::StatusCode;
use mailgate_core::GatewayError;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Supported MCP protocol revision.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC error code: malformed request envelope.
pub const CODE_INVALID_REQUEST: i64 = -32600;
/// JSON-RPC error code: unknown method or tool.
pub const CODE_METHOD_NOT_FOUND: i64 = -32601;
/// JSON-RPC error code: invalid parameters.
pub const CODE_INVALID_PARAMS: i64 = -32602;
/// JSON-RPC error code: unknown or missing session.
pub const CODE_INVALID_SESSION: i64 = -32001;
/// JSON-RPC error code: no credential and no valid token.
pub const CODE_AUTH_REQUIRED: i64 = -32002;
/// JSON-RPC error code: bearer token expired or invalid.
pub const CODE_TOKEN_INVALID: i64 = -32003;
/// JSON-RPC error code: ambient context lost at emission.
pub const CODE_CONTEXT_LOST: i64 = -32004;
/// JSON-RPC error code: session torn down.
pub const CODE_SESSION_CLOSED: i64 = -32005;
/// JSON-RPC error code: session initialization failed.
pub const CODE_SESSION_INIT: i64 = -32006;
/// JSON-RPC error code: domain operation failure.
pub const CODE_DOMAIN_FAILURE: i64 = -32010;
/// JSON-RPC error code: internal error.
pub const CODE_INTERNAL: i64 = -32050;

// ============================================================================
// SECTION: Envelope Types
// ============================================================================

/// Incoming JSON-RPC request payload.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC protocol version.
    pub jsonrpc: String,
    /// Request identifier.
    pub id: Value,
    /// Method name.
    pub method: String,
    /// Optional parameters payload.
    pub params: Option<Value>,
}

/// JSON-RPC response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC protocol version.
    pub jsonrpc: String,
    /// Request identifier.
    pub id: Value,
    /// Successful result payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload when the request fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Builds a success response.
    #[must_use]
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error response with an explicit code and message.
    #[must_use]
    pub fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }

    /// Builds an error response from a gateway error.
    #[must_use]
    pub fn from_error(id: Value, error: &GatewayError) -> Self {
        Self::failure(id, error_code(error), error.to_string())
    }
}

/// JSON-RPC error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i64,
    /// Human-readable error message.
    pub message: String,
}

// ============================================================================
// SECTION: Error Mapping
// ============================================================================

/// Maps a gateway error to its stable JSON-RPC error code.
#[must_use]
pub const fn error_code(error: &GatewayError) -> i64 {
    match error {
        GatewayError::InvalidSession { .. } => CODE_INVALID_SESSION,
        GatewayError::AuthenticationRequired => CODE_AUTH_REQUIRED,
        GatewayError::TokenExpiredOrInvalid => CODE_TOKEN_INVALID,
        GatewayError::ContextLost { .. } => CODE_CONTEXT_LOST,
        GatewayError::SessionClosed { .. } => CODE_SESSION_CLOSED,
        GatewayError::SessionInit(_) => CODE_SESSION_INIT,
        GatewayError::DomainOperation(_) => CODE_DOMAIN_FAILURE,
        GatewayError::InvalidParams(_) => CODE_INVALID_PARAMS,
        GatewayError::Internal(_) => CODE_INTERNAL,
    }
}

/// Maps a gateway error to the HTTP status of its structured response.
#[must_use]
pub const fn http_status(error: &GatewayError) -> StatusCode {
    match error {
        GatewayError::InvalidSession {
            session_id: Some(_),
        } => StatusCode::NOT_FOUND,
        GatewayError::InvalidSession {
            session_id: None,
        }
        | GatewayError::InvalidParams(_) => StatusCode::BAD_REQUEST,
        GatewayError::AuthenticationRequired | GatewayError::TokenExpiredOrInvalid => {
            StatusCode::UNAUTHORIZED
        }
        GatewayError::ContextLost { .. }
        | GatewayError::SessionInit(_)
        | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        GatewayError::SessionClosed { .. } => StatusCode::CONFLICT,
        GatewayError::DomainOperation(_) => StatusCode::OK,
    }
}
