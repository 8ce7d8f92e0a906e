// crates/mailgate-mcp/src/unit.rs
// ============================================================================
// Module: Protocol Unit
// Description: Per-session handler and transport pair.
// Purpose: Give each tenant an isolated dispatch surface and response channel.
// Dependencies: mailgate-core, tokio, serde_json
// ============================================================================

//! ## Overview
//! Every session owns exactly one [`ProtocolUnit`]: a fresh
//! [`SessionHandler`] with the complete tool catalog registered at
//! construction, paired with a [`SessionTransport`] bound to that session's
//! identifier. Responses travel through per-request oneshot channels keyed
//! by request id, and emission re-applies the context snapshot captured at
//! request entry — the transport refuses to emit when the snapshot's
//! session differs from its own, because that mismatch is exactly the
//! cross-tenant delivery bug this layer exists to prevent.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use mailgate_core::ContextSnapshot;
use mailgate_core::GatewayError;
use mailgate_core::OperationName;
use mailgate_core::RequestId;
use mailgate_core::SessionId;
use mailgate_core::SessionUnit;
use serde_json::Value;
use serde_json::json;
use tokio::sync::oneshot;

use crate::rpc;
use crate::rpc::JsonRpcRequest;
use crate::rpc::JsonRpcResponse;
use crate::tools::ToolRouter;

// ============================================================================
// SECTION: Session Transport
// ============================================================================

/// Response channel bound to exactly one session.
///
/// # Invariants
/// - Emission is refused when the caller's context snapshot names a
///   different session; responses never cross transports.
/// - After teardown no new request can begin and emission fails with
///   [`GatewayError::SessionClosed`].
#[derive(Debug)]
pub struct SessionTransport {
    /// Session this transport belongs to.
    session_id: SessionId,
    /// In-flight requests awaiting their response.
    pending: Mutex<BTreeMap<RequestId, oneshot::Sender<JsonRpcResponse>>>,
    /// Set once by teardown; never cleared.
    closed: AtomicBool,
}

impl SessionTransport {
    /// Creates a transport bound to `session_id`.
    #[must_use]
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            pending: Mutex::new(BTreeMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the session this transport is bound to.
    #[must_use]
    pub const fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Returns whether the transport has been torn down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Registers an in-flight request and returns its response receiver.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::SessionClosed`] after teardown,
    /// [`GatewayError::InvalidParams`] when the request id is already in
    /// flight, and [`GatewayError::Internal`] when the lock is poisoned.
    pub fn begin(
        &self,
        request_id: RequestId,
    ) -> Result<oneshot::Receiver<JsonRpcResponse>, GatewayError> {
        if self.is_closed() {
            return Err(GatewayError::SessionClosed {
                session_id: self.session_id.to_string(),
            });
        }
        let (sender, receiver) = oneshot::channel();
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| GatewayError::Internal("transport pending lock poisoned".to_string()))?;
        if pending.contains_key(&request_id) {
            return Err(GatewayError::InvalidParams(format!(
                "request id already in flight: {request_id}"
            )));
        }
        pending.insert(request_id, sender);
        Ok(receiver)
    }

    /// Delivers a response to the request named by the snapshot.
    ///
    /// The captured snapshot is re-applied for the duration of delivery;
    /// the ambient value at the moment the emitting continuation resumes is
    /// never consulted.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ContextLost`] when the snapshot's session
    /// does not match this transport, [`GatewayError::SessionClosed`] after
    /// teardown, and [`GatewayError::Internal`] when no in-flight request
    /// matches or the lock is poisoned.
    pub fn emit(
        &self,
        snapshot: &ContextSnapshot,
        response: JsonRpcResponse,
    ) -> Result<(), GatewayError> {
        if snapshot.session_id() != &self.session_id {
            return Err(GatewayError::ContextLost {
                session_id: Some(snapshot.session_id().to_string()),
            });
        }
        snapshot.reenter_sync(|| {
            if self.is_closed() {
                return Err(GatewayError::SessionClosed {
                    session_id: self.session_id.to_string(),
                });
            }
            let sender = {
                let mut pending = self.pending.lock().map_err(|_| {
                    GatewayError::Internal("transport pending lock poisoned".to_string())
                })?;
                pending.remove(snapshot.request_id())
            };
            let Some(sender) = sender else {
                return Err(GatewayError::Internal(format!(
                    "no in-flight request {} on session {}",
                    snapshot.request_id(),
                    self.session_id
                )));
            };
            sender.send(response).map_err(|_| GatewayError::SessionClosed {
                session_id: self.session_id.to_string(),
            })
        })
    }

    /// Drops the in-flight entry for a request that will never emit.
    ///
    /// Called when processing fails before emission so the pending table
    /// does not accumulate dead senders.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the lock is poisoned.
    pub fn cancel(&self, request_id: &RequestId) -> Result<(), GatewayError> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| GatewayError::Internal("transport pending lock poisoned".to_string()))?;
        pending.remove(request_id);
        Ok(())
    }

    /// Tears the transport down. Idempotent.
    ///
    /// Pending senders are dropped so their receivers resolve with a
    /// channel error rather than hanging.
    pub fn teardown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Ok(mut pending) = self.pending.lock() {
            pending.clear();
        }
    }

    /// Returns the number of in-flight requests.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the lock is poisoned.
    pub fn pending_count(&self) -> Result<usize, GatewayError> {
        let pending = self
            .pending
            .lock()
            .map_err(|_| GatewayError::Internal("transport pending lock poisoned".to_string()))?;
        Ok(pending.len())
    }
}

// ============================================================================
// SECTION: Session Handler
// ============================================================================

/// Per-session JSON-RPC method dispatcher.
///
/// # Invariants
/// - The complete tool catalog is registered at construction; there is no
///   window where discovery and invocation disagree.
pub struct SessionHandler {
    /// Shared tool dispatcher.
    router: Arc<ToolRouter>,
}

impl SessionHandler {
    /// Creates a handler over the shared router.
    #[must_use]
    pub fn new(router: Arc<ToolRouter>) -> Self {
        Self {
            router,
        }
    }

    /// Handles one JSON-RPC request and produces its response envelope.
    ///
    /// Protocol-level failures (unknown method, bad params) become JSON-RPC
    /// error responses here; only transport-level failures propagate as
    /// [`GatewayError`] from the caller.
    pub async fn handle(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        if request.jsonrpc != "2.0" {
            return JsonRpcResponse::failure(
                request.id,
                rpc::CODE_INVALID_REQUEST,
                "unsupported jsonrpc version",
            );
        }
        match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(
                request.id,
                json!({
                    "protocolVersion": rpc::PROTOCOL_VERSION,
                    "capabilities": {"tools": {"listChanged": false}},
                    "serverInfo": {
                        "name": "mailgate",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
            ),
            "ping" => JsonRpcResponse::success(request.id, json!({})),
            "tools/list" => JsonRpcResponse::success(
                request.id,
                json!({"tools": self.router.definitions()}),
            ),
            "tools/call" => self.handle_tool_call(request.id, request.params).await,
            other => JsonRpcResponse::failure(
                request.id,
                rpc::CODE_METHOD_NOT_FOUND,
                format!("unknown method: {other}"),
            ),
        }
    }

    /// Handles `tools/call`: validates the tool name and dispatches.
    async fn handle_tool_call(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let params = params.unwrap_or_else(|| json!({}));
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return JsonRpcResponse::failure(
                id,
                rpc::CODE_INVALID_PARAMS,
                "missing tool name",
            );
        };
        let Some(operation) = OperationName::parse(name) else {
            return JsonRpcResponse::failure(
                id,
                rpc::CODE_INVALID_PARAMS,
                format!("invalid tool name: {name}"),
            );
        };
        if !self.router.contains(&operation) {
            return JsonRpcResponse::failure(
                id,
                rpc::CODE_METHOD_NOT_FOUND,
                format!("unknown tool: {operation}"),
            );
        }
        let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
        match self.router.dispatch(&operation, args).await {
            Ok(result) => {
                let text = result.to_string();
                JsonRpcResponse::success(
                    id,
                    json!({
                        "content": [{"type": "text", "text": text}],
                        "isError": false,
                    }),
                )
            }
            Err(err) => JsonRpcResponse::from_error(id, &err),
        }
    }
}

// ============================================================================
// SECTION: Protocol Unit
// ============================================================================

/// One session's handler and transport, created and destroyed together.
///
/// # Invariants
/// - Construction is atomic from the registry's perspective: the unit is
///   fully assembled before the session becomes resolvable.
pub struct ProtocolUnit {
    /// The session's method dispatcher.
    handler: SessionHandler,
    /// The session's response channel.
    transport: Arc<SessionTransport>,
}

impl ProtocolUnit {
    /// Builds a fresh unit for `session_id` with the complete tool set.
    #[must_use]
    pub fn connect(session_id: &SessionId, router: Arc<ToolRouter>) -> Self {
        Self {
            handler: SessionHandler::new(router),
            transport: Arc::new(SessionTransport::new(session_id.clone())),
        }
    }

    /// Returns the unit's transport.
    #[must_use]
    pub const fn transport(&self) -> &Arc<SessionTransport> {
        &self.transport
    }

    /// Returns the unit's handler.
    #[must_use]
    pub const fn handler(&self) -> &SessionHandler {
        &self.handler
    }

    /// Processes one request end to end under the ambient context.
    ///
    /// The context snapshot is captured before any await so the emission at
    /// the end re-applies exactly the identity this request entered with.
    /// Must run inside [`mailgate_core::with_request_context`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ContextLost`] when no context is ambient and
    /// any transport emission error.
    pub async fn process(&self, request: JsonRpcRequest) -> Result<(), GatewayError> {
        let snapshot = ContextSnapshot::capture()?;
        let response = self.handler.handle(request).await;
        self.transport.emit(&snapshot, response)
    }
}

impl SessionUnit for ProtocolUnit {
    fn teardown(&self) {
        self.transport.teardown();
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
