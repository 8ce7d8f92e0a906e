// crates/mailgate-mcp/src/server.rs
// ============================================================================
// Module: Gateway Server
// Description: Axum HTTP/SSE front end over the session registry.
// Purpose: Resolve sessions, establish ambient context, and route JSON-RPC.
// Dependencies: axum, tokio, mailgate-core, mailgate-config
// ============================================================================

//! ## Overview
//! One `/mcp` endpoint serves every tenant. Each request is resolved against
//! the session registry via the `Mcp-Session-Id` header, optionally elevated
//! by a validated bearer token, and then executed inside an ambient request
//! context established for exactly the duration of that request's
//! asynchronous graph. Operator surfaces (`/healthz`, `/stats`,
//! `DELETE /sessions/{id}`) sit beside it. Inputs are untrusted; every
//! resolution failure is fail-closed and mapped to a stable JSON-RPC error
//! code.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::http::header;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::response::Sse;
use axum::response::sse::Event;
use axum::routing::any;
use axum::routing::delete;
use axum::routing::get;
use bytes::Bytes;
use mailgate_config::MailgateConfig;
use mailgate_core::AuthFlow;
use mailgate_core::CredentialStore;
use mailgate_core::DomainExecutor;
use mailgate_core::Duration;
use mailgate_core::GatewayError;
use mailgate_core::RequestContext;
use mailgate_core::RequestId;
use mailgate_core::SessionId;
use mailgate_core::SessionRegistry;
use mailgate_core::TokenRegistry;
use mailgate_core::token_fingerprint;
use mailgate_core::with_request_context;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use tokio_stream::wrappers::ReceiverStream;

use crate::audit::AuditSink;
use crate::audit::ContextAlarmEvent;
use crate::audit::RpcAuditEvent;
use crate::audit::SessionAction;
use crate::audit::SessionAuditEvent;
use crate::audit::TokenAuditEvent;
use crate::clock::Clock;
use crate::rpc;
use crate::rpc::JsonRpcRequest;
use crate::rpc::JsonRpcResponse;
use crate::sweeper::IdleSweeper;
use crate::telemetry::Metrics;
use crate::telemetry::RpcMetricEvent;
use crate::telemetry::RpcMethod;
use crate::telemetry::RpcOutcome;
use crate::tools::ToolRouter;
use crate::unit::ProtocolUnit;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header carrying the session identifier on requests and responses.
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Gateway server errors.
#[derive(Debug, Error)]
pub enum GatewayServerError {
    /// Configuration rejected at startup.
    #[error("configuration invalid: {0}")]
    Config(String),
    /// Listener could not bind.
    #[error("bind failed: {0}")]
    Bind(String),
    /// Serving loop failed.
    #[error("transport failed: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: State
// ============================================================================

/// Shared state behind every handler.
pub struct GatewayState {
    /// Authoritative session table.
    registry: Arc<SessionRegistry<ProtocolUnit>>,
    /// Per-tenant credential records.
    credentials: Arc<CredentialStore>,
    /// Bearer token registry.
    tokens: Arc<TokenRegistry>,
    /// Shared tool dispatcher.
    router: Arc<ToolRouter>,
    /// Wall-clock source.
    clock: Arc<dyn Clock>,
    /// Audit sink.
    audit: Arc<dyn AuditSink>,
    /// Metrics sink.
    metrics: Arc<dyn Metrics>,
    /// Maximum allowed request body size.
    max_body_bytes: usize,
}

/// Outcome of one dispatched JSON-RPC request.
#[derive(Debug)]
pub struct RpcReply {
    /// HTTP status for the reply.
    pub status: StatusCode,
    /// JSON-RPC response envelope.
    pub response: JsonRpcResponse,
    /// Session the request resolved to, when resolution succeeded.
    pub session_id: Option<String>,
    /// Whether this request minted a new session.
    pub created: bool,
}

impl RpcReply {
    /// Builds a reply from a gateway error.
    ///
    /// `created` survives into the reply so an `initialize` that mints a
    /// session and then fails (for example on bearer validation) still
    /// tells the caller the session id it holds.
    fn from_error(
        id: Value,
        error: &GatewayError,
        session_id: Option<String>,
        created: bool,
    ) -> Self {
        Self {
            status: rpc::http_status(error),
            response: JsonRpcResponse::from_error(id, error),
            session_id,
            created,
        }
    }
}

impl GatewayState {
    /// Assembles gateway state from configuration and collaborators.
    #[must_use]
    pub fn new(
        config: &MailgateConfig,
        auth_flow: Arc<dyn AuthFlow>,
        executor: Arc<dyn DomainExecutor>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
        metrics: Arc<dyn Metrics>,
    ) -> Self {
        let credentials = Arc::new(CredentialStore::new());
        let tokens = Arc::new(TokenRegistry::new(Duration::from_secs(
            config.session.token_ttl_secs,
        )));
        let router = Arc::new(ToolRouter::new(
            Arc::clone(&credentials),
            Arc::clone(&tokens),
            auth_flow,
            executor,
            Arc::clone(&clock),
            Arc::clone(&audit),
        ));
        Self {
            registry: Arc::new(SessionRegistry::new()),
            credentials,
            tokens,
            router,
            clock,
            audit,
            metrics,
            max_body_bytes: config.server.max_body_bytes,
        }
    }

    /// Returns the session registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<SessionRegistry<ProtocolUnit>> {
        &self.registry
    }

    /// Returns the credential store.
    #[must_use]
    pub const fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// Returns the token registry.
    #[must_use]
    pub const fn tokens(&self) -> &Arc<TokenRegistry> {
        &self.tokens
    }

    /// Dispatches one JSON-RPC request end to end.
    ///
    /// This is the full request path the `/mcp` handler wraps: body limit,
    /// envelope parse, session resolution, bearer elevation, ambient
    /// context establishment, unit processing, and correlated response
    /// receipt. Integration tests drive it directly.
    pub async fn dispatch(
        &self,
        session_header: Option<&str>,
        bearer: Option<&str>,
        body: &[u8],
    ) -> RpcReply {
        let started = Instant::now();
        if body.len() > self.max_body_bytes {
            let reply = RpcReply {
                status: StatusCode::PAYLOAD_TOO_LARGE,
                response: JsonRpcResponse::failure(
                    Value::Null,
                    rpc::CODE_INVALID_REQUEST,
                    "request body too large",
                ),
                session_id: None,
                created: false,
            };
            self.record_request(&reply, RpcMethod::Invalid, None, body.len(), started);
            return reply;
        }
        let Ok(request) = serde_json::from_slice::<JsonRpcRequest>(body) else {
            let reply = RpcReply {
                status: StatusCode::BAD_REQUEST,
                response: JsonRpcResponse::failure(
                    Value::Null,
                    rpc::CODE_INVALID_REQUEST,
                    "malformed json-rpc request",
                ),
                session_id: None,
                created: false,
            };
            self.record_request(&reply, RpcMethod::Invalid, None, body.len(), started);
            return reply;
        };
        let method = RpcMethod::classify(&request.method);
        let tool = request
            .params
            .as_ref()
            .and_then(|params| params.get("name"))
            .and_then(Value::as_str)
            .filter(|_| method == RpcMethod::ToolsCall)
            .map(str::to_string);
        let reply = self.dispatch_request(session_header, bearer, request).await;
        self.record_request(&reply, method, tool, body.len(), started);
        reply
    }

    /// Resolution and processing for one parsed request.
    async fn dispatch_request(
        &self,
        session_header: Option<&str>,
        bearer: Option<&str>,
        request: JsonRpcRequest,
    ) -> RpcReply {
        let request_id_value = request.id.clone();
        let is_initialization = request.method == "initialize";
        let now = self.clock.now();

        // Session resolution. A presented id must parse before lookup.
        let presented = match session_header {
            None => None,
            Some(raw) => match SessionId::parse(raw) {
                Some(session_id) => Some(session_id),
                None => {
                    let error = GatewayError::InvalidSession {
                        session_id: Some(raw.to_string()),
                    };
                    return RpcReply {
                        status: StatusCode::BAD_REQUEST,
                        response: JsonRpcResponse::from_error(request_id_value, &error),
                        session_id: None,
                        created: false,
                    };
                }
            },
        };
        let resolved = self.registry.resolve_or_create(
            presented.as_ref(),
            is_initialization,
            now,
            |session_id, _| Ok(ProtocolUnit::connect(session_id, Arc::clone(&self.router))),
        );
        let (entry, created) = match resolved {
            Ok(resolved) => resolved,
            Err(error) => return RpcReply::from_error(request_id_value, &error, None, false),
        };
        let session_id = entry.session_id().to_string();
        if created {
            self.audit.record_session(&SessionAuditEvent::new(
                SessionAction::Created,
                &session_id,
                now,
            ));
        }

        // Bearer elevation. A valid token may attach this request to a
        // mailbox identity other than the session's own; validation failure
        // is terminal for the request.
        let auth_identity = match bearer {
            None => entry.auth_identity().clone(),
            Some(token) => match self.tokens.validate(token, now, &self.credentials) {
                Ok(identity) => {
                    self.audit.record_token(&TokenAuditEvent::allowed(
                        token_fingerprint(token),
                        identity.as_str(),
                        now,
                    ));
                    identity
                }
                Err(error) => {
                    self.audit.record_token(&TokenAuditEvent::denied(
                        token_fingerprint(token),
                        error.code(),
                        now,
                    ));
                    return RpcReply::from_error(request_id_value, &error, Some(session_id), created);
                }
            },
        };

        let request_id = RequestId::new(match &request.id {
            Value::String(id) => id.clone(),
            other => other.to_string(),
        });
        let receiver = match entry.unit().transport().begin(request_id.clone()) {
            Ok(receiver) => receiver,
            Err(error) => {
                return RpcReply::from_error(request_id_value, &error, Some(session_id), created);
            }
        };

        let context = RequestContext {
            session_id: entry.session_id().clone(),
            auth_identity,
            request_id: request_id.clone(),
            started_at: now,
        };
        let processed = with_request_context(context, entry.unit().process(request)).await;
        if let Err(error) = processed {
            let _ = entry.unit().transport().cancel(&request_id);
            if error.is_correctness_alarm() {
                self.audit.record_context_alarm(&ContextAlarmEvent::new(
                    Some(session_id.clone()),
                    Some(request_id.to_string()),
                    error.to_string(),
                    now,
                ));
            }
            return RpcReply::from_error(request_id_value, &error, Some(session_id), created);
        }

        // The response arrives on this request's own channel; a dropped
        // sender means the session was torn down mid-flight.
        match receiver.await {
            Ok(response) => {
                let status = response
                    .error
                    .as_ref()
                    .map_or(StatusCode::OK, |error| status_for_code(error.code));
                RpcReply {
                    status,
                    response,
                    session_id: Some(session_id),
                    created,
                }
            }
            Err(_) => {
                let error = GatewayError::SessionClosed {
                    session_id: session_id.clone(),
                };
                RpcReply::from_error(request_id_value, &error, Some(session_id), created)
            }
        }
    }

    /// Records the audit event and metrics for one finished request.
    fn record_request(
        &self,
        reply: &RpcReply,
        method: RpcMethod,
        tool: Option<String>,
        request_bytes: usize,
        started: Instant,
    ) {
        let now = self.clock.now();
        let outcome = if reply.response.error.is_some() {
            RpcOutcome::Error
        } else {
            RpcOutcome::Ok
        };
        let response_bytes = serde_json::to_vec(&reply.response).map_or(0, |buf| buf.len());
        let error_code = reply.response.error.as_ref().map(|error| error.code);
        let event = RpcMetricEvent {
            method,
            tool: tool.clone(),
            outcome,
            error_code,
            request_bytes,
            response_bytes,
        };
        self.metrics.record_request(event.clone());
        self.metrics.record_latency(event, started.elapsed());
        self.audit.record_rpc(&RpcAuditEvent {
            event: "rpc_request",
            timestamp_ms: now.as_unix_millis(),
            session_id: reply.session_id.clone(),
            request_id: match &reply.response.id {
                Value::Null => None,
                Value::String(id) => Some(id.clone()),
                other => Some(other.to_string()),
            },
            method,
            tool,
            outcome,
            error_code,
            error_kind: None,
            request_bytes,
            response_bytes,
        });
    }
}

/// Maps an in-band JSON-RPC error code to its HTTP status.
const fn status_for_code(code: i64) -> StatusCode {
    match code {
        rpc::CODE_INVALID_REQUEST | rpc::CODE_METHOD_NOT_FOUND | rpc::CODE_INVALID_PARAMS => {
            StatusCode::BAD_REQUEST
        }
        rpc::CODE_AUTH_REQUIRED | rpc::CODE_TOKEN_INVALID => StatusCode::UNAUTHORIZED,
        rpc::CODE_CONTEXT_LOST | rpc::CODE_SESSION_INIT | rpc::CODE_INTERNAL => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        rpc::CODE_SESSION_CLOSED => StatusCode::CONFLICT,
        rpc::CODE_INVALID_SESSION => StatusCode::NOT_FOUND,
        _ => StatusCode::OK,
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// Gateway server: configuration plus assembled state.
pub struct GatewayServer {
    /// Validated configuration.
    config: MailgateConfig,
    /// Shared handler state.
    state: Arc<GatewayState>,
}

impl GatewayServer {
    /// Builds a server from configuration and collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayServerError::Config`] when validation fails.
    pub fn new(
        config: MailgateConfig,
        auth_flow: Arc<dyn AuthFlow>,
        executor: Arc<dyn DomainExecutor>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
        metrics: Arc<dyn Metrics>,
    ) -> Result<Self, GatewayServerError> {
        config
            .validate()
            .map_err(|err| GatewayServerError::Config(err.to_string()))?;
        let state = Arc::new(GatewayState::new(
            &config, auth_flow, executor, clock, audit, metrics,
        ));
        Ok(Self {
            config,
            state,
        })
    }

    /// Returns the shared state.
    #[must_use]
    pub const fn state(&self) -> &Arc<GatewayState> {
        &self.state
    }

    /// Builds the axum application router.
    ///
    /// `/mcp` accepts every verb so a misdirected GET or DELETE gets a
    /// structured protocol error instead of a bare 405.
    #[must_use]
    pub fn app(&self) -> Router {
        Router::new()
            .route("/mcp", any(handle_mcp))
            .route("/healthz", get(handle_healthz))
            .route("/stats", get(handle_stats))
            .route("/sessions/{id}", delete(handle_close_session))
            .with_state(Arc::clone(&self.state))
    }

    /// Spawns the idle sweeper for this server's registries.
    #[must_use]
    pub fn spawn_sweeper(&self, clock: Arc<dyn Clock>) -> tokio::task::JoinHandle<()> {
        let sweeper = Arc::new(IdleSweeper::new(
            Arc::clone(&self.state.registry),
            Arc::clone(&self.state.tokens),
            clock,
            Arc::clone(&self.state.audit),
            Duration::from_secs(self.config.session.idle_threshold_secs),
            Duration::from_secs(self.config.session.sweep_interval_secs),
        ));
        sweeper.spawn()
    }

    /// Binds the listener and serves until the process exits.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayServerError`] when the bind address is invalid, the
    /// listener cannot bind, or the serving loop fails.
    pub async fn serve(self) -> Result<(), GatewayServerError> {
        let addr = self
            .config
            .bind_addr()
            .map_err(|err| GatewayServerError::Config(err.to_string()))?;
        let _sweeper = self.spawn_sweeper(Arc::clone(&self.state.clock));
        let app = self.app();
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|err| GatewayServerError::Bind(err.to_string()))?;
        axum::serve(listener, app)
            .await
            .map_err(|err| GatewayServerError::Transport(err.to_string()))
    }
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Handles JSON-RPC requests on the `/mcp` endpoint.
async fn handle_mcp(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let session_header = headers
        .get(SESSION_ID_HEADER)
        .and_then(|value| value.to_str().ok());
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    let wants_sse = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains("text/event-stream"));
    let reply = state.dispatch(session_header, bearer, &body).await;

    let session_header_value = reply
        .created
        .then(|| reply.session_id.as_deref().and_then(|id| HeaderValue::from_str(id).ok()))
        .flatten();
    let mut response = if wants_sse {
        sse_response(&reply.response)
    } else {
        (reply.status, axum::Json(reply.response)).into_response()
    };
    if let Some(value) = session_header_value {
        response.headers_mut().insert(SESSION_ID_HEADER, value);
    }
    response
}

/// Wraps one JSON-RPC response as a single SSE event.
fn sse_response(response: &JsonRpcResponse) -> Response {
    let payload = serde_json::to_string(response).unwrap_or_else(|_| {
        "{\"jsonrpc\":\"2.0\",\"id\":null,\"error\":{\"code\":-32050,\"message\":\"serialization \
         failed\"}}"
            .to_string()
    });
    let (tx, rx) = tokio::sync::mpsc::channel::<Result<Event, Infallible>>(1);
    let _ = tx.try_send(Ok(Event::default().data(payload)));
    Sse::new(ReceiverStream::new(rx)).into_response()
}

/// Liveness probe.
async fn handle_healthz() -> Response {
    (StatusCode::OK, axum::Json(json!({"status": "ok"}))).into_response()
}

/// Read-only registry statistics.
async fn handle_stats(State(state): State<Arc<GatewayState>>) -> Response {
    let now = state.clock.now();
    match state.registry.stats(now) {
        Ok(stats) => (StatusCode::OK, axum::Json(stats)).into_response(),
        Err(error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(json!({"error": error.to_string()})),
        )
            .into_response(),
    }
}

/// Operator session close. Idempotent; reports whether a session existed.
async fn handle_close_session(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> Response {
    let Some(session_id) = SessionId::parse(&id) else {
        return (
            StatusCode::BAD_REQUEST,
            axum::Json(json!({"error": "invalid session id"})),
        )
            .into_response();
    };
    let now = state.clock.now();
    let entry = state.registry.get(&session_id).ok().flatten();
    match state.registry.close(&session_id) {
        Ok(existed) => {
            if existed {
                let mut event =
                    SessionAuditEvent::new(SessionAction::Closed, session_id.as_str(), now);
                if let Some(entry) = entry {
                    event = event.with_request_count(entry.request_count());
                }
                state.audit.record_session(&event);
            }
            (StatusCode::OK, axum::Json(json!({"closed": existed}))).into_response()
        }
        Err(error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(json!({"error": error.to_string()})),
        )
            .into_response(),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
