//! Server side of the streamable HTTP transport.
//!
//! One axum route serves three methods. POST carries client messages in;
//! replies travel back either over a per-POST SSE stream or, in JSON mode,
//! as one buffered JSON body. GET opens the standalone stream for
//! server-initiated traffic. DELETE ends the session. Everything else is
//! answered 405 by the method router.
//!
//! The transport hosts one session. Its id is minted when a POST carrying
//! `initialize` arrives and discarded again if the engine rejects the
//! handshake; every later request must echo the id or is turned away
//! before the engine sees it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use fluxmcp_protocol::jsonrpc::{self, DecodeError, JsonRpcResponse};
use fluxmcp_protocol::{JsonRpcMessage, McpError, RequestId};

use crate::callbacks::{EventSink, TransportCallbacks};
use crate::error::{TransportError, TransportResult};
use crate::message::{AuthInfo, SendOptions};
use crate::traits::Transport;

use super::events::EventStore;
use super::session::{OutboundEvent, SessionId, StreamKey, StreamTables};
use super::{DEFAULT_PATH, LAST_EVENT_ID_HEADER, SESSION_ID_HEADER};

/// The standalone GET stream logs its events under this key.
const STANDALONE_STREAM: StreamKey = 0;

/// Outcome of an auth-gate check that turned a request away.
#[derive(Debug, Clone)]
pub struct AuthDenied {
    /// 401 or 403.
    pub status: u16,
    /// Value for the `WWW-Authenticate` response header.
    pub challenge: String,
    /// Human-readable detail.
    pub message: String,
}

/// Hook consulted for every POST before its messages reach the engine.
///
/// `methods` lists every method name in the body. Public methods never
/// reach the gate; see the server engine for the policy.
#[async_trait]
pub trait HttpAuthGate: Send + Sync {
    /// Authorize the batch, returning auth metadata enriched with the
    /// validated identity.
    async fn authorize(&self, methods: &[&str], auth: &AuthInfo) -> Result<AuthInfo, AuthDenied>;
}

/// Configuration for [`StreamableHttpServer`].
#[derive(Debug, Clone)]
pub struct StreamableHttpServerConfig {
    /// Address `start` binds, e.g. `127.0.0.1:3000`.
    pub bind_addr: String,
    /// Endpoint path.
    pub path: String,
    /// Mint and enforce `Mcp-Session-Id`. When false the header is
    /// neither emitted nor checked.
    pub session_tracking: bool,
    /// Buffer request replies into one JSON body instead of streaming SSE.
    pub json_response: bool,
    /// SSE keep-alive interval.
    pub keep_alive: Duration,
}

impl Default for StreamableHttpServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            path: DEFAULT_PATH.to_string(),
            session_tracking: true,
            json_response: false,
            keep_alive: Duration::from_secs(30),
        }
    }
}

struct JsonCollector {
    replies: Vec<Value>,
    done: Option<oneshot::Sender<Vec<Value>>>,
}

struct HttpState {
    config: StreamableHttpServerConfig,
    sink: StdMutex<Option<EventSink>>,
    session: StdMutex<Option<SessionId>>,
    pending_initialize: StdMutex<Option<RequestId>>,
    terminated: AtomicBool,
    streams: StdMutex<StreamTables>,
    standalone: StdMutex<Option<mpsc::UnboundedSender<OutboundEvent>>>,
    json_collectors: StdMutex<HashMap<StreamKey, JsonCollector>>,
    event_store: Option<Arc<dyn EventStore>>,
    auth_gate: Option<Arc<dyn HttpAuthGate>>,
}

impl HttpState {
    fn sink(&self) -> Option<EventSink> {
        self.sink.lock().expect("sink mutex poisoned").clone()
    }

    fn session(&self) -> Option<SessionId> {
        self.session.lock().expect("session mutex poisoned").clone()
    }
}

/// The streamable HTTP server transport.
pub struct StreamableHttpServer {
    state: Arc<HttpState>,
    callbacks: StdMutex<TransportCallbacks>,
    serve_task: StdMutex<Option<tokio::task::JoinHandle<()>>>,
    bound_addr: StdMutex<Option<SocketAddr>>,
    connected: Arc<AtomicBool>,
}

impl StreamableHttpServer {
    /// Server with the given configuration and no event store.
    pub fn new(config: StreamableHttpServerConfig) -> Self {
        Self::build(config, None, None)
    }

    /// Server whose SSE events are logged to `store` for resumption.
    pub fn with_event_store(
        config: StreamableHttpServerConfig,
        store: Arc<dyn EventStore>,
    ) -> Self {
        Self::build(config, Some(store), None)
    }

    /// Attach an auth gate consulted on every POST.
    pub fn with_auth_gate(mut self, gate: Arc<dyn HttpAuthGate>) -> Self {
        let state = Arc::get_mut(&mut self.state)
            .expect("auth gate must be attached before the server is shared");
        state.auth_gate = Some(gate);
        self
    }

    fn build(
        config: StreamableHttpServerConfig,
        event_store: Option<Arc<dyn EventStore>>,
        auth_gate: Option<Arc<dyn HttpAuthGate>>,
    ) -> Self {
        Self {
            state: Arc::new(HttpState {
                config,
                sink: StdMutex::new(None),
                session: StdMutex::new(None),
                pending_initialize: StdMutex::new(None),
                terminated: AtomicBool::new(false),
                streams: StdMutex::new(StreamTables::new()),
                standalone: StdMutex::new(None),
                json_collectors: StdMutex::new(HashMap::new()),
                event_store,
                auth_gate,
            }),
            callbacks: StdMutex::new(TransportCallbacks::new()),
            serve_task: StdMutex::new(None),
            bound_addr: StdMutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The axum router serving the endpoint; usable standalone in tests or
    /// nested into a larger application. Installs the callback sink if
    /// `start` has not run yet.
    pub fn router(&self) -> Router {
        if self.state.sink().is_none() {
            self.install_sink();
        }
        Router::new()
            .route(
                &self.state.config.path,
                post(post_handler).get(get_handler).delete(delete_handler),
            )
            .with_state(Arc::clone(&self.state))
    }

    /// The address `start` actually bound, once started.
    pub fn bound_addr(&self) -> Option<SocketAddr> {
        *self.bound_addr.lock().expect("addr mutex poisoned")
    }

    fn install_sink(&self) -> EventSink {
        let callbacks = self
            .callbacks
            .lock()
            .expect("callbacks mutex poisoned")
            .clone();
        let sink = EventSink::new(callbacks);
        *self.state.sink.lock().expect("sink mutex poisoned") = Some(sink.clone());
        sink
    }
}

impl std::fmt::Debug for StreamableHttpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamableHttpServer")
            .field("path", &self.state.config.path)
            .field("connected", &self.is_connected())
            .field("session", &self.state.session())
            .finish()
    }
}

#[async_trait]
impl Transport for StreamableHttpServer {
    fn set_callbacks(&self, callbacks: TransportCallbacks) {
        *self.callbacks.lock().expect("callbacks mutex poisoned") = callbacks;
    }

    async fn start(&self) -> TransportResult<()> {
        if self.is_connected() {
            return Ok(());
        }
        let sink = self.install_sink();

        let listener = tokio::net::TcpListener::bind(&self.state.config.bind_addr)
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        let addr = listener
            .local_addr()
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        *self.bound_addr.lock().expect("addr mutex poisoned") = Some(addr);

        let app = self.router();
        let task_sink = sink.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!(error = %e, "http transport serve loop failed");
                task_sink.error(TransportError::ConnectionLost(e.to_string()));
            }
            task_sink.closed();
        });
        *self.serve_task.lock().expect("serve task mutex poisoned") = Some(handle);

        self.connected.store(true, Ordering::SeqCst);
        sink.connected();
        info!(%addr, path = %self.state.config.path, "streamable http transport listening");
        Ok(())
    }

    async fn stop(&self) -> TransportResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(handle) = self
            .serve_task
            .lock()
            .expect("serve task mutex poisoned")
            .take()
        {
            handle.abort();
        }
        self.state
            .streams
            .lock()
            .expect("streams mutex poisoned")
            .clear();
        self.state
            .standalone
            .lock()
            .expect("standalone mutex poisoned")
            .take();
        if let Some(sink) = self.state.sink() {
            sink.closed();
        }
        *self.state.sink.lock().expect("sink mutex poisoned") = None;
        *self.callbacks.lock().expect("callbacks mutex poisoned") = TransportCallbacks::new();
        debug!("streamable http transport stopped");
        Ok(())
    }

    async fn send(&self, message: JsonRpcMessage, options: SendOptions) -> TransportResult<()> {
        send_via_state(&self.state, message, options).await
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn session_id(&self) -> Option<String> {
        self.state.session().map(|s| s.as_str().to_string())
    }
}

async fn send_via_state(
    state: &HttpState,
    message: JsonRpcMessage,
    options: SendOptions,
) -> TransportResult<()> {
    let data = jsonrpc::encode(&message)?;

    let Some(related) = options.related_request_id else {
        // Standalone traffic. A live response with no related request has
        // no stream to belong to; only the event store may replay one.
        if matches!(message, JsonRpcMessage::Response(_)) {
            warn!("dropping response with no related request id");
            return Err(TransportError::Framing(
                "response sent without a related request id".into(),
            ));
        }
        let event_id = match &state.event_store {
            Some(store) => Some(store.append(STANDALONE_STREAM, data.clone()).await),
            None => None,
        };
        let standalone = state
            .standalone
            .lock()
            .expect("standalone mutex poisoned")
            .clone();
        match standalone {
            Some(tx) if !tx.is_closed() => {
                let _ = tx.send(OutboundEvent { id: event_id, data });
            }
            _ => debug!("no standalone stream; message stored for replay only"),
        }
        return Ok(());
    };

    // Reply path: route to the stream the request is pinned to.
    let stream_key = {
        let streams = state.streams.lock().expect("streams mutex poisoned");
        streams.stream_of(&related)
    };
    let Some(stream_key) = stream_key else {
        warn!(request = %related, "no stream for related request; dropping message");
        return Ok(());
    };

    let event_id = match &state.event_store {
        Some(store) => Some(store.append(stream_key, data.clone()).await),
        None => None,
    };

    let is_reply = match &message {
        JsonRpcMessage::Response(resp) => resp.id.request_id() == Some(&related),
        _ => false,
    };

    // Initialize outcome steers the session id: a rejected handshake
    // discards the optimistically minted id.
    if is_reply {
        let pending = state
            .pending_initialize
            .lock()
            .expect("pending initialize mutex poisoned")
            .take_if(|id| *id == related);
        if pending.is_some()
            && let JsonRpcMessage::Response(resp) = &message
            && !resp.is_success()
        {
            debug!("initialize rejected; discarding minted session id");
            state.session.lock().expect("session mutex poisoned").take();
        }
    }

    let (sender, finished) = {
        let mut streams = state.streams.lock().expect("streams mutex poisoned");
        let sender = streams.sender_for(&related);
        let finished = if is_reply {
            streams.mark_answered(&related)
        } else {
            None
        };
        (sender, finished)
    };

    if let Some(sender) = sender {
        if is_reply {
            let mut collectors = state
                .json_collectors
                .lock()
                .expect("collectors mutex poisoned");
            if let Some(collector) = collectors.get_mut(&stream_key) {
                if let Ok(value) = serde_json::from_str::<Value>(&data) {
                    collector.replies.push(value);
                }
                if finished.is_some()
                    && let Some(collector) = collectors.remove(&stream_key)
                    && let Some(done) = collector.done
                {
                    let _ = done.send(collector.replies);
                }
                return Ok(());
            }
        }
        let _ = sender.send(OutboundEvent { id: event_id, data });
    } else {
        debug!(request = %related, "stream receiver gone; event stored for resumption");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// HTTP handlers
// ---------------------------------------------------------------------------

fn rpc_error_body(status: StatusCode, error: McpError) -> Response {
    let body = JsonRpcResponse::error_detached(error.into());
    (status, Json(body)).into_response()
}

fn extract_auth(headers: &HeaderMap) -> AuthInfo {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(AuthInfo::bearer)
        .unwrap_or_default()
}

/// Check the `Mcp-Session-Id` echo. `exempt` is true for the POST that
/// carries `initialize` itself, which cannot yet know the id.
fn check_session(state: &HttpState, headers: &HeaderMap, exempt: bool) -> Result<(), Response> {
    if !state.config.session_tracking || exempt {
        return Ok(());
    }
    let Some(session) = state.session() else {
        // Nothing minted yet; the engine's lifecycle gate will answer.
        return Ok(());
    };
    match headers.get(SESSION_ID_HEADER).and_then(|v| v.to_str().ok()) {
        None => Err(rpc_error_body(
            StatusCode::BAD_REQUEST,
            McpError::invalid_request("missing Mcp-Session-Id header"),
        )),
        Some(candidate) if candidate != session.as_str() => Err(rpc_error_body(
            StatusCode::NOT_FOUND,
            McpError::invalid_request("unknown session id"),
        )),
        Some(_) => Ok(()),
    }
}

fn session_headers(state: &HttpState) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if state.config.session_tracking
        && let Some(session) = state.session()
        && let Ok(value) = HeaderValue::from_str(session.as_str())
    {
        headers.insert(SESSION_ID_HEADER, value);
    }
    headers
}

fn sse_response(
    state: &HttpState,
    rx: mpsc::UnboundedReceiver<OutboundEvent>,
) -> Response {
    let keep_alive = KeepAlive::new().interval(state.config.keep_alive);
    let headers = session_headers(state);
    let stream = async_stream::stream! {
        let mut rx = rx;
        while let Some(outbound) = rx.recv().await {
            let mut event = Event::default().event("message").data(outbound.data);
            if let Some(id) = outbound.id {
                event = event.id(id.to_string());
            }
            yield Ok::<Event, std::convert::Infallible>(event);
        }
    };
    (
        StatusCode::OK,
        headers,
        Sse::new(stream).keep_alive(keep_alive),
    )
        .into_response()
}

async fn post_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if state.terminated.load(Ordering::SeqCst) {
        return rpc_error_body(
            StatusCode::NOT_FOUND,
            McpError::invalid_request("session terminated"),
        );
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !content_type.starts_with("application/json") {
        return rpc_error_body(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            McpError::invalid_request("Content-Type must be application/json"),
        );
    }

    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !accept.contains("application/json") || !accept.contains("text/event-stream") {
        return rpc_error_body(
            StatusCode::NOT_ACCEPTABLE,
            McpError::invalid_request(
                "Accept must include application/json and text/event-stream",
            ),
        );
    }

    let message = match jsonrpc::decode(&body) {
        Ok(message) => message,
        Err(e @ (DecodeError::InvalidUtf8(_) | DecodeError::Parse(_))) => {
            return rpc_error_body(StatusCode::BAD_REQUEST, McpError::parse(e.to_string()));
        }
        Err(e @ DecodeError::Shape(_)) => {
            return rpc_error_body(
                StatusCode::BAD_REQUEST,
                McpError::invalid_request(e.to_string()),
            );
        }
    };

    let items = message.into_items();
    let initialize_id = items.iter().find_map(|m| match m {
        JsonRpcMessage::Request(r) if r.method == fluxmcp_protocol::methods::INITIALIZE => {
            Some(r.id.clone())
        }
        _ => None,
    });

    if let Err(response) = check_session(&state, &headers, initialize_id.is_some()) {
        return response;
    }

    let mut auth = extract_auth(&headers);
    if let Some(gate) = &state.auth_gate {
        let methods: Vec<&str> = items.iter().filter_map(JsonRpcMessage::method).collect();
        match gate.authorize(&methods, &auth).await {
            Ok(enriched) => auth = enriched,
            Err(denied) => {
                let status =
                    StatusCode::from_u16(denied.status).unwrap_or(StatusCode::UNAUTHORIZED);
                let mut response = rpc_error_body(
                    status,
                    McpError::new(
                        if denied.status == 403 {
                            fluxmcp_protocol::ErrorCode::InsufficientScope
                        } else {
                            fluxmcp_protocol::ErrorCode::Unauthorized
                        },
                        denied.message,
                    ),
                );
                if let Ok(value) = HeaderValue::from_str(&denied.challenge) {
                    response
                        .headers_mut()
                        .insert(header::WWW_AUTHENTICATE, value);
                }
                return response;
            }
        }
    }

    let Some(sink) = state.sink() else {
        return rpc_error_body(
            StatusCode::SERVICE_UNAVAILABLE,
            McpError::internal("transport not started"),
        );
    };

    let request_ids: Vec<RequestId> = items
        .iter()
        .filter_map(|m| match m {
            JsonRpcMessage::Request(r) => Some(r.id.clone()),
            _ => None,
        })
        .collect();

    // Notification/response-only bodies are acknowledged and done.
    if request_ids.is_empty() {
        for item in items {
            sink.message(item, Some(auth.clone()));
        }
        return (StatusCode::ACCEPTED, session_headers(&state)).into_response();
    }

    // Mint the session on first contact with initialize. Rolled back by
    // the send path if the engine rejects the handshake.
    if state.config.session_tracking && initialize_id.is_some() {
        let mut session = state.session.lock().expect("session mutex poisoned");
        if session.is_none() {
            let minted = SessionId::mint();
            debug!(session = %minted, "minted session id");
            *session = Some(minted);
            *state
                .pending_initialize
                .lock()
                .expect("pending initialize mutex poisoned") = initialize_id.clone();
        }
    }

    let single_request = request_ids.len() == 1;
    let (tx, rx) = mpsc::unbounded_channel();
    let stream_key = {
        let mut streams = state.streams.lock().expect("streams mutex poisoned");
        streams.open_stream(tx, request_ids)
    };

    let json_done = if state.config.json_response {
        let (done_tx, done_rx) = oneshot::channel();
        state
            .json_collectors
            .lock()
            .expect("collectors mutex poisoned")
            .insert(
                stream_key,
                JsonCollector {
                    replies: Vec::new(),
                    done: Some(done_tx),
                },
            );
        Some(done_rx)
    } else {
        None
    };

    for item in items {
        sink.message(item, Some(auth.clone()));
    }

    match json_done {
        Some(done_rx) => {
            let Ok(mut replies) = done_rx.await else {
                return rpc_error_body(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    McpError::internal("reply channel dropped"),
                );
            };
            let body = if single_request && replies.len() == 1 {
                replies.pop().unwrap_or(Value::Null)
            } else {
                Value::Array(replies)
            };
            (StatusCode::OK, session_headers(&state), Json(body)).into_response()
        }
        None => sse_response(&state, rx),
    }
}

async fn get_handler(State(state): State<Arc<HttpState>>, headers: HeaderMap) -> Response {
    if state.terminated.load(Ordering::SeqCst) {
        return rpc_error_body(
            StatusCode::NOT_FOUND,
            McpError::invalid_request("session terminated"),
        );
    }

    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !accept.contains("text/event-stream") {
        return rpc_error_body(
            StatusCode::NOT_ACCEPTABLE,
            McpError::invalid_request("Accept must include text/event-stream"),
        );
    }

    if let Err(response) = check_session(&state, &headers, false) {
        return response;
    }

    let (tx, rx) = mpsc::unbounded_channel();
    {
        let mut standalone = state.standalone.lock().expect("standalone mutex poisoned");
        // A dead sender means the previous client went away; replace it.
        if standalone.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return rpc_error_body(
                StatusCode::CONFLICT,
                McpError::invalid_request("standalone stream already open for this session"),
            );
        }
        *standalone = Some(tx.clone());
    }

    // Replay missed events before going live.
    let last_event_id = headers
        .get(LAST_EVENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if let (Some(after), Some(store)) = (last_event_id, &state.event_store) {
        let events = store.replay_after(after).await;
        debug!(after, count = events.len(), "replaying stored events");
        for event in events {
            let _ = tx.send(OutboundEvent {
                id: Some(event.id),
                data: event.data,
            });
        }
    }

    sse_response(&state, rx)
}

async fn delete_handler(State(state): State<Arc<HttpState>>, headers: HeaderMap) -> Response {
    if state.terminated.load(Ordering::SeqCst) {
        return rpc_error_body(
            StatusCode::NOT_FOUND,
            McpError::invalid_request("session terminated"),
        );
    }
    if let Err(response) = check_session(&state, &headers, false) {
        return response;
    }

    info!("session terminated by client");
    state.terminated.store(true, Ordering::SeqCst);
    state
        .streams
        .lock()
        .expect("streams mutex poisoned")
        .clear();
    state
        .standalone
        .lock()
        .expect("standalone mutex poisoned")
        .take();
    state.session.lock().expect("session mutex poisoned").take();
    if let Some(sink) = state.sink() {
        sink.closed();
    }
    StatusCode::NO_CONTENT.into_response()
}
