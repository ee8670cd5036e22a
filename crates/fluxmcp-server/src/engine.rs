//! The per-session protocol engine, server side.
//!
//! One engine serves one session over one transport. Inbound messages are
//! observed in transport-FIFO order by a single pump task; request
//! handlers then run as independent tasks racing a per-request
//! cancellation token, so slow tools never block the wire. The engine
//! exclusively owns the inbound cancellation registry, the outbound
//! pending table, and this session's resource subscription set.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use fluxmcp_protocol::jsonrpc::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use fluxmcp_protocol::schema::SchemaCache;
use fluxmcp_protocol::types::{
    CancelledParams, CreateMessageParams, CreateMessageResult, EmptyResult, Implementation,
    InitializeParams, InitializeResult, ListChangedCapability, ListRootsResult,
    LogLevel, LoggingMessageParams, ProgressParams, ResourceUpdatedParams, ResourcesCapability,
    ServerCapabilities,
};
use fluxmcp_protocol::{
    JsonRpcMessage, McpError, McpResult, RequestId, methods, negotiate_version,
};
use fluxmcp_transport::{AuthInfo, SendOptions, Transport, TransportCallbacks};

use crate::auth_gate::AuthGate;
use crate::error::ServerResult;
use crate::handlers;
use crate::outbound::PendingOutbound;
use crate::registry::Registries;

/// Session-independent server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Identity returned at handshake.
    pub server_info: Implementation,
    /// Usage hints returned at handshake.
    pub instructions: Option<String>,
    /// Page size for every `*/list` method.
    pub page_size: usize,
    /// Default deadline for server-initiated requests.
    pub request_timeout: Duration,
    /// Whether tool-argument validation results are cached.
    pub schema_cache: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_info: Implementation::new("fluxmcp-server", env!("CARGO_PKG_VERSION")),
            instructions: None,
            page_size: crate::registry::DEFAULT_PAGE_SIZE,
            request_timeout: Duration::from_secs(60),
            schema_cache: true,
        }
    }
}

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// No handshake yet; only `initialize` is accepted.
    Uninitialized,
    /// `initialize` is being processed.
    Initializing,
    /// Normal operation.
    Initialized,
    /// `shutdown` in progress.
    ShuttingDown,
    /// Clean end state.
    Shutdown,
    /// The transport failed underneath the session.
    Errored,
}

/// Observer for session life events.
pub type LifecycleCallback = Arc<dyn Fn(Lifecycle) + Send + Sync>;

/// Host callback for an inbound notification's params.
pub type NotificationCallback = Arc<dyn Fn(Option<Value>) + Send + Sync>;

/// The server-side protocol engine for one session.
pub struct SessionEngine {
    pub(crate) config: ServerConfig,
    pub(crate) registries: Arc<Registries>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) auth_gate: Option<Arc<AuthGate>>,
    pub(crate) schema_cache: SchemaCache,

    lifecycle: StdMutex<Lifecycle>,
    negotiated_version: StdMutex<Option<String>>,
    peer_info: StdMutex<Option<Implementation>>,
    initialize_id: StdMutex<Option<RequestId>>,

    /// Set once `notifications/initialized` arrives; unsolicited
    /// notifications are queued until then.
    handshake_confirmed: AtomicBool,
    queued_notifications: StdMutex<Vec<JsonRpcNotification>>,
    pending_list_changed: StdMutex<Vec<&'static str>>,

    inbound_cancels: DashMap<RequestId, CancellationToken>,
    outbound: PendingOutbound,
    progress_observers: DashMap<String, Arc<dyn Fn(ProgressParams) + Send + Sync>>,
    notification_handlers: DashMap<String, Vec<NotificationCallback>>,

    pub(crate) subscriptions: StdMutex<HashSet<String>>,
    pub(crate) log_floor: StdMutex<Option<LogLevel>>,

    on_lifecycle: Option<LifecycleCallback>,
    /// Self-reference for spawning handler tasks.
    weak_self: Weak<Self>,
}

impl SessionEngine {
    /// Wire an engine to `transport` and start it. The transport's
    /// callbacks are installed here; install nothing yourself.
    pub async fn start(
        config: ServerConfig,
        registries: Arc<Registries>,
        auth_gate: Option<Arc<AuthGate>>,
        on_lifecycle: Option<LifecycleCallback>,
        transport: Arc<dyn Transport>,
    ) -> ServerResult<Arc<Self>> {
        let mut pending_list_changed = Vec::new();
        if registries.tools.take_dirty() {
            pending_list_changed.push(methods::NOTIF_TOOLS_LIST_CHANGED);
        }
        if registries.prompts.take_dirty() {
            pending_list_changed.push(methods::NOTIF_PROMPTS_LIST_CHANGED);
        }
        if registries.resources.take_dirty() {
            pending_list_changed.push(methods::NOTIF_RESOURCES_LIST_CHANGED);
        }

        let schema_cache = if config.schema_cache {
            SchemaCache::new()
        } else {
            SchemaCache::disabled()
        };

        let engine = Arc::new_cyclic(|weak_self| Self {
            config,
            registries,
            transport: Arc::clone(&transport),
            auth_gate,
            schema_cache,
            lifecycle: StdMutex::new(Lifecycle::Uninitialized),
            negotiated_version: StdMutex::new(None),
            peer_info: StdMutex::new(None),
            initialize_id: StdMutex::new(None),
            handshake_confirmed: AtomicBool::new(false),
            queued_notifications: StdMutex::new(Vec::new()),
            pending_list_changed: StdMutex::new(pending_list_changed),
            inbound_cancels: DashMap::new(),
            outbound: PendingOutbound::new(),
            progress_observers: DashMap::new(),
            notification_handlers: DashMap::new(),
            subscriptions: StdMutex::new(HashSet::new()),
            log_floor: StdMutex::new(None),
            on_lifecycle,
            weak_self: weak_self.clone(),
        });

        let (inbox_tx, mut inbox_rx) = mpsc::unbounded_channel::<(JsonRpcMessage, Option<AuthInfo>)>();
        {
            // The pump observes messages in transport-FIFO order; request
            // handlers fan out from here as independent tasks.
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                while let Some((message, auth)) = inbox_rx.recv().await {
                    for item in message.into_items() {
                        engine.dispatch_inbound(item, auth.clone()).await;
                    }
                }
            });
        }

        let close_engine = Arc::downgrade(&engine);
        let error_engine = Arc::downgrade(&engine);
        let callbacks = TransportCallbacks::new()
            .on_message(move |message, auth| {
                let _ = inbox_tx.send((message, auth));
            })
            .on_close(move || {
                if let Some(engine) = close_engine.upgrade() {
                    engine.on_transport_closed();
                }
            })
            .on_error(move |e| {
                if let Some(engine) = error_engine.upgrade() {
                    warn!(error = %e, "transport error");
                    if matches!(
                        e,
                        fluxmcp_transport::TransportError::ConnectionLost(_)
                    ) {
                        engine.set_lifecycle(Lifecycle::Errored);
                    }
                }
            });

        transport.set_callbacks(callbacks);
        transport.start().await?;
        Ok(engine)
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Current lifecycle state.
    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.lock().expect("lifecycle mutex poisoned")
    }

    fn set_lifecycle(&self, next: Lifecycle) {
        {
            let mut state = self.lifecycle.lock().expect("lifecycle mutex poisoned");
            if *state == next {
                return;
            }
            trace!(from = ?*state, to = ?next, "session lifecycle");
            *state = next;
        }
        if let Some(callback) = &self.on_lifecycle {
            callback(next);
        }
    }

    /// The protocol version agreed at handshake.
    pub fn negotiated_version(&self) -> Option<String> {
        self.negotiated_version
            .lock()
            .expect("version mutex poisoned")
            .clone()
    }

    /// The peer's identity from handshake.
    pub fn peer_info(&self) -> Option<Implementation> {
        self.peer_info.lock().expect("peer mutex poisoned").clone()
    }

    /// Stop the session: close the transport and fail every waiter.
    pub async fn shutdown(&self) -> ServerResult<()> {
        self.set_lifecycle(Lifecycle::ShuttingDown);
        self.transport.stop().await?;
        self.outbound.fail_all(&McpError::connection_closed());
        self.set_lifecycle(Lifecycle::Shutdown);
        Ok(())
    }

    fn on_transport_closed(&self) {
        let was = self.lifecycle();
        if !matches!(was, Lifecycle::ShuttingDown | Lifecycle::Shutdown) {
            self.set_lifecycle(Lifecycle::Shutdown);
        }
        self.outbound.fail_all(&McpError::connection_closed());
        for entry in self.inbound_cancels.iter() {
            entry.value().cancel();
        }
        self.inbound_cancels.clear();
    }

    // -----------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------

    async fn dispatch_inbound(&self, message: JsonRpcMessage, auth: Option<AuthInfo>) {
        match message {
            JsonRpcMessage::Request(request) => self.dispatch_request(request, auth).await,
            JsonRpcMessage::Notification(notification) => {
                self.dispatch_notification(notification).await;
            }
            JsonRpcMessage::Response(response) => self.dispatch_response(response),
            JsonRpcMessage::Batch(items) => {
                for item in items {
                    Box::pin(self.dispatch_inbound(item, auth.clone())).await;
                }
            }
        }
    }

    async fn dispatch_request(&self, request: JsonRpcRequest, auth: Option<AuthInfo>) {
        if request.method == methods::INITIALIZE {
            self.handle_initialize(request).await;
            return;
        }

        if self.lifecycle() != Lifecycle::Initialized {
            self.send_reply(JsonRpcResponse::error(
                request.id,
                McpError::invalid_request(format!(
                    "received {} before session initialization",
                    request.method
                ))
                .into(),
            ))
            .await;
            return;
        }

        if let Some(gate) = &self.auth_gate {
            let auth = auth.unwrap_or_default();
            if let Err(e) = gate.check(&request.method, &auth).await {
                self.send_reply(JsonRpcResponse::error(request.id, e.into())).await;
                return;
            }
        }

        let Some(engine) = self.weak_self.upgrade() else {
            return;
        };
        let cancel = CancellationToken::new();
        self.inbound_cancels
            .insert(request.id.clone(), cancel.clone());

        tokio::spawn(async move {
            engine.run_request(request, cancel).await;
        });
    }

    /// Race the handler against its cancellation token. A cancelled
    /// request produces no reply at all; a panicking handler produces an
    /// `InternalError` instead of taking the engine down.
    async fn run_request(self: Arc<Self>, request: JsonRpcRequest, cancel: CancellationToken) {
        let id = request.id.clone();
        let method = request.method.clone();

        let handler = tokio::spawn(handlers::dispatch(
            Arc::clone(&self),
            request,
            cancel.clone(),
        ));

        let outcome = tokio::select! {
            () = cancel.cancelled() => {
                debug!(%id, %method, "request cancelled; suppressing reply");
                None
            }
            joined = handler => Some(match joined {
                Ok(result) => result,
                Err(e) if e.is_panic() => {
                    error!(%id, %method, "handler panicked");
                    Err(McpError::internal(format!("handler for {method} panicked")))
                }
                Err(_) => Err(McpError::internal(format!("handler for {method} aborted"))),
            }),
        };

        self.inbound_cancels.remove(&id);

        if let Some(result) = outcome {
            let reply = match result {
                Ok(value) => JsonRpcResponse::result(id, value),
                Err(e) => JsonRpcResponse::error(id, e.into()),
            };
            self.send_reply(reply).await;
        }
    }

    async fn handle_initialize(&self, request: JsonRpcRequest) {
        if self.lifecycle() != Lifecycle::Uninitialized {
            self.send_reply(JsonRpcResponse::error(
                request.id,
                McpError::invalid_request("session is already initialized").into(),
            ))
            .await;
            return;
        }
        self.set_lifecycle(Lifecycle::Initializing);

        let params: InitializeParams =
            match serde_json::from_value(request.params.clone().unwrap_or(Value::Null)) {
                Ok(params) => params,
                Err(e) => {
                    self.set_lifecycle(Lifecycle::Uninitialized);
                    self.send_reply(JsonRpcResponse::error(
                        request.id,
                        McpError::invalid_params(format!("malformed initialize params: {e}"))
                            .into(),
                    ))
                    .await;
                    return;
                }
            };

        let version = match negotiate_version(&params.protocol_version) {
            Ok(version) => version,
            Err(supported) => {
                self.set_lifecycle(Lifecycle::Uninitialized);
                self.send_reply(JsonRpcResponse::error(
                    request.id,
                    McpError::invalid_params(format!(
                        "unsupported protocol version {}",
                        params.protocol_version
                    ))
                    .with_data(serde_json::json!({ "supported_versions": supported }))
                    .into(),
                ))
                .await;
                return;
            }
        };

        *self
            .negotiated_version
            .lock()
            .expect("version mutex poisoned") = Some(version.to_string());
        *self.peer_info.lock().expect("peer mutex poisoned") = Some(params.client_info.clone());
        *self
            .initialize_id
            .lock()
            .expect("initialize id mutex poisoned") = Some(request.id.clone());

        let result = InitializeResult {
            protocol_version: version.to_string(),
            server_info: self.config.server_info.clone(),
            capabilities: self.build_capabilities(),
            instructions: self.config.instructions.clone(),
        };

        debug!(
            client = %params.client_info.name,
            version,
            "handshake complete"
        );
        match serde_json::to_value(result) {
            Ok(value) => {
                self.send_reply(JsonRpcResponse::result(request.id, value)).await;
                self.set_lifecycle(Lifecycle::Initialized);
            }
            Err(e) => {
                self.set_lifecycle(Lifecycle::Errored);
                self.send_reply(JsonRpcResponse::error(
                    request.id,
                    McpError::internal(e.to_string()).into(),
                ))
                .await;
            }
        }
    }

    fn build_capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: (!self.registries.tools.is_empty()).then(ListChangedCapability::announced),
            prompts: (!self.registries.prompts.is_empty()).then(ListChangedCapability::announced),
            resources: (!self.registries.resources.is_empty()).then(|| ResourcesCapability {
                subscribe: Some(true),
                list_changed: Some(true),
            }),
            logging: Some(Default::default()),
            completions: self
                .registries
                .completion_handler()
                .map(|_| Default::default()),
            experimental: None,
        }
    }

    async fn dispatch_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            methods::INITIALIZED => self.on_handshake_confirmed().await,
            methods::NOTIF_CANCELLED => self.on_cancelled(notification.params.as_ref()),
            methods::NOTIF_PROGRESS => self.on_progress(notification.params.as_ref()),
            _ => {}
        }

        let handlers = self
            .notification_handlers
            .get(&notification.method)
            .map(|entry| entry.value().clone());
        match handlers {
            Some(handlers) => {
                for handler in handlers {
                    handler(notification.params.clone());
                }
            }
            None if !is_builtin_notification(&notification.method) => {
                // Unknown notifications are dropped without a reply.
                trace!(method = %notification.method, "discarding unknown notification");
            }
            None => {}
        }
    }

    async fn on_handshake_confirmed(&self) {
        if self.handshake_confirmed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("client confirmed initialization");

        let announcements: Vec<&'static str> = std::mem::take(
            &mut *self
                .pending_list_changed
                .lock()
                .expect("list changed mutex poisoned"),
        );
        for method in announcements {
            self.notify(method, None).await;
        }

        let queued: Vec<JsonRpcNotification> = std::mem::take(
            &mut *self
                .queued_notifications
                .lock()
                .expect("queued notifications poisoned"),
        );
        for notification in queued {
            if let Err(e) = self
                .transport
                .send(notification.into(), SendOptions::default())
                .await
            {
                warn!(error = %e, "failed to flush queued notification");
            }
        }
    }

    fn on_cancelled(&self, params: Option<&Value>) {
        let Some(params) = params else {
            return;
        };
        let Ok(cancelled) = serde_json::from_value::<CancelledParams>(params.clone()) else {
            debug!("malformed cancellation notification");
            return;
        };

        // Cancelling the handshake is explicitly ignored.
        let initialize_id = self
            .initialize_id
            .lock()
            .expect("initialize id mutex poisoned")
            .clone();
        if initialize_id.as_ref() == Some(&cancelled.request_id) {
            debug!("ignoring cancellation of initialize");
            return;
        }

        if let Some(entry) = self.inbound_cancels.get(&cancelled.request_id) {
            debug!(id = %cancelled.request_id, reason = ?cancelled.reason, "cancelling inbound request");
            entry.value().cancel();
            return;
        }

        if self.outbound.contains(&cancelled.request_id) {
            debug!(id = %cancelled.request_id, "peer cancelled our outbound request");
            self.outbound.resolve(
                &cancelled.request_id,
                Err(McpError::cancelled(cancelled.reason.as_deref())),
            );
        }
    }

    fn on_progress(&self, params: Option<&Value>) {
        let Some(params) = params else {
            return;
        };
        let Ok(progress) = serde_json::from_value::<ProgressParams>(params.clone()) else {
            debug!("malformed progress notification");
            return;
        };
        let key = progress_key(&progress.progress_token);
        if let Some(observer) = self.progress_observers.get(&key) {
            observer.value()(progress);
        }
    }

    fn dispatch_response(&self, response: JsonRpcResponse) {
        let Some(id) = response.id.request_id().cloned() else {
            debug!("dropping response with null id");
            return;
        };
        let outcome = match (response.ok(), response.err()) {
            (Some(result), _) => Ok(result.clone()),
            (None, Some(error)) => Err(McpError::from(error.clone())),
            (None, None) => Err(McpError::internal("response carried neither result nor error")),
        };
        if !self.outbound.resolve(&id, outcome) {
            // Replies to requests we never issued are dropped, never
            // surfaced to the host.
            debug!(%id, "dropping reply with unknown id");
        }
    }

    // -----------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------

    async fn send_reply(&self, reply: JsonRpcResponse) {
        let related = reply.id.request_id().cloned();
        let options = match related {
            Some(id) => SendOptions::related_to(id),
            None => SendOptions::default(),
        };
        if let Err(e) = self.transport.send(reply.into(), options).await {
            warn!(error = %e, "failed to send reply");
        }
    }

    /// Send a notification, queueing it until the client has confirmed
    /// the handshake.
    pub async fn notify(&self, method: &str, params: Option<Value>) {
        let notification = JsonRpcNotification::new(method, params);
        if !self.handshake_confirmed.load(Ordering::SeqCst) {
            trace!(method, "queueing notification until initialized arrives");
            self.queued_notifications
                .lock()
                .expect("queued notifications poisoned")
                .push(notification);
            return;
        }
        if let Err(e) = self
            .transport
            .send(notification.into(), SendOptions::default())
            .await
        {
            warn!(error = %e, method, "failed to send notification");
        }
    }

    /// Issue a server-initiated request and await its reply.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> McpResult<Value> {
        if self.lifecycle() != Lifecycle::Initialized {
            return Err(McpError::invalid_request(format!(
                "cannot send {method} outside an initialized session"
            )));
        }

        let id = self.outbound.allocate();
        let waiter = self.outbound.register(id.clone());

        let request = JsonRpcRequest::new(id.clone(), method, params);
        if let Err(e) = self
            .transport
            .send(request.into(), SendOptions::default())
            .await
        {
            self.outbound.forget(&id);
            return Err(McpError::internal(format!("transport send failed: {e}")));
        }

        let deadline = timeout.unwrap_or(self.config.request_timeout);
        match tokio::time::timeout(deadline, waiter).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(McpError::connection_closed()),
            Err(_) => {
                self.outbound.forget(&id);
                self.send_cancelled(&id, "request timed out").await;
                Err(McpError::timeout(format!(
                    "no reply to {method} within {deadline:?}"
                )))
            }
        }
    }

    async fn send_cancelled(&self, id: &RequestId, reason: &str) {
        let params = serde_json::to_value(CancelledParams {
            request_id: id.clone(),
            reason: Some(reason.to_string()),
        })
        .ok();
        if let Err(e) = self
            .transport
            .send(
                JsonRpcNotification::new(methods::NOTIF_CANCELLED, params).into(),
                SendOptions::default(),
            )
            .await
        {
            debug!(error = %e, "failed to send cancellation notification");
        }
    }

    /// Liveness probe.
    pub async fn ping(&self) -> McpResult<EmptyResult> {
        let value = self.request(methods::PING, None, None).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Ask the client to run an LLM completion.
    pub async fn create_message(
        &self,
        params: CreateMessageParams,
    ) -> McpResult<CreateMessageResult> {
        let value = self
            .request(
                methods::SAMPLING_CREATE_MESSAGE,
                Some(serde_json::to_value(params)?),
                None,
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Ask the client for its root directories.
    pub async fn list_roots(&self) -> McpResult<ListRootsResult> {
        let value = self.request(methods::ROOTS_LIST, None, None).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Emit `notifications/message` when `level` clears the client's
    /// floor.
    pub async fn log_message(&self, level: LogLevel, logger: Option<String>, data: Value) {
        let floor = *self.log_floor.lock().expect("log floor poisoned");
        if let Some(floor) = floor
            && level < floor
        {
            return;
        }
        let params = LoggingMessageParams {
            level,
            logger,
            data,
        };
        match serde_json::to_value(params) {
            Ok(params) => self.notify(methods::NOTIF_MESSAGE, Some(params)).await,
            Err(e) => warn!(error = %e, "failed to serialize log notification"),
        }
    }

    /// Fan out `notifications/resources/updated` if this session is
    /// subscribed to `uri`. Returns whether a notification went out.
    pub async fn notify_resource_updated(&self, uri: &str) -> bool {
        let subscribed = self
            .subscriptions
            .lock()
            .expect("subscriptions poisoned")
            .contains(uri);
        if !subscribed {
            return false;
        }
        let params = serde_json::to_value(ResourceUpdatedParams {
            uri: uri.to_string(),
        })
        .ok();
        self.notify(methods::NOTIF_RESOURCES_UPDATED, params).await;
        true
    }

    /// Snapshot of this session's subscribed URIs.
    pub fn subscribed_uris(&self) -> HashSet<String> {
        self.subscriptions
            .lock()
            .expect("subscriptions poisoned")
            .clone()
    }

    /// Register an observer for `notifications/progress` events carrying
    /// `token`.
    pub fn observe_progress<F>(&self, token: &fluxmcp_protocol::types::ProgressToken, observer: F)
    where
        F: Fn(ProgressParams) + Send + Sync + 'static,
    {
        self.progress_observers
            .insert(progress_key(token), Arc::new(observer));
    }

    /// Register a handler for an inbound notification method. Multiple
    /// handlers per method are allowed and run in registration order.
    pub fn on_notification<F>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(Option<Value>) + Send + Sync + 'static,
    {
        self.notification_handlers
            .entry(method.into())
            .or_default()
            .push(Arc::new(handler));
    }
}

impl std::fmt::Debug for SessionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEngine")
            .field("lifecycle", &self.lifecycle())
            .field("pending_outbound", &self.outbound.len())
            .field("inbound_in_flight", &self.inbound_cancels.len())
            .finish()
    }
}

fn progress_key(token: &fluxmcp_protocol::types::ProgressToken) -> String {
    match token {
        fluxmcp_protocol::types::ProgressToken::Number(n) => format!("n:{n}"),
        fluxmcp_protocol::types::ProgressToken::String(s) => format!("s:{s}"),
    }
}

fn is_builtin_notification(method: &str) -> bool {
    matches!(
        method,
        methods::INITIALIZED | methods::NOTIF_CANCELLED | methods::NOTIF_PROGRESS
    )
}
