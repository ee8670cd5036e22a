//! The MCP client engine.
//!
//! A [`Client`] owns the pending-request table for one session and wires
//! it to a transport. Inbound traffic is observed in transport-FIFO order
//! by a pump task; server-initiated requests (ping, sampling, roots) are
//! answered from registered handlers, notifications fan out to
//! observers, and everything else correlates against the pending table.

use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use fluxmcp_protocol::jsonrpc::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use fluxmcp_protocol::types::{
    CallToolParams, CallToolResult, CancelledParams, ClientCapabilities, CompleteParams,
    CompleteResult, EmptyResult, GetPromptParams, GetPromptResult, Implementation,
    InitializeParams, InitializeResult, ListPromptsResult, ListResourceTemplatesResult,
    ListResourcesResult, ListRootsResult, ListToolsResult, LogLevel, LoggingMessageParams,
    PaginatedParams, ProgressParams, ProgressToken, ReadResourceParams, ReadResourceResult,
    RequestId, ResourceUpdatedParams, RootsCapability, ServerCapabilities, SetLevelParams,
    SubscribeParams,
};
use fluxmcp_protocol::{
    JsonRpcMessage, McpError, McpResult, SUPPORTED_VERSIONS, methods,
};
use fluxmcp_transport::{AuthInfo, SendOptions, Transport, TransportCallbacks};

use crate::handlers::ClientHandlers;
use crate::pending::{PendingRequests, RequestOptions};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Identity sent at handshake.
    pub client_info: Implementation,
    /// Default per-request deadline.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_info: Implementation::new("fluxmcp-client", env!("CARGO_PKG_VERSION")),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Client session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Constructed; `initialize` not yet run.
    Uninitialized,
    /// Handshake in flight.
    Initializing,
    /// Normal operation.
    Initialized,
    /// Closed cleanly.
    Closed,
    /// The transport failed underneath the session.
    Errored,
}

/// Observer for session life events.
pub type StateCallback = Arc<dyn Fn(ClientState) + Send + Sync>;

/// The client engine for one session.
pub struct Client {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    pending: PendingRequests,
    handlers: ClientHandlers,
    state: StdMutex<ClientState>,
    server_info: StdMutex<Option<Implementation>>,
    server_capabilities: StdMutex<Option<ServerCapabilities>>,
    negotiated_version: StdMutex<Option<String>>,
    inbound_cancels: DashMap<RequestId, CancellationToken>,
    on_state: Option<StateCallback>,
    /// Self-reference for spawning handler tasks.
    weak_self: Weak<Self>,
}

impl Client {
    /// Wire a client to `transport` and start it. The transport's
    /// callbacks are installed here; install nothing yourself. Run
    /// [`Client::initialize`] next.
    pub async fn connect(
        transport: Arc<dyn Transport>,
        config: ClientConfig,
        handlers: ClientHandlers,
        on_state: Option<StateCallback>,
    ) -> McpResult<Arc<Self>> {
        let client = Arc::new_cyclic(|weak_self| Self {
            config,
            transport: Arc::clone(&transport),
            pending: PendingRequests::new(),
            handlers,
            state: StdMutex::new(ClientState::Uninitialized),
            server_info: StdMutex::new(None),
            server_capabilities: StdMutex::new(None),
            negotiated_version: StdMutex::new(None),
            inbound_cancels: DashMap::new(),
            on_state,
            weak_self: weak_self.clone(),
        });

        let (inbox_tx, mut inbox_rx) = mpsc::unbounded_channel::<(JsonRpcMessage, Option<AuthInfo>)>();
        {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                while let Some((message, _auth)) = inbox_rx.recv().await {
                    for item in message.into_items() {
                        client.dispatch_inbound(item).await;
                    }
                }
            });
        }

        let close_client = Arc::downgrade(&client);
        let callbacks = TransportCallbacks::new()
            .on_message(move |message, auth| {
                let _ = inbox_tx.send((message, auth));
            })
            .on_close(move || {
                if let Some(client) = close_client.upgrade() {
                    client.on_transport_closed();
                }
            })
            .on_error(|e| {
                warn!(error = %e, "transport error");
            });

        transport.set_callbacks(callbacks);
        transport.start().await.map_err(|e| {
            McpError::internal(format!("transport start failed: {e}"))
        })?;
        Ok(client)
    }

    // -----------------------------------------------------------------
    // State
    // -----------------------------------------------------------------

    /// Current session state.
    pub fn state(&self) -> ClientState {
        *self.state.lock().expect("state mutex poisoned")
    }

    fn set_state(&self, next: ClientState) {
        {
            let mut state = self.state.lock().expect("state mutex poisoned");
            if *state == next {
                return;
            }
            trace!(from = ?*state, to = ?next, "client state");
            *state = next;
        }
        if let Some(callback) = &self.on_state {
            callback(next);
        }
    }

    /// The server identity learned at handshake.
    pub fn server_info(&self) -> Option<Implementation> {
        self.server_info.lock().expect("server info poisoned").clone()
    }

    /// The server capabilities learned at handshake.
    pub fn server_capabilities(&self) -> Option<ServerCapabilities> {
        self.server_capabilities
            .lock()
            .expect("server capabilities poisoned")
            .clone()
    }

    /// The protocol version this session speaks.
    pub fn negotiated_version(&self) -> Option<String> {
        self.negotiated_version
            .lock()
            .expect("version poisoned")
            .clone()
    }

    /// Close the session. Every outstanding request resolves with
    /// `ConnectionClosed`.
    pub async fn close(&self) -> McpResult<()> {
        self.set_state(ClientState::Closed);
        self.transport
            .stop()
            .await
            .map_err(|e| McpError::internal(format!("transport stop failed: {e}")))?;
        self.pending.fail_all(&McpError::connection_closed());
        Ok(())
    }

    fn on_transport_closed(&self) {
        if !matches!(self.state(), ClientState::Closed) {
            self.set_state(ClientState::Errored);
        }
        self.pending.fail_all(&McpError::connection_closed());
        for entry in self.inbound_cancels.iter() {
            entry.value().cancel();
        }
        self.inbound_cancels.clear();
    }

    // -----------------------------------------------------------------
    // Handshake
    // -----------------------------------------------------------------

    /// Run the `initialize` handshake and confirm it with
    /// `notifications/initialized`.
    pub async fn initialize(&self) -> McpResult<InitializeResult> {
        if self.state() != ClientState::Uninitialized {
            return Err(McpError::invalid_request("client is already initialized"));
        }
        self.set_state(ClientState::Initializing);

        let params = InitializeParams {
            protocol_version: fluxmcp_protocol::LATEST_VERSION.to_string(),
            capabilities: self.build_capabilities(),
            client_info: self.config.client_info.clone(),
        };

        let value = match self
            .send_request(
                methods::INITIALIZE,
                Some(serde_json::to_value(params)?),
                RequestOptions::default(),
                true,
            )
            .await
        {
            Ok(value) => value,
            Err(e) => {
                self.set_state(ClientState::Uninitialized);
                return Err(e);
            }
        };

        let result: InitializeResult = serde_json::from_value(value)
            .map_err(|e| McpError::invalid_request(format!("malformed initialize result: {e}")))?;

        if !SUPPORTED_VERSIONS.contains(&result.protocol_version.as_str()) {
            self.set_state(ClientState::Errored);
            return Err(McpError::invalid_params(format!(
                "server negotiated unsupported protocol version {}",
                result.protocol_version
            )));
        }

        *self.server_info.lock().expect("server info poisoned") = Some(result.server_info.clone());
        *self
            .server_capabilities
            .lock()
            .expect("server capabilities poisoned") = Some(result.capabilities.clone());
        *self.negotiated_version.lock().expect("version poisoned") =
            Some(result.protocol_version.clone());

        self.set_state(ClientState::Initialized);
        self.notify(methods::INITIALIZED, None).await?;
        debug!(server = %result.server_info.name, version = %result.protocol_version, "handshake complete");
        Ok(result)
    }

    fn build_capabilities(&self) -> ClientCapabilities {
        ClientCapabilities {
            roots: Some(RootsCapability {
                list_changed: Some(true),
            }),
            sampling: self.handlers.sampling.as_ref().map(|_| Default::default()),
            experimental: None,
        }
    }

    // -----------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------

    /// Send a request and await its reply under the timeout discipline.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> McpResult<Value> {
        self.send_request(method, params, options, false).await
    }

    async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        mut options: RequestOptions,
        allow_uninitialized: bool,
    ) -> McpResult<Value> {
        match self.state() {
            ClientState::Initialized => {}
            ClientState::Initializing if allow_uninitialized => {}
            state => {
                return Err(McpError::invalid_request(format!(
                    "cannot send {method} in state {state:?}"
                )));
            }
        }

        let id = self.pending.allocate();

        // Progress wants a token; default it to the request id.
        let params = if options.on_progress.is_some() || options.progress_token.is_some() {
            let token = options.progress_token.clone().unwrap_or(match &id {
                RequestId::Number(n) => ProgressToken::Number(*n),
                RequestId::String(s) => ProgressToken::String(s.clone()),
            });
            options.progress_token = Some(token.clone());
            Some(inject_progress_token(params, &token)?)
        } else {
            params
        };

        let per_request = options.timeout.unwrap_or(self.config.request_timeout);
        // Waiter installed before the transport sees bytes; the reply can
        // never race the registration.
        let (mut waiter, deadline) =
            self.pending
                .register(id.clone(), method, per_request, &options);

        let request = JsonRpcRequest::new(id.clone(), method, params);
        if let Err(e) = self
            .transport
            .send(request.into(), SendOptions::default())
            .await
        {
            self.pending
                .resolve(&id, Err(McpError::internal("send failed")));
            return Err(McpError::internal(format!("transport send failed: {e}")));
        }

        loop {
            let wake_at = *deadline.lock().expect("deadline poisoned");
            tokio::select! {
                outcome = &mut waiter => {
                    return match outcome {
                        Ok(result) => result,
                        Err(_) => Err(McpError::connection_closed()),
                    };
                }
                () = tokio::time::sleep_until(tokio::time::Instant::from_std(wake_at)) => {
                    // Progress may have pushed the deadline out while we
                    // slept.
                    let current = *deadline.lock().expect("deadline poisoned");
                    if std::time::Instant::now() < current {
                        continue;
                    }
                    if self.pending.resolve(&id, Err(McpError::timeout("deadline elapsed"))) {
                        self.notify_cancelled(&id, "request timed out").await;
                        return Err(McpError::timeout(format!(
                            "no reply to {method} within {per_request:?}"
                        )));
                    }
                    // The reply won the race; collect it.
                    return match waiter.await {
                        Ok(result) => result,
                        Err(_) => Err(McpError::connection_closed()),
                    };
                }
            }
        }
    }

    /// Cancel an outstanding request: resolves its waiter with
    /// `Cancelled` and tells the peer best-effort.
    pub async fn cancel_request(&self, id: &RequestId, reason: Option<&str>) -> bool {
        let cancelled = self.pending.resolve(id, Err(McpError::cancelled(reason)));
        if cancelled {
            self.notify_cancelled(id, reason.unwrap_or("cancelled by caller")).await;
        }
        cancelled
    }

    /// Ids of requests still awaiting replies.
    pub fn outstanding_requests(&self) -> Vec<RequestId> {
        self.pending.outstanding()
    }

    async fn notify_cancelled(&self, id: &RequestId, reason: &str) {
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

    /// Send a notification.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> McpResult<()> {
        self.transport
            .send(
                JsonRpcNotification::new(method, params).into(),
                SendOptions::default(),
            )
            .await
            .map_err(|e| McpError::internal(format!("transport send failed: {e}")))
    }

    // -----------------------------------------------------------------
    // Typed operations
    // -----------------------------------------------------------------

    /// Liveness probe.
    pub async fn ping(&self) -> McpResult<EmptyResult> {
        let value = self
            .request(methods::PING, None, RequestOptions::default())
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// One page of tools.
    pub async fn list_tools(&self, cursor: Option<String>) -> McpResult<ListToolsResult> {
        self.paginated(methods::TOOLS_LIST, cursor).await
    }

    /// Invoke a tool.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<std::collections::HashMap<String, Value>>,
    ) -> McpResult<CallToolResult> {
        self.call_tool_with_options(name, arguments, RequestOptions::default())
            .await
    }

    /// Invoke a tool with explicit timeout/progress options.
    pub async fn call_tool_with_options(
        &self,
        name: &str,
        arguments: Option<std::collections::HashMap<String, Value>>,
        options: RequestOptions,
    ) -> McpResult<CallToolResult> {
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let value = self
            .request(methods::TOOLS_CALL, Some(serde_json::to_value(params)?), options)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// One page of prompts.
    pub async fn list_prompts(&self, cursor: Option<String>) -> McpResult<ListPromptsResult> {
        self.paginated(methods::PROMPTS_LIST, cursor).await
    }

    /// Render a prompt.
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<std::collections::HashMap<String, String>>,
    ) -> McpResult<GetPromptResult> {
        let params = GetPromptParams {
            name: name.to_string(),
            arguments,
        };
        let value = self
            .request(
                methods::PROMPTS_GET,
                Some(serde_json::to_value(params)?),
                RequestOptions::default(),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// One page of static resources.
    pub async fn list_resources(&self, cursor: Option<String>) -> McpResult<ListResourcesResult> {
        self.paginated(methods::RESOURCES_LIST, cursor).await
    }

    /// One page of resource templates.
    pub async fn list_resource_templates(
        &self,
        cursor: Option<String>,
    ) -> McpResult<ListResourceTemplatesResult> {
        self.paginated(methods::RESOURCES_TEMPLATES_LIST, cursor).await
    }

    /// Read a resource.
    pub async fn read_resource(&self, uri: &str) -> McpResult<ReadResourceResult> {
        let params = ReadResourceParams {
            uri: uri.to_string(),
        };
        let value = self
            .request(
                methods::RESOURCES_READ,
                Some(serde_json::to_value(params)?),
                RequestOptions::default(),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Subscribe to updates for `uri`.
    pub async fn subscribe(&self, uri: &str) -> McpResult<EmptyResult> {
        self.subscription(methods::RESOURCES_SUBSCRIBE, uri).await
    }

    /// Drop the subscription for `uri`.
    pub async fn unsubscribe(&self, uri: &str) -> McpResult<EmptyResult> {
        self.subscription(methods::RESOURCES_UNSUBSCRIBE, uri).await
    }

    /// Ask the server to complete a partial argument.
    pub async fn complete(&self, params: CompleteParams) -> McpResult<CompleteResult> {
        let value = self
            .request(
                methods::COMPLETION_COMPLETE,
                Some(serde_json::to_value(params)?),
                RequestOptions::default(),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Set the server's minimum log level for this session.
    pub async fn set_log_level(&self, level: LogLevel) -> McpResult<EmptyResult> {
        let params = SetLevelParams { level };
        let value = self
            .request(
                methods::LOGGING_SET_LEVEL,
                Some(serde_json::to_value(params)?),
                RequestOptions::default(),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Replace the root set and announce the change.
    pub async fn set_roots(&self, roots: Vec<fluxmcp_protocol::types::Root>) -> McpResult<()> {
        *self.handlers.roots.lock().expect("roots poisoned") = roots;
        if self.state() == ClientState::Initialized {
            self.notify(methods::NOTIF_ROOTS_LIST_CHANGED, None).await?;
        }
        Ok(())
    }

    async fn paginated<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        cursor: Option<String>,
    ) -> McpResult<T> {
        let params = PaginatedParams { cursor };
        let value = self
            .request(
                method,
                Some(serde_json::to_value(params)?),
                RequestOptions::default(),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn subscription(&self, method: &str, uri: &str) -> McpResult<EmptyResult> {
        let params = SubscribeParams {
            uri: uri.to_string(),
        };
        let value = self
            .request(method, Some(serde_json::to_value(params)?), RequestOptions::default())
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    // -----------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------

    async fn dispatch_inbound(&self, message: JsonRpcMessage) {
        match message {
            JsonRpcMessage::Response(response) => self.dispatch_response(response),
            JsonRpcMessage::Notification(notification) => self.dispatch_notification(notification),
            JsonRpcMessage::Request(request) => self.dispatch_server_request(request).await,
            JsonRpcMessage::Batch(items) => {
                for item in items {
                    Box::pin(self.dispatch_inbound(item)).await;
                }
            }
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
        if !self.pending.resolve(&id, outcome) {
            // Unknown ids are dropped and logged, never surfaced.
            debug!(%id, "dropping reply with unknown id");
        }
    }

    fn dispatch_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            methods::NOTIF_PROGRESS => {
                let Some(params) = notification.params else {
                    return;
                };
                match serde_json::from_value::<ProgressParams>(params) {
                    Ok(progress) => self.pending.on_progress(&progress),
                    Err(e) => debug!(error = %e, "malformed progress notification"),
                }
            }
            methods::NOTIF_CANCELLED => {
                let Some(params) = notification.params else {
                    return;
                };
                let Ok(cancelled) = serde_json::from_value::<CancelledParams>(params) else {
                    debug!("malformed cancellation notification");
                    return;
                };
                if let Some(entry) = self.inbound_cancels.get(&cancelled.request_id) {
                    debug!(id = %cancelled.request_id, "server cancelled its request");
                    entry.value().cancel();
                }
            }
            methods::NOTIF_MESSAGE => {
                let Some(params) = notification.params else {
                    return;
                };
                match serde_json::from_value::<LoggingMessageParams>(params) {
                    Ok(message) => {
                        if let Some(observer) = &self.handlers.on_log {
                            observer(message);
                        }
                    }
                    Err(e) => debug!(error = %e, "malformed log notification"),
                }
            }
            methods::NOTIF_RESOURCES_UPDATED => {
                let Some(params) = notification.params else {
                    return;
                };
                if let Ok(updated) = serde_json::from_value::<ResourceUpdatedParams>(params)
                    && let Some(observer) = &self.handlers.on_resource_updated
                {
                    observer(updated.uri);
                }
            }
            method @ (methods::NOTIF_TOOLS_LIST_CHANGED
            | methods::NOTIF_PROMPTS_LIST_CHANGED
            | methods::NOTIF_RESOURCES_LIST_CHANGED) => {
                if let Some(observer) = &self.handlers.on_list_changed {
                    observer(method);
                }
            }
            other => {
                // Unknown notifications are silently discarded.
                trace!(method = other, "discarding unknown notification");
            }
        }
    }

    async fn dispatch_server_request(&self, request: JsonRpcRequest) {
        match request.method.as_str() {
            methods::PING => {
                self.send_reply(JsonRpcResponse::result(
                    request.id,
                    Value::Object(Default::default()),
                ))
                .await;
            }
            methods::ROOTS_LIST => {
                let roots = self.handlers.roots.lock().expect("roots poisoned").clone();
                let result = ListRootsResult { roots };
                let reply = match serde_json::to_value(result) {
                    Ok(value) => JsonRpcResponse::result(request.id, value),
                    Err(e) => JsonRpcResponse::error(
                        request.id,
                        McpError::internal(e.to_string()).into(),
                    ),
                };
                self.send_reply(reply).await;
            }
            methods::SAMPLING_CREATE_MESSAGE => {
                let Some(handler) = self.handlers.sampling.clone() else {
                    self.send_reply(JsonRpcResponse::error(
                        request.id,
                        McpError::method_not_found(methods::SAMPLING_CREATE_MESSAGE).into(),
                    ))
                    .await;
                    return;
                };

                let params: fluxmcp_protocol::types::CreateMessageParams =
                    match serde_json::from_value(request.params.unwrap_or(Value::Null)) {
                        Ok(params) => params,
                        Err(e) => {
                            self.send_reply(JsonRpcResponse::error(
                                request.id,
                                McpError::invalid_params(format!(
                                    "malformed sampling params: {e}"
                                ))
                                .into(),
                            ))
                            .await;
                            return;
                        }
                    };

                let Some(client) = self.weak_self.upgrade() else {
                    return;
                };
                let cancel = CancellationToken::new();
                self.inbound_cancels
                    .insert(request.id.clone(), cancel.clone());

                let id = request.id;
                tokio::spawn(async move {
                    let outcome = tokio::select! {
                        () = cancel.cancelled() => None,
                        result = handler.create_message(params, cancel.clone()) => Some(result),
                    };
                    client.inbound_cancels.remove(&id);
                    if let Some(result) = outcome {
                        let reply = match result.and_then(|r| Ok(serde_json::to_value(r)?)) {
                            Ok(value) => JsonRpcResponse::result(id, value),
                            Err(e) => JsonRpcResponse::error(id, e.into()),
                        };
                        client.send_reply(reply).await;
                    } else {
                        debug!("sampling request cancelled; suppressing reply");
                    }
                });
            }
            other => {
                self.send_reply(JsonRpcResponse::error(
                    request.id,
                    McpError::method_not_found(other).into(),
                ))
                .await;
            }
        }
    }

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
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state())
            .field("pending", &self.pending)
            .finish()
    }
}

/// Attach `_meta.progressToken` to a params value, creating the object as
/// needed.
fn inject_progress_token(params: Option<Value>, token: &ProgressToken) -> McpResult<Value> {
    let mut value = params.unwrap_or_else(|| Value::Object(Default::default()));
    let Some(object) = value.as_object_mut() else {
        return Err(McpError::invalid_params(
            "progress requires object-shaped params",
        ));
    };
    let meta = object
        .entry("_meta")
        .or_insert_with(|| Value::Object(Default::default()));
    let Some(meta) = meta.as_object_mut() else {
        return Err(McpError::invalid_params("params._meta must be an object"));
    };
    meta.insert("progressToken".to_string(), serde_json::to_value(token)?);
    Ok(value)
}
