//! Client side of the streamable HTTP transport.
//!
//! Requests go out as POSTs with both accept types; the server answers
//! with `202` (nothing to say), a JSON body, or an SSE stream that is
//! consumed on a background task. The standalone GET stream for
//! server-initiated traffic is opened once a session is established and
//! reconnects with exponential backoff, always presenting the last
//! observed event id so the server can replay what was missed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client as HttpClient, StatusCode, header};
use tracing::{debug, error, info, warn};

use fluxmcp_protocol::{JsonRpcMessage, jsonrpc};

use crate::callbacks::{EventSink, TransportCallbacks};
use crate::error::{TransportError, TransportResult};
use crate::message::SendOptions;
use crate::traits::Transport;

use super::sse::SseParser;
use super::{LAST_EVENT_ID_HEADER, SESSION_ID_HEADER};

/// Runs the host application's OAuth flow when the server answers 401.
#[async_trait]
pub trait AuthRefresh: Send + Sync {
    /// Obtain a fresh bearer token, or `None` to give up.
    async fn refresh_token(&self) -> Option<String>;
}

/// Exponential backoff schedule for SSE reconnects:
/// `delay = min(initial * growth^attempt, max_delay)`, up to `max_retries`.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// First retry delay.
    pub initial: Duration,
    /// Multiplier per attempt.
    pub growth: f64,
    /// Cap on any single delay.
    pub max_delay: Duration,
    /// Attempts before giving up.
    pub max_retries: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            growth: 2.0,
            max_delay: Duration::from_secs(30),
            max_retries: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before `attempt` (0-based), or `None` once retries are spent.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        let grown = self.initial.as_millis() as f64 * self.growth.powi(attempt as i32);
        let capped = grown.min(self.max_delay.as_millis() as f64);
        Some(Duration::from_millis(capped as u64))
    }
}

/// Configuration for [`StreamableHttpClient`].
#[derive(Debug, Clone)]
pub struct StreamableHttpClientConfig {
    /// Full endpoint URL, e.g. `http://127.0.0.1:3000/mcp`.
    pub url: String,
    /// Bearer token presented on every request.
    pub bearer_token: Option<String>,
    /// Additional headers on every request.
    pub headers: HashMap<String, String>,
    /// SSE reconnect schedule.
    pub reconnect: ReconnectPolicy,
}

impl StreamableHttpClientConfig {
    /// Configuration pointing at `url` with defaults everywhere else.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            bearer_token: None,
            headers: HashMap::new(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// The streamable HTTP client transport.
pub struct StreamableHttpClient {
    config: StreamableHttpClientConfig,
    http: HttpClient,
    callbacks: StdMutex<TransportCallbacks>,
    sink: StdMutex<Option<EventSink>>,
    session_id: Arc<StdRwLock<Option<String>>>,
    last_event_id: Arc<StdRwLock<Option<String>>>,
    bearer: Arc<StdRwLock<Option<String>>>,
    auth_refresh: Option<Arc<dyn AuthRefresh>>,
    standalone_task: StdMutex<Option<tokio::task::JoinHandle<()>>>,
    standalone_open: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
}

impl StreamableHttpClient {
    /// Client with the given configuration.
    pub fn new(config: StreamableHttpClientConfig) -> Self {
        let bearer = config.bearer_token.clone();
        Self {
            config,
            http: HttpClient::new(),
            callbacks: StdMutex::new(TransportCallbacks::new()),
            sink: StdMutex::new(None),
            session_id: Arc::new(StdRwLock::new(None)),
            last_event_id: Arc::new(StdRwLock::new(None)),
            bearer: Arc::new(StdRwLock::new(bearer)),
            auth_refresh: None,
            standalone_task: StdMutex::new(None),
            standalone_open: Arc::new(AtomicBool::new(false)),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Attach the hook run when the server answers 401.
    pub fn with_auth_refresh(mut self, hook: Arc<dyn AuthRefresh>) -> Self {
        self.auth_refresh = Some(hook);
        self
    }

    fn sink(&self) -> Option<EventSink> {
        self.sink.lock().expect("sink mutex poisoned").clone()
    }

    fn build_headers(&self, accept: &str, last_event_id: Option<&str>) -> header::HeaderMap {
        let mut headers = header::HeaderMap::new();
        if let Ok(value) = header::HeaderValue::from_str(accept) {
            headers.insert(header::ACCEPT, value);
        }
        if let Some(session) = self.session_id.read().expect("session lock poisoned").as_ref()
            && let Ok(value) = header::HeaderValue::from_str(session)
        {
            headers.insert(SESSION_ID_HEADER, value);
        }
        if let Some(last) = last_event_id
            && let Ok(value) = header::HeaderValue::from_str(last)
        {
            headers.insert(LAST_EVENT_ID_HEADER, value);
        }
        if let Some(token) = self.bearer.read().expect("bearer lock poisoned").as_ref()
            && let Ok(value) = header::HeaderValue::from_str(&format!("Bearer {token}"))
        {
            headers.insert(header::AUTHORIZATION, value);
        }
        for (key, value) in &self.config.headers {
            if let (Ok(k), Ok(v)) = (
                header::HeaderName::from_bytes(key.as_bytes()),
                header::HeaderValue::from_str(value),
            ) {
                headers.insert(k, v);
            }
        }
        headers
    }

    fn remember_session(&self, response: &reqwest::Response) {
        if let Some(session) = response
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            let mut slot = self.session_id.write().expect("session lock poisoned");
            if slot.as_deref() != Some(session) {
                debug!(session, "received session id");
                *slot = Some(session.to_string());
            }
        }
    }

    /// Consume an SSE body on a background task, delivering messages and
    /// tracking event ids for resumption.
    fn spawn_sse_reader(&self, response: reqwest::Response, options: SendOptions) {
        let sink = self.sink().unwrap_or_default();
        let last_event_id = Arc::clone(&self.last_event_id);
        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut parser = SseParser::new();
            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!(error = %e, "sse stream interrupted");
                        sink.error(TransportError::ReceiveFailed(e.to_string()));
                        return;
                    }
                };
                for event in parser.feed(&String::from_utf8_lossy(&chunk)) {
                    if let Some(id) = &event.id {
                        *last_event_id.write().expect("event id lock poisoned") = Some(id.clone());
                        if let Some(observe) = &options.on_resumption_token {
                            observe(id.clone());
                        }
                    }
                    if event.data.is_empty() {
                        continue;
                    }
                    match jsonrpc::decode_str(&event.data) {
                        Ok(message) => {
                            for item in message.into_items() {
                                sink.message(item, None);
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "dropping unparseable sse event");
                            sink.error(TransportError::Framing(e.to_string()));
                        }
                    }
                }
            }
            debug!("sse stream ended");
        });
    }

    async fn post_once(&self, body: &str) -> TransportResult<reqwest::Response> {
        self.http
            .post(&self.config.url)
            .headers(self.build_headers("application/json, text/event-stream", None))
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn post_message(&self, body: &str, options: SendOptions) -> TransportResult<()> {
        let mut response = self.post_once(body).await?;

        // One auth retry: refresh the token and re-present the request.
        if response.status() == StatusCode::UNAUTHORIZED
            && let Some(refresh) = &self.auth_refresh
        {
            info!("401 from server; running auth refresh");
            let Some(token) = refresh.refresh_token().await else {
                return Err(TransportError::HttpStatus {
                    status: 401,
                    detail: "authorization refresh declined".into(),
                });
            };
            *self.bearer.write().expect("bearer lock poisoned") = Some(token);
            response = self.post_once(body).await?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
                detail: response.text().await.unwrap_or_default(),
            });
        }

        self.remember_session(&response);
        self.ensure_standalone_stream();

        if status == StatusCode::ACCEPTED || status == StatusCode::NO_CONTENT {
            return Ok(());
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_type.starts_with("text/event-stream") {
            self.spawn_sse_reader(response, options);
        } else {
            let body = response
                .bytes()
                .await
                .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;
            if body.is_empty() {
                return Ok(());
            }
            let sink = self.sink().unwrap_or_default();
            match jsonrpc::decode(&body) {
                Ok(message) => {
                    for item in message.into_items() {
                        sink.message(item, None);
                    }
                }
                Err(e) => {
                    sink.error(TransportError::Framing(e.to_string()));
                }
            }
        }
        Ok(())
    }

    /// Re-attach to an interrupted stream with a GET instead of re-sending
    /// the request.
    async fn resume_stream(&self, token: String, options: SendOptions) -> TransportResult<()> {
        let response = self
            .http
            .get(&self.config.url)
            .headers(self.build_headers("text/event-stream", Some(&token)))
            .send()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
                detail: response.text().await.unwrap_or_default(),
            });
        }
        self.remember_session(&response);
        self.spawn_sse_reader(response, options);
        Ok(())
    }

    /// Open (once) the standalone GET stream with reconnect-and-replay.
    fn ensure_standalone_stream(&self) {
        if self.standalone_open.swap(true, Ordering::SeqCst) {
            return;
        }

        let http = self.http.clone();
        let url = self.config.url.to_string();
        let policy = self.config.reconnect.clone();
        let sink = self.sink().unwrap_or_default();
        let session_id = Arc::clone(&self.session_id);
        let last_event_id = Arc::clone(&self.last_event_id);
        let bearer = Arc::clone(&self.bearer);
        let connected = Arc::clone(&self.connected);

        let handle = tokio::spawn(async move {
            let attempt = AtomicU32::new(0);
            loop {
                if !connected.load(Ordering::SeqCst) {
                    return;
                }
                let current = attempt.load(Ordering::Relaxed);
                if current > 0 {
                    let Some(delay) = policy.delay(current - 1) else {
                        error!("standalone stream reconnects exhausted");
                        sink.error(TransportError::ConnectionLost(
                            "sse reconnect attempts exhausted".into(),
                        ));
                        return;
                    };
                    warn!(attempt = current, ?delay, "reconnecting standalone stream");
                    tokio::time::sleep(delay).await;
                }
                attempt.fetch_add(1, Ordering::Relaxed);

                let mut request = http
                    .get(&url)
                    .header(header::ACCEPT, "text/event-stream");
                if let Some(session) = session_id.read().expect("session lock poisoned").clone() {
                    request = request.header(SESSION_ID_HEADER, session);
                }
                if let Some(last) = last_event_id.read().expect("event id lock poisoned").clone() {
                    request = request.header(LAST_EVENT_ID_HEADER, last);
                }
                if let Some(token) = bearer.read().expect("bearer lock poisoned").clone() {
                    request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
                }

                let response = match request.send().await {
                    Ok(response) => response,
                    Err(e) => {
                        debug!(error = %e, "standalone stream connect failed");
                        continue;
                    }
                };
                if response.status() == StatusCode::CONFLICT {
                    // Another stream already serves this session.
                    debug!("standalone stream already open elsewhere");
                    return;
                }
                if !response.status().is_success() {
                    debug!(status = %response.status(), "standalone stream refused");
                    continue;
                }

                debug!("standalone stream established");
                attempt.store(0, Ordering::Relaxed);

                let mut stream = response.bytes_stream();
                let mut parser = SseParser::new();
                while let Some(chunk) = stream.next().await {
                    let Ok(chunk) = chunk else { break };
                    for event in parser.feed(&String::from_utf8_lossy(&chunk)) {
                        if let Some(id) = &event.id {
                            *last_event_id.write().expect("event id lock poisoned") =
                                Some(id.clone());
                        }
                        if event.data.is_empty() {
                            continue;
                        }
                        match jsonrpc::decode_str(&event.data) {
                            Ok(message) => {
                                for item in message.into_items() {
                                    sink.message(item, None);
                                }
                            }
                            Err(e) => sink.error(TransportError::Framing(e.to_string())),
                        }
                    }
                }
                attempt.store(1, Ordering::Relaxed);
            }
        });
        *self
            .standalone_task
            .lock()
            .expect("standalone task mutex poisoned") = Some(handle);
    }
}

impl std::fmt::Debug for StreamableHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamableHttpClient")
            .field("url", &self.config.url)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[async_trait]
impl Transport for StreamableHttpClient {
    fn set_callbacks(&self, callbacks: TransportCallbacks) {
        *self.callbacks.lock().expect("callbacks mutex poisoned") = callbacks;
    }

    async fn start(&self) -> TransportResult<()> {
        if self.is_connected() {
            return Ok(());
        }
        let callbacks = self
            .callbacks
            .lock()
            .expect("callbacks mutex poisoned")
            .clone();
        let sink = EventSink::new(callbacks);
        *self.sink.lock().expect("sink mutex poisoned") = Some(sink.clone());
        self.connected.store(true, Ordering::SeqCst);
        sink.connected();
        debug!(url = %self.config.url, "streamable http client started");
        Ok(())
    }

    async fn stop(&self) -> TransportResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(handle) = self
            .standalone_task
            .lock()
            .expect("standalone task mutex poisoned")
            .take()
        {
            handle.abort();
        }

        // Best effort: tell the server the session is over.
        let session = self.session_id.read().expect("session lock poisoned").clone();
        if let Some(session) = session {
            let _ = self
                .http
                .delete(&self.config.url)
                .header(SESSION_ID_HEADER, session)
                .send()
                .await;
        }

        if let Some(sink) = self.sink() {
            sink.closed();
        }
        *self.sink.lock().expect("sink mutex poisoned") = None;
        *self.callbacks.lock().expect("callbacks mutex poisoned") = TransportCallbacks::new();
        debug!("streamable http client stopped");
        Ok(())
    }

    async fn send(&self, message: JsonRpcMessage, options: SendOptions) -> TransportResult<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        if let Some(token) = options.resumption_token.clone() {
            return self.resume_stream(token, options).await;
        }

        let body = jsonrpc::encode(&message)?;
        self.post_message(&body, options).await
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn session_id(&self) -> Option<String> {
        self.session_id.read().expect("session lock poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn backoff_grows_and_caps() {
        let policy = ReconnectPolicy {
            initial: Duration::from_secs(1),
            growth: 2.0,
            max_delay: Duration::from_secs(5),
            max_retries: 4,
        };
        assert_eq!(policy.delay(0), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay(1), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay(2), Some(Duration::from_secs(4)));
        // Capped at max_delay.
        assert_eq!(policy.delay(3), Some(Duration::from_secs(5)));
        // Retries exhausted.
        assert_eq!(policy.delay(4), None);
    }

    #[test]
    fn config_defaults() {
        let config = StreamableHttpClientConfig::new("http://localhost:3000/mcp");
        assert_eq!(config.url, "http://localhost:3000/mcp");
        assert!(config.bearer_token.is_none());
        assert_eq!(config.reconnect.max_retries, 5);
    }
}
