//! The server front: registries plus the sessions serving them.

use std::sync::{Arc, Mutex as StdMutex, Weak};

use serde_json::Value;
use tracing::info;

use fluxmcp_protocol::types::LogLevel;
use fluxmcp_transport::Transport;
use fluxmcp_transport::stdio::StdioTransport;
use fluxmcp_transport::streamable::{
    EventStore, StreamableHttpServer, StreamableHttpServerConfig,
};

use crate::auth_gate::AuthGate;
use crate::builder::ServerBuilder;
use crate::engine::{LifecycleCallback, ServerConfig, SessionEngine};
use crate::error::ServerResult;
use crate::registry::Registries;

/// An MCP server: one set of registries, any number of sessions.
///
/// Registries are writable until the first `serve`, which freezes them
/// for the running phase; [`McpServer::stop`] thaws them again.
pub struct McpServer {
    config: ServerConfig,
    registries: Arc<Registries>,
    auth_gate: Option<Arc<AuthGate>>,
    on_lifecycle: Option<LifecycleCallback>,
    sessions: StdMutex<Vec<Weak<SessionEngine>>>,
}

impl McpServer {
    /// Start building a server.
    pub fn builder(name: impl Into<String>, version: impl Into<String>) -> ServerBuilder {
        ServerBuilder::new(name, version)
    }

    pub(crate) fn assemble(
        config: ServerConfig,
        registries: Arc<Registries>,
        auth_gate: Option<Arc<AuthGate>>,
        on_lifecycle: Option<LifecycleCallback>,
    ) -> Self {
        Self {
            config,
            registries,
            auth_gate,
            on_lifecycle,
            sessions: StdMutex::new(Vec::new()),
        }
    }

    /// The shared registries. Mutation fails while the server is running.
    pub fn registries(&self) -> &Arc<Registries> {
        &self.registries
    }

    /// Serve one session over `transport`. Freezes the registries.
    pub async fn serve(&self, transport: Arc<dyn Transport>) -> ServerResult<Arc<SessionEngine>> {
        self.registries.freeze();
        let engine = SessionEngine::start(
            self.config.clone(),
            Arc::clone(&self.registries),
            self.auth_gate.clone(),
            self.on_lifecycle.clone(),
            transport,
        )
        .await?;
        self.sessions
            .lock()
            .expect("sessions mutex poisoned")
            .push(Arc::downgrade(&engine));
        Ok(engine)
    }

    /// Serve over this process's stdin/stdout. Diagnostics stay on
    /// stderr; stdout belongs to the protocol.
    pub async fn run_stdio(&self) -> ServerResult<Arc<SessionEngine>> {
        info!(server = %self.config.server_info.name, "serving over stdio");
        self.serve(Arc::new(StdioTransport::current_process())).await
    }

    /// Serve over streamable HTTP, optionally with an event store for
    /// resumable SSE streams. Returns the engine and the transport (for
    /// `bound_addr`).
    pub async fn run_http(
        &self,
        config: StreamableHttpServerConfig,
        event_store: Option<Arc<dyn EventStore>>,
    ) -> ServerResult<(Arc<SessionEngine>, Arc<StreamableHttpServer>)> {
        let mut transport = match event_store {
            Some(store) => StreamableHttpServer::with_event_store(config, store),
            None => StreamableHttpServer::new(config),
        };
        if let Some(gate) = &self.auth_gate {
            transport = transport.with_auth_gate(Arc::clone(gate) as _);
        }
        let transport = Arc::new(transport);
        let engine = self.serve(Arc::clone(&transport) as Arc<dyn Transport>).await?;
        Ok((engine, transport))
    }

    /// Stop every live session and thaw the registries.
    pub async fn stop(&self) -> ServerResult<()> {
        let sessions = self.live_sessions();
        for session in sessions {
            session.shutdown().await?;
        }
        self.registries.thaw();
        Ok(())
    }

    /// Tell every subscribed session that `uri` changed. Returns how many
    /// sessions were notified.
    pub async fn notify_resource_updated(&self, uri: &str) -> usize {
        let mut notified = 0;
        for session in self.live_sessions() {
            if session.notify_resource_updated(uri).await {
                notified += 1;
            }
        }
        notified
    }

    /// Emit a log notification on every live session.
    pub async fn log_message(&self, level: LogLevel, logger: Option<String>, data: Value) {
        for session in self.live_sessions() {
            session.log_message(level, logger.clone(), data.clone()).await;
        }
    }

    fn live_sessions(&self) -> Vec<Arc<SessionEngine>> {
        let mut sessions = self.sessions.lock().expect("sessions mutex poisoned");
        sessions.retain(|weak| weak.strong_count() > 0);
        sessions.iter().filter_map(Weak::upgrade).collect()
    }
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer")
            .field("server_info", &self.config.server_info)
            .field("registries", &self.registries)
            .finish()
    }
}
