//! Engine behavior over the in-memory transport: handshake, lifecycle
//! gate, schema rejection, cancellation, and subscription fan-out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use fluxmcp_protocol::types::{CallToolResult, Resource, Tool};
use fluxmcp_protocol::{JsonRpcMessage, McpError, McpResult};
use fluxmcp_server::{McpServer, ServerError, ToolFn, ToolHandler};
use fluxmcp_transport::inmemory::InMemoryTransport;
use fluxmcp_transport::{SendOptions, Transport, TransportCallbacks};

/// A hand-driven peer on the far end of an in-memory pair.
struct TestPeer {
    transport: Arc<InMemoryTransport>,
    inbox: mpsc::UnboundedReceiver<JsonRpcMessage>,
}

impl TestPeer {
    async fn send(&self, value: Value) {
        let message: JsonRpcMessage = serde_json::from_value(value).expect("well-formed message");
        self.transport
            .send(message, SendOptions::default())
            .await
            .expect("peer send");
    }

    async fn recv(&mut self) -> JsonRpcMessage {
        tokio::time::timeout(Duration::from_secs(5), self.inbox.recv())
            .await
            .expect("timed out waiting for a message")
            .expect("peer channel closed")
    }

    async fn recv_value(&mut self) -> Value {
        serde_json::to_value(self.recv().await).expect("serializable message")
    }

    /// Asserts nothing arrives within a grace period.
    async fn expect_silence(&mut self, window: Duration) {
        let result = tokio::time::timeout(window, self.inbox.recv()).await;
        assert!(result.is_err(), "expected silence, got {:?}", result);
    }
}

fn add_tool() -> (Tool, Arc<dyn ToolHandler>) {
    (
        Tool::new(
            "add",
            "Add two integers",
            json!({
                "type": "object",
                "properties": {"a": {"type": "integer"}, "b": {"type": "integer"}},
                "required": ["a", "b"],
                "additionalProperties": false,
            }),
        ),
        Arc::new(ToolFn(|args: Option<HashMap<String, Value>>| async move {
            let args = args.unwrap_or_default();
            let a = args.get("a").and_then(Value::as_i64).unwrap_or(0);
            let b = args.get("b").and_then(Value::as_i64).unwrap_or(0);
            Ok(CallToolResult::text((a + b).to_string()))
        })),
    )
}

struct SlowTool;

#[async_trait]
impl ToolHandler for SlowTool {
    async fn call(
        &self,
        _arguments: Option<HashMap<String, Value>>,
        cancel: CancellationToken,
    ) -> McpResult<CallToolResult> {
        tokio::select! {
            () = cancel.cancelled() => Err(McpError::cancelled(None)),
            () = tokio::time::sleep(Duration::from_secs(30)) => {
                Ok(CallToolResult::text("done"))
            }
        }
    }
}

async fn attach(server: &McpServer) -> TestPeer {
    let (server_end, client_end) = InMemoryTransport::pair();
    let (tx, inbox) = mpsc::unbounded_channel();
    let client_end = Arc::new(client_end);
    client_end.set_callbacks(TransportCallbacks::new().on_message(move |message, _| {
        let _ = tx.send(message);
    }));
    client_end.start().await.expect("peer start");

    server
        .serve(Arc::new(server_end))
        .await
        .expect("serve session");
    TestPeer {
        transport: client_end,
        inbox,
    }
}

fn initialize_request(version: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": version,
            "capabilities": {},
            "clientInfo": {"name": "c", "version": "0"},
        },
    })
}

async fn handshake(peer: &mut TestPeer) {
    peer.send(initialize_request("2025-03-26")).await;
    let reply = peer.recv_value().await;
    assert!(reply.get("result").is_some(), "handshake failed: {reply}");
    peer.send(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
        .await;
}

/// Handshake against a server whose registries changed before start; the
/// confirmation releases a `list_changed` announcement that must be
/// drained before the next reply.
async fn handshake_draining(peer: &mut TestPeer, announcement: &str) {
    handshake(peer).await;
    let notification = peer.recv_value().await;
    assert_eq!(notification["method"], announcement);
}

#[tokio::test]
async fn handshake_returns_negotiated_version_and_capabilities() {
    // A bare server announces only logging.
    let server = McpServer::builder("s", "0").build();
    let mut peer = attach(&server).await;

    peer.send(initialize_request("2025-03-26")).await;
    let reply = peer.recv_value().await;
    assert_eq!(reply["id"], 1);
    assert_eq!(reply["result"]["protocolVersion"], "2025-03-26");
    assert_eq!(reply["result"]["serverInfo"]["name"], "s");
    assert_eq!(reply["result"]["serverInfo"]["version"], "0");
    assert_eq!(reply["result"]["capabilities"], json!({"logging": {}}));

    // The follow-up notification is accepted without an answer.
    peer.send(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
        .await;
    peer.expect_silence(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn version_mismatch_lists_supported_versions() {
    let server = McpServer::builder("s", "0").build();
    let mut peer = attach(&server).await;

    peer.send(initialize_request("1999-01-01")).await;
    let reply = peer.recv_value().await;
    assert_eq!(reply["error"]["code"], -32602);
    assert_eq!(
        reply["error"]["data"]["supported_versions"],
        json!(["2025-03-26", "2024-11-05"])
    );
}

#[tokio::test]
async fn requests_before_initialize_are_invalid() {
    let server = McpServer::builder("s", "0").build();
    let mut peer = attach(&server).await;

    peer.send(json!({"jsonrpc": "2.0", "id": 5, "method": "tools/list"}))
        .await;
    let reply = peer.recv_value().await;
    assert_eq!(reply["id"], 5);
    assert_eq!(reply["error"]["code"], -32600);
}

#[tokio::test]
async fn second_initialize_is_invalid() {
    let server = McpServer::builder("s", "0").build();
    let mut peer = attach(&server).await;
    handshake(&mut peer).await;

    peer.send(initialize_request("2025-03-26")).await;
    let reply = peer.recv_value().await;
    assert_eq!(reply["error"]["code"], -32600);
}

#[tokio::test]
async fn unknown_method_is_method_not_found() {
    let server = McpServer::builder("s", "0").build();
    let mut peer = attach(&server).await;
    handshake(&mut peer).await;

    peer.send(json!({"jsonrpc": "2.0", "id": 9, "method": "no/such/method"}))
        .await;
    let reply = peer.recv_value().await;
    assert_eq!(reply["error"]["code"], -32601);
}

#[tokio::test]
async fn unknown_notifications_are_silently_discarded() {
    let server = McpServer::builder("s", "0").build();
    let mut peer = attach(&server).await;
    handshake(&mut peer).await;

    peer.send(json!({"jsonrpc": "2.0", "method": "notifications/etc"}))
        .await;
    peer.expect_silence(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn schema_failure_rejects_with_one_entry_per_rule() {
    let (tool, handler) = add_tool();
    let server = McpServer::builder("s", "0")
        .tool(tool, handler)
        .unwrap()
        .build();
    let mut peer = attach(&server).await;
    handshake_draining(&mut peer, "notifications/tools/list_changed").await;

    peer.send(json!({
        "jsonrpc": "2.0",
        "id": 3,
        "method": "tools/call",
        "params": {"name": "add", "arguments": {"a": "x", "b": 2}},
    }))
    .await;
    let reply = peer.recv_value().await;
    assert_eq!(reply["error"]["code"], -32602);
    let errors = reply["error"]["data"]["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["rule"], "type");
    assert_eq!(errors[0]["path"], "/a");
}

#[tokio::test]
async fn valid_tool_call_round_trips() {
    let (tool, handler) = add_tool();
    let server = McpServer::builder("s", "0")
        .tool(tool, handler)
        .unwrap()
        .build();
    let mut peer = attach(&server).await;
    handshake_draining(&mut peer, "notifications/tools/list_changed").await;

    peer.send(json!({
        "jsonrpc": "2.0",
        "id": 4,
        "method": "tools/call",
        "params": {"name": "add", "arguments": {"a": 19, "b": 23}},
    }))
    .await;
    let reply = peer.recv_value().await;
    assert_eq!(reply["result"]["content"][0]["text"], "42");
}

#[tokio::test]
async fn cancelled_inbound_request_produces_no_reply() {
    let server = McpServer::builder("s", "0")
        .tool(
            Tool::new("slow", "sleeps forever", json!({"type": "object"})),
            Arc::new(SlowTool),
        )
        .unwrap()
        .build();
    let mut peer = attach(&server).await;
    handshake_draining(&mut peer, "notifications/tools/list_changed").await;

    peer.send(json!({
        "jsonrpc": "2.0",
        "id": 42,
        "method": "tools/call",
        "params": {"name": "slow"},
    }))
    .await;
    // Let the handler start, then cancel it.
    tokio::time::sleep(Duration::from_millis(50)).await;
    peer.send(json!({
        "jsonrpc": "2.0",
        "method": "notifications/cancelled",
        "params": {"requestId": 42},
    }))
    .await;

    // No reply for 42; a later ping is answered normally.
    peer.send(json!({"jsonrpc": "2.0", "id": 43, "method": "ping"}))
        .await;
    let reply = peer.recv_value().await;
    assert_eq!(reply["id"], 43, "expected the ping reply, got {reply}");
    assert!(reply.get("result").is_some());
    peer.expect_silence(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn cancelling_initialize_is_ignored() {
    let server = McpServer::builder("s", "0").build();
    let mut peer = attach(&server).await;
    handshake(&mut peer).await;

    peer.send(json!({
        "jsonrpc": "2.0",
        "method": "notifications/cancelled",
        "params": {"requestId": 1},
    }))
    .await;
    // Still alive and answering.
    peer.send(json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}))
        .await;
    let reply = peer.recv_value().await;
    assert_eq!(reply["id"], 2);
}

#[tokio::test]
async fn subscription_fan_out_reaches_the_subscriber() {
    let server = McpServer::builder("s", "0")
        .resource(
            Resource {
                uri: "mem://status".into(),
                name: "status".into(),
                description: None,
                mime_type: None,
            },
            Arc::new(fluxmcp_server::ResourceFn(|uri: String| async move {
                Ok(fluxmcp_protocol::types::ReadResourceResult {
                    contents: vec![fluxmcp_protocol::types::ResourceContents::Text {
                        uri,
                        mime_type: None,
                        text: "ok".into(),
                    }],
                })
            })),
        )
        .unwrap()
        .build();
    let mut peer = attach(&server).await;
    handshake(&mut peer).await;

    // The resource registry was dirty at serve; expect the list_changed
    // announcement after the handshake confirmation.
    let announcement = peer.recv_value().await;
    assert_eq!(
        announcement["method"],
        "notifications/resources/list_changed"
    );

    peer.send(json!({
        "jsonrpc": "2.0",
        "id": 2,
        "method": "resources/subscribe",
        "params": {"uri": "mem://status"},
    }))
    .await;
    assert!(peer.recv_value().await.get("result").is_some());

    let notified = server.notify_resource_updated("mem://status").await;
    assert_eq!(notified, 1);
    let update = peer.recv_value().await;
    assert_eq!(update["method"], "notifications/resources/updated");
    assert_eq!(update["params"]["uri"], "mem://status");

    // After unsubscribe the fan-out skips this session.
    peer.send(json!({
        "jsonrpc": "2.0",
        "id": 3,
        "method": "resources/unsubscribe",
        "params": {"uri": "mem://status"},
    }))
    .await;
    assert!(peer.recv_value().await.get("result").is_some());
    assert_eq!(server.notify_resource_updated("mem://status").await, 0);
}

#[tokio::test]
async fn subscribing_to_unknown_resources_fails() {
    let server = McpServer::builder("s", "0").build();
    let mut peer = attach(&server).await;
    handshake(&mut peer).await;

    peer.send(json!({
        "jsonrpc": "2.0",
        "id": 2,
        "method": "resources/subscribe",
        "params": {"uri": "mem://ghost"},
    }))
    .await;
    let reply = peer.recv_value().await;
    assert_eq!(reply["error"]["code"], -32602);
}

#[tokio::test]
async fn invalid_cursor_is_invalid_params() {
    let (tool, handler) = add_tool();
    let server = McpServer::builder("s", "0")
        .tool(tool, handler)
        .unwrap()
        .build();
    let mut peer = attach(&server).await;
    handshake(&mut peer).await;

    // Consume the tools list_changed announcement.
    let announcement = peer.recv_value().await;
    assert_eq!(announcement["method"], "notifications/tools/list_changed");

    peer.send(json!({
        "jsonrpc": "2.0",
        "id": 2,
        "method": "tools/list",
        "params": {"cursor": "!!not-a-cursor!!"},
    }))
    .await;
    let reply = peer.recv_value().await;
    assert_eq!(reply["error"]["code"], -32602);
}

#[tokio::test]
async fn registries_freeze_while_running() {
    let server = McpServer::builder("s", "0").build();
    let _peer = attach(&server).await;

    let (tool, handler) = add_tool();
    let err = server.registries().tools.register(tool, handler).unwrap_err();
    assert!(matches!(err, ServerError::RegistryFrozen));
}
