//! Client/server sessions over the in-memory transport: the full
//! handshake, typed operations, pagination, timeouts, cancellation, and
//! notification fan-out.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use fluxmcp_client::{Client, ClientConfig, ClientHandlers, RequestOptions};
use fluxmcp_protocol::ErrorCode;
use fluxmcp_protocol::types::{CallToolResult, LogLevel, Resource, Tool};
use fluxmcp_protocol::{McpError, McpResult};
use fluxmcp_server::{McpServer, ResourceFn, ToolFn, ToolHandler};
use fluxmcp_transport::inmemory::InMemoryTransport;

fn add_tool() -> (Tool, Arc<dyn ToolHandler>) {
    (
        Tool::new(
            "add",
            "Add two integers",
            json!({
                "type": "object",
                "properties": {"a": {"type": "integer"}, "b": {"type": "integer"}},
                "required": ["a", "b"],
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

async fn connect(server: &McpServer, handlers: ClientHandlers) -> Arc<Client> {
    let (server_end, client_end) = InMemoryTransport::pair();
    server
        .serve(Arc::new(server_end))
        .await
        .expect("serve session");
    let client = Client::connect(
        Arc::new(client_end),
        ClientConfig::default(),
        handlers,
        None,
    )
    .await
    .expect("client connect");
    client.initialize().await.expect("handshake");
    client
}

#[tokio::test]
async fn handshake_exposes_server_identity_and_capabilities() {
    let (tool, handler) = add_tool();
    let server = McpServer::builder("calc", "1.2.3")
        .instructions("adds numbers")
        .tool(tool, handler)
        .unwrap()
        .build();
    let client = connect(&server, ClientHandlers::new()).await;

    let info = client.server_info().unwrap();
    assert_eq!(info.name, "calc");
    assert_eq!(info.version, "1.2.3");
    assert_eq!(client.negotiated_version().as_deref(), Some("2025-03-26"));

    let caps = client.server_capabilities().unwrap();
    assert!(caps.tools.is_some());
    assert!(caps.logging.is_some());
    assert!(caps.prompts.is_none(), "nothing registered, nothing announced");
}

#[tokio::test]
async fn tool_calls_round_trip() {
    let (tool, handler) = add_tool();
    let server = McpServer::builder("calc", "0")
        .tool(tool, handler)
        .unwrap()
        .build();
    let client = connect(&server, ClientHandlers::new()).await;

    let mut args = HashMap::new();
    args.insert("a".to_string(), json!(40));
    args.insert("b".to_string(), json!(2));
    let result = client.call_tool("add", Some(args)).await.unwrap();
    assert_eq!(
        result.content[0],
        fluxmcp_protocol::types::Content::text("42")
    );
}

#[tokio::test]
async fn schema_violations_surface_as_invalid_params() {
    let (tool, handler) = add_tool();
    let server = McpServer::builder("calc", "0")
        .tool(tool, handler)
        .unwrap()
        .build();
    let client = connect(&server, ClientHandlers::new()).await;

    let mut args = HashMap::new();
    args.insert("a".to_string(), json!("x"));
    args.insert("b".to_string(), json!(2));
    let err = client.call_tool("add", Some(args)).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidParams);
    let errors = err.data.unwrap()["errors"].as_array().unwrap().clone();
    assert_eq!(errors.len(), 1);
}

#[tokio::test]
async fn pagination_concatenates_to_the_full_registry() {
    let mut builder = McpServer::builder("many", "0").page_size(2);
    for i in 0..5 {
        builder = builder
            .tool(
                Tool::new(format!("tool-{i}"), "t", json!({"type": "object"})),
                Arc::new(ToolFn(|_args: Option<HashMap<String, Value>>| async {
                    Ok(CallToolResult::text("x"))
                })),
            )
            .unwrap();
    }
    let server = builder.build();
    let client = connect(&server, ClientHandlers::new()).await;

    let mut names = Vec::new();
    let mut cursor = None;
    loop {
        let page = client.list_tools(cursor).await.unwrap();
        assert!(page.tools.len() <= 2);
        names.extend(page.tools.into_iter().map(|t| t.name));
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    assert_eq!(
        names,
        vec!["tool-0", "tool-1", "tool-2", "tool-3", "tool-4"]
    );
}

#[tokio::test]
async fn ping_answers_quickly() {
    let server = McpServer::builder("s", "0").build();
    let client = connect(&server, ClientHandlers::new()).await;
    client.ping().await.unwrap();
}

#[tokio::test]
async fn timeouts_resolve_with_request_timeout() {
    let server = McpServer::builder("s", "0")
        .tool(
            Tool::new("slow", "sleeps", json!({"type": "object"})),
            Arc::new(SlowTool),
        )
        .unwrap()
        .build();
    let client = connect(&server, ClientHandlers::new()).await;

    let options = RequestOptions {
        timeout: Some(Duration::from_millis(100)),
        ..Default::default()
    };
    let err = client
        .call_tool_with_options("slow", None, options)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::RequestTimeout);
    assert!(client.outstanding_requests().is_empty());
}

#[tokio::test]
async fn explicit_cancellation_resolves_the_waiter() {
    let server = McpServer::builder("s", "0")
        .tool(
            Tool::new("slow", "sleeps", json!({"type": "object"})),
            Arc::new(SlowTool),
        )
        .unwrap()
        .build();
    let client = connect(&server, ClientHandlers::new()).await;

    let call_client = Arc::clone(&client);
    let call = tokio::spawn(async move { call_client.call_tool("slow", None).await });

    // Wait for the request to be in flight, then cancel it.
    let id = loop {
        let outstanding = client.outstanding_requests();
        if let Some(id) = outstanding.first() {
            break id.clone();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };
    assert!(client.cancel_request(&id, Some("changed my mind")).await);

    let err = call.await.unwrap().unwrap_err();
    assert_eq!(err.code, ErrorCode::Cancelled);
}

#[tokio::test]
async fn closing_fails_outstanding_requests_with_connection_closed() {
    let server = McpServer::builder("s", "0")
        .tool(
            Tool::new("slow", "sleeps", json!({"type": "object"})),
            Arc::new(SlowTool),
        )
        .unwrap()
        .build();
    let client = connect(&server, ClientHandlers::new()).await;

    let call_client = Arc::clone(&client);
    let call = tokio::spawn(async move { call_client.call_tool("slow", None).await });
    while client.outstanding_requests().is_empty() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    client.close().await.unwrap();
    let err = call.await.unwrap().unwrap_err();
    assert_eq!(err.code, ErrorCode::ConnectionClosed);
}

#[tokio::test]
async fn resource_updates_reach_the_subscribed_client() {
    let server = McpServer::builder("s", "0")
        .resource(
            Resource {
                uri: "mem://status".into(),
                name: "status".into(),
                description: None,
                mime_type: None,
            },
            Arc::new(ResourceFn(|uri: String| async move {
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

    let updates = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&updates);
    let handlers = ClientHandlers::new().on_resource_updated(move |uri| {
        assert_eq!(uri, "mem://status");
        counted.fetch_add(1, Ordering::SeqCst);
    });
    let client = connect(&server, handlers).await;

    client.subscribe("mem://status").await.unwrap();
    assert_eq!(server.notify_resource_updated("mem://status").await, 1);

    // Delivery is asynchronous; poll briefly.
    tokio::time::timeout(Duration::from_secs(2), async {
        while updates.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("updated notification never arrived");

    client.unsubscribe("mem://status").await.unwrap();
    assert_eq!(server.notify_resource_updated("mem://status").await, 0);
}

#[tokio::test]
async fn log_floor_filters_server_log_messages() {
    let server = McpServer::builder("s", "0").build();

    let received = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&received);
    let handlers = ClientHandlers::new().on_log(move |params| {
        assert!(params.level >= LogLevel::Error);
        counted.fetch_add(1, Ordering::SeqCst);
    });
    let client = connect(&server, handlers).await;

    client.set_log_level(LogLevel::Error).await.unwrap();
    server
        .log_message(LogLevel::Info, None, json!({"drop": true}))
        .await;
    server
        .log_message(LogLevel::Error, Some("core".into()), json!({"keep": true}))
        .await;

    tokio::time::timeout(Duration::from_secs(2), async {
        while received.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("log notification never arrived");
    assert_eq!(received.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reading_resources_by_template_match() {
    let server = McpServer::builder("s", "0")
        .resource_template(
            fluxmcp_protocol::types::ResourceTemplate {
                uri_template: "mem://items/{id}".into(),
                name: "items".into(),
                description: None,
                mime_type: Some("text/plain".into()),
            },
            Arc::new(ResourceFn(|uri: String| async move {
                Ok(fluxmcp_protocol::types::ReadResourceResult {
                    contents: vec![fluxmcp_protocol::types::ResourceContents::Text {
                        uri: uri.clone(),
                        mime_type: Some("text/plain".into()),
                        text: format!("item at {uri}"),
                    }],
                })
            })),
        )
        .unwrap()
        .build();
    let client = connect(&server, ClientHandlers::new()).await;

    let result = client.read_resource("mem://items/7").await.unwrap();
    match &result.contents[0] {
        fluxmcp_protocol::types::ResourceContents::Text { text, .. } => {
            assert_eq!(text, "item at mem://items/7");
        }
        other => panic!("unexpected contents: {other:?}"),
    }

    let err = client.read_resource("mem://other/7").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidParams);
}
