//! Streamable HTTP server behavior: the status-code matrix, session
//! header discipline, per-POST SSE streams, and resumable replay.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use futures::StreamExt;
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tower::ServiceExt;

use fluxmcp_protocol::jsonrpc::JsonRpcResponse;
use fluxmcp_protocol::{JsonRpcMessage, methods};
use fluxmcp_transport::streamable::{
    InMemoryEventStore, StreamableHttpServer, StreamableHttpServerConfig,
};
use fluxmcp_transport::{SendOptions, Transport, TransportCallbacks};

fn test_config() -> StreamableHttpServerConfig {
    StreamableHttpServerConfig {
        keep_alive: Duration::from_secs(600),
        ..Default::default()
    }
}

/// A server whose engine echoes an empty result to every request, like a
/// `ping`-only peer.
async fn echo_server(config: StreamableHttpServerConfig) -> Arc<StreamableHttpServer> {
    let server = Arc::new(StreamableHttpServer::new(config));
    install_echo(&server);
    server
}

fn install_echo(server: &Arc<StreamableHttpServer>) {
    let responder = Arc::clone(server);
    server.set_callbacks(TransportCallbacks::new().on_message(move |message, _auth| {
        let responder = Arc::clone(&responder);
        tokio::spawn(async move {
            if let JsonRpcMessage::Request(request) = message {
                let reply = if request.method == methods::INITIALIZE {
                    JsonRpcResponse::result(
                        request.id.clone(),
                        json!({
                            "protocolVersion": "2025-03-26",
                            "serverInfo": {"name": "s", "version": "0"},
                            "capabilities": {"logging": {}},
                        }),
                    )
                } else {
                    JsonRpcResponse::result(request.id.clone(), json!({}))
                };
                let _ = responder
                    .send(reply.into(), SendOptions::related_to(request.id))
                    .await;
            }
        });
    }));
}

fn post(body: &str) -> Request<Body> {
    Request::post("/mcp")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::ACCEPT, "application/json, text/event-stream")
        .body(Body::from(body.to_string()))
        .expect("request build")
}

fn initialize_body() -> String {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-03-26",
            "capabilities": {},
            "clientInfo": {"name": "c", "version": "0"},
        },
    })
    .to_string()
}

/// Collect `count` SSE events from a response body, failing the test if
/// they do not arrive promptly.
async fn read_sse_events(body: Body, count: usize) -> Vec<(Option<String>, Value)> {
    let mut events = Vec::new();
    let mut buffer = String::new();
    let mut stream = body.into_data_stream();

    tokio::time::timeout(Duration::from_secs(5), async {
        while events.len() < count {
            let Some(chunk) = stream.next().await else {
                break;
            };
            let chunk = chunk.expect("sse chunk");
            buffer.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(boundary) = buffer.find("\n\n") {
                let frame: String = buffer.drain(..boundary + 2).collect();
                let mut id = None;
                let mut data = String::new();
                for line in frame.lines() {
                    if let Some(value) = line.strip_prefix("id:") {
                        id = Some(value.trim_start().to_string());
                    } else if let Some(value) = line.strip_prefix("data:") {
                        data.push_str(value.trim_start());
                    }
                }
                if !data.is_empty() {
                    events.push((id, serde_json::from_str(&data).expect("event json")));
                }
            }
        }
    })
    .await
    .expect("timed out waiting for sse events");
    events
}

#[tokio::test]
async fn post_requires_both_accept_types() {
    let server = echo_server(test_config()).await;
    let request = Request::post("/mcp")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::ACCEPT, "application/json")
        .body(Body::from(initialize_body()))
        .unwrap();
    let response = server.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
}

#[tokio::test]
async fn post_requires_json_content_type() {
    let server = echo_server(test_config()).await;
    let request = Request::post("/mcp")
        .header(header::CONTENT_TYPE, "text/plain")
        .header(header::ACCEPT, "application/json, text/event-stream")
        .body(Body::from("hi"))
        .unwrap();
    let response = server.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn unparseable_body_is_400_with_parse_error() {
    let server = echo_server(test_config()).await;
    let response = server.router().oneshot(post("this is not json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["error"]["code"], -32700);
    assert_eq!(value["id"], Value::Null);
}

#[tokio::test]
async fn non_jsonrpc_body_is_400_with_invalid_request() {
    let server = echo_server(test_config()).await;
    let response = server
        .router()
        .oneshot(post(r#"{"not": "jsonrpc"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["error"]["code"], -32600);
}

#[tokio::test]
async fn notification_only_body_is_202_empty() {
    let server = echo_server(test_config()).await;
    let body = json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string();
    let response = server.router().oneshot(post(&body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert!(bytes.is_empty());
}

#[tokio::test]
async fn unsupported_method_is_405() {
    let server = echo_server(test_config()).await;
    let request = Request::put("/mcp").body(Body::empty()).unwrap();
    let response = server.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn initialize_mints_session_id_and_header_is_enforced() {
    let server = echo_server(test_config()).await;
    let router = server.router();

    let response = router.clone().oneshot(post(&initialize_body())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let session = response
        .headers()
        .get("Mcp-Session-Id")
        .expect("session header minted")
        .to_str()
        .unwrap()
        .to_string();
    assert!(session.starts_with("mcp-"));

    // Missing header on a later request: 400.
    let ping = json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}).to_string();
    let response = router.clone().oneshot(post(&ping)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Wrong header: 404.
    let mut request = post(&ping);
    request
        .headers_mut()
        .insert("Mcp-Session-Id", "mcp-who-is-this".parse().unwrap());
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Correct header: dispatched.
    let mut request = post(&ping);
    request
        .headers_mut()
        .insert("Mcp-Session-Id", session.parse().unwrap());
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn session_tracking_can_be_disabled() {
    let server = echo_server(StreamableHttpServerConfig {
        session_tracking: false,
        ..test_config()
    })
    .await;
    let router = server.router();

    let response = router.clone().oneshot(post(&initialize_body())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("Mcp-Session-Id").is_none());

    // Follow-up requests need no header.
    let ping = json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}).to_string();
    let response = router.oneshot(post(&ping)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn concurrent_requests_share_one_stream_then_it_closes() {
    let server = echo_server(StreamableHttpServerConfig {
        session_tracking: false,
        ..test_config()
    })
    .await;

    let batch = json!([
        {"jsonrpc": "2.0", "id": 1, "method": "ping"},
        {"jsonrpc": "2.0", "id": 2, "method": "ping"},
    ])
    .to_string();
    let response = server.router().oneshot(post(&batch)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/event-stream"))
    );

    let events = read_sse_events(response.into_body(), 2).await;
    let mut ids: Vec<i64> = events
        .iter()
        .map(|(_, value)| value["id"].as_i64().unwrap())
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn json_mode_buffers_replies_into_one_body() {
    let server = echo_server(StreamableHttpServerConfig {
        session_tracking: false,
        json_response: true,
        ..test_config()
    })
    .await;

    // One request: a single JSON object.
    let single = json!({"jsonrpc": "2.0", "id": 7, "method": "ping"}).to_string();
    let response = server.router().oneshot(post(&single)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["id"], 7);
    assert!(value.get("result").is_some());

    // A batch: a JSON array with one reply per request.
    let batch = json!([
        {"jsonrpc": "2.0", "id": 8, "method": "ping"},
        {"jsonrpc": "2.0", "id": 9, "method": "ping"},
    ])
    .to_string();
    let response = server.router().oneshot(post(&batch)).await.unwrap();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value.as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn standalone_get_needs_event_stream_accept_and_is_exclusive() {
    let server = echo_server(StreamableHttpServerConfig {
        session_tracking: false,
        ..test_config()
    })
    .await;
    let router = server.router();

    let bad_accept = Request::get("/mcp")
        .header(header::ACCEPT, "application/json")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(bad_accept).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);

    let open = |router: axum::Router| async move {
        router
            .oneshot(
                Request::get("/mcp")
                    .header(header::ACCEPT, "text/event-stream")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    };

    let first = open(router.clone()).await;
    assert_eq!(first.status(), StatusCode::OK);

    // A second standalone stream for the same session is refused.
    let second = open(router.clone()).await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    drop(first);
}

#[tokio::test]
async fn delete_terminates_the_session() {
    let server = echo_server(StreamableHttpServerConfig {
        session_tracking: false,
        ..test_config()
    })
    .await;
    let router = server.router();

    let response = router
        .clone()
        .oneshot(Request::delete("/mcp").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // The session is gone; everything afterwards is 404.
    let ping = json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}).to_string();
    let response = router.oneshot(post(&ping)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reconnect_with_last_event_id_replays_missed_events_in_order() {
    let store = Arc::new(InMemoryEventStore::new());
    let server = Arc::new(StreamableHttpServer::with_event_store(
        StreamableHttpServerConfig {
            session_tracking: false,
            ..test_config()
        },
        Arc::clone(&store) as _,
    ));
    install_echo(&server);
    server.start().await.unwrap();

    // Five server-initiated notifications land in the standalone stream's
    // log while no client is attached.
    for n in 1..=5 {
        let notification = fluxmcp_protocol::jsonrpc::JsonRpcNotification::new(
            "notifications/message",
            Some(json!({"level": "info", "data": {"n": n}})),
        );
        server
            .send(notification.into(), SendOptions::default())
            .await
            .unwrap();
    }

    // A client that saw events up to id 2 reconnects.
    let response = server
        .router()
        .oneshot(
            Request::get("/mcp")
                .header(header::ACCEPT, "text/event-stream")
                .header("Last-Event-Id", "2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let events = read_sse_events(response.into_body(), 3).await;
    let ids: Vec<u64> = events
        .iter()
        .map(|(id, _)| id.as_deref().unwrap().parse().unwrap())
        .collect();
    assert_eq!(ids, vec![3, 4, 5]);
    let payloads: Vec<i64> = events
        .iter()
        .map(|(_, value)| value["params"]["data"]["n"].as_i64().unwrap())
        .collect();
    assert_eq!(payloads, vec![3, 4, 5]);
}

#[tokio::test]
async fn live_responses_never_ride_the_standalone_stream() {
    let server = echo_server(StreamableHttpServerConfig {
        session_tracking: false,
        ..test_config()
    })
    .await;
    server.start().await.unwrap();

    let reply = JsonRpcResponse::result(fluxmcp_protocol::RequestId::from(1), json!({}));
    let result = server.send(reply.into(), SendOptions::default()).await;
    assert!(result.is_err(), "response without related id is a protocol error");
}
