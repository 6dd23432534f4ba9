use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use pingbench_bus::{Cluster, ConnectOptions};
use pingbench_common::{ErrorResponse, PingResponse, RpcRequestFrame, RpcResponseFrame, PING_PATH};
use pingbench_server::responder::dispatch;
use pingbench_server::{create_router, handle_ping, BusResponder, Server, ServerConfig};
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

// --- Test helpers ---

/// Consume a response body into bytes.
async fn response_body(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

fn ping_frame(body: &str) -> Vec<u8> {
    serde_json::to_vec(&RpcRequestFrame {
        method: "POST".to_string(),
        path: PING_PATH.to_string(),
        body: body.to_string(),
    })
    .unwrap()
}

// --- Server struct ---

#[test]
fn test_server_creation_with_config() {
    let addr: std::net::SocketAddr = "0.0.0.0:9000".parse().unwrap();
    let server = Server::new(ServerConfig { address: addr });
    assert_eq!(server.address().to_string(), "0.0.0.0:9000");
}

#[tokio::test]
async fn test_server_signals_bound_address_and_stops_on_cancel() {
    let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
    let cancel = CancellationToken::new();
    let server = Server::new(ServerConfig { address: "127.0.0.1:0".parse().unwrap() });
    let handle = tokio::spawn(server.run(ready_tx, cancel.clone()));

    let addr = timeout(Duration::from_secs(10), ready_rx).await.unwrap().unwrap();
    assert_ne!(addr.port(), 0);

    cancel.cancel();
    let result = timeout(Duration::from_secs(10), handle).await.unwrap().unwrap();
    assert!(result.is_ok());
}

// --- handle_ping ---

#[tokio::test]
async fn test_ping_echoes_number_and_text() {
    let response = handle_ping(Bytes::from_static(br#"{"number":42,"text":"hi"}"#)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let decoded: PingResponse = serde_json::from_slice(&response_body(response).await).unwrap();
    assert_eq!(decoded, PingResponse { number: 42, text: "hi".to_string() });
}

#[tokio::test]
async fn test_ping_echoes_extreme_numbers_verbatim() {
    for number in [i64::MIN, -1, 0, i64::MAX] {
        let body = format!(r#"{{"number":{number}}}"#);
        let response = handle_ping(Bytes::from(body)).await;
        let decoded: PingResponse = serde_json::from_slice(&response_body(response).await).unwrap();
        assert_eq!(decoded.number, number);
    }
}

#[tokio::test]
async fn test_ping_rejects_malformed_body() {
    let response = handle_ping(Bytes::from_static(b"not json")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let err: ErrorResponse = serde_json::from_slice(&response_body(response).await).unwrap();
    assert!(err.error.starts_with("Invalid ping request"));
}

// --- Router ---

#[tokio::test]
async fn test_router_serves_ping_path() {
    let request = Request::post(PING_PATH)
        .header("content-type", "application/json")
        .body(Body::from(r#"{"number":7,"text":""}"#))
        .unwrap();
    let response = create_router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_router_unknown_path_is_404() {
    let request = Request::post("/nope").body(Body::empty()).unwrap();
    let response = create_router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_router_get_on_ping_path_is_405() {
    let request = Request::get(PING_PATH).body(Body::empty()).unwrap();
    let response = create_router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

// --- dispatch ---

#[tokio::test]
async fn test_dispatch_runs_frame_through_router() {
    let frame = dispatch(create_router(), &ping_frame(r#"{"number":9,"text":"x"}"#)).await;
    assert_eq!(frame.status, 200);
    let decoded: PingResponse = serde_json::from_str(&frame.body).unwrap();
    assert_eq!(decoded.number, 9);
}

#[tokio::test]
async fn test_dispatch_malformed_frame_is_400() {
    let frame = dispatch(create_router(), b"garbage").await;
    assert_eq!(frame.status, 400);
    let err: ErrorResponse = serde_json::from_str(&frame.body).unwrap();
    assert!(err.error.starts_with("Malformed request frame"));
}

// --- BusResponder ---

#[tokio::test]
async fn test_responder_replies_over_bus() {
    let cluster = Cluster::single("local");
    let server_conn = cluster.connect("mem://local", ConnectOptions::default()).unwrap();
    let client_conn = cluster.connect("mem://local", ConnectOptions::default()).unwrap();
    let cancel = CancellationToken::new();
    BusResponder::serve(server_conn, "svc.ping", create_router(), cancel.clone()).unwrap();

    let reply = client_conn
        .request("svc.ping", ping_frame(r#"{"number":123,"text":"abc"}"#), Duration::from_secs(1))
        .await
        .unwrap();
    let frame: RpcResponseFrame = serde_json::from_slice(&reply.payload).unwrap();
    assert_eq!(frame.status, 200);
    let decoded: PingResponse = serde_json::from_str(&frame.body).unwrap();
    assert_eq!(decoded, PingResponse { number: 123, text: "abc".to_string() });

    cancel.cancel();
}

#[tokio::test]
async fn test_responder_stops_on_cancel() {
    let cluster = Cluster::single("local");
    let conn = cluster.connect("mem://local", ConnectOptions::default()).unwrap();
    let cancel = CancellationToken::new();
    let handle = BusResponder::serve(conn, "svc.ping", create_router(), cancel.clone()).unwrap();

    cancel.cancel();
    timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_responder_stops_when_connection_closes() {
    let cluster = Cluster::single("local");
    let conn = cluster.connect("mem://local", ConnectOptions::default()).unwrap();
    let handle =
        BusResponder::serve(conn.clone(), "svc.ping", create_router(), CancellationToken::new())
            .unwrap();

    conn.close();
    timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
}
