use axum::{
    body::Bytes,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use pingbench_common::{ErrorResponse, PingRequest, PingResponse, PING_PATH};
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;

pub mod config;
pub mod responder;

pub use responder::BusResponder;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: SocketAddr,
}

/// Echo service over plain HTTP
pub struct Server {
    config: ServerConfig,
}

impl Server {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Get the server's configured address
    pub fn address(&self) -> SocketAddr {
        self.config.address
    }

    /// Run the server until `cancel` fires, signalling `ready_tx` with the bound
    /// address once accepting connections
    pub async fn run(
        self,
        ready_tx: tokio::sync::oneshot::Sender<SocketAddr>,
        cancel: CancellationToken,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let app = create_router();
        let listener = tokio::net::TcpListener::bind(self.config.address).await?;
        let local_addr = listener.local_addr()?;
        ready_tx.send(local_addr).ok();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;
        Ok(())
    }
}

/// Router exposing the echo operation; shared by the HTTP server and the bus responder.
pub fn create_router() -> Router {
    Router::new().route(PING_PATH, post(handle_ping))
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: message.into() })).into_response()
}

/// Handler for POST /ping.v1.PingService/Ping; returns the request unchanged.
///
/// The body is decoded by hand rather than through the `Json` extractor so that
/// frames arriving over the bus do not depend on a content-type header.
pub async fn handle_ping(body: Bytes) -> Response {
    match serde_json::from_slice::<PingRequest>(&body) {
        Ok(request) => (StatusCode::OK, Json(PingResponse::from(request))).into_response(),
        Err(e) => error_response(StatusCode::BAD_REQUEST, format!("Invalid ping request: {e}")),
    }
}
