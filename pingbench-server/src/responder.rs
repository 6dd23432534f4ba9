use axum::body::{Body, Bytes};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use pingbench_bus::{BusError, Connection, Message};
use pingbench_common::{ErrorResponse, RpcRequestFrame, RpcResponseFrame};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tracing::{debug, warn};

use crate::config::MAX_BODY_SIZE;

/// Serves an axum [`Router`] to requests arriving over the bus.
///
/// Each request is an [`RpcRequestFrame`] published on the service subject with
/// a reply subject; the router's response goes back on that reply subject as an
/// [`RpcResponseFrame`]. Requests are dispatched concurrently.
pub struct BusResponder;

impl BusResponder {
    /// Subscribe to `subject` and spawn the serving loop.
    ///
    /// The subscription is registered before this returns, so a caller that
    /// signals readiness afterwards never races the first request. The loop ends
    /// when `cancel` fires or the connection is closed.
    pub fn serve(
        conn: Connection,
        subject: &str,
        router: Router,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>, BusError> {
        let mut sub = conn.subscribe(subject)?;
        debug!(subject, node = conn.node_name(), "responder registered");
        Ok(tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    _ = cancel.cancelled() => break,
                    msg = sub.next() => match msg {
                        Some(msg) => msg,
                        None => break,
                    },
                };
                let Message { subject, reply, payload } = msg;
                let Some(reply) = reply else {
                    warn!(%subject, "request without reply subject dropped");
                    continue;
                };
                let router = router.clone();
                let conn = conn.clone();
                tokio::spawn(async move {
                    let frame = dispatch(router, &payload).await;
                    match serde_json::to_vec(&frame) {
                        Ok(bytes) => {
                            if let Err(e) = conn.publish(&reply, bytes) {
                                debug!(error = %e, "reply not delivered");
                            }
                        }
                        Err(e) => warn!(error = %e, "failed to encode response frame"),
                    }
                });
            }
            debug!(subject = sub.subject(), "responder stopped");
        }))
    }
}

/// Run one request frame through `router`.
pub async fn dispatch(router: Router, payload: &[u8]) -> RpcResponseFrame {
    let frame: RpcRequestFrame = match serde_json::from_slice(payload) {
        Ok(frame) => frame,
        Err(e) => return error_frame(StatusCode::BAD_REQUEST, format!("Malformed request frame: {e}")),
    };
    let request = match Request::builder()
        .method(frame.method.as_str())
        .uri(frame.path.as_str())
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(frame.body))
    {
        Ok(request) => request,
        Err(e) => return error_frame(StatusCode::BAD_REQUEST, format!("Malformed request frame: {e}")),
    };
    let response = match router.oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    let status = response.status();
    let body: Bytes = match axum::body::to_bytes(response.into_body(), MAX_BODY_SIZE).await {
        Ok(body) => body,
        Err(e) => {
            return error_frame(StatusCode::INTERNAL_SERVER_ERROR, format!("Unreadable response: {e}"))
        }
    };
    RpcResponseFrame { status: status.as_u16(), body: String::from_utf8_lossy(&body).into_owned() }
}

fn error_frame(status: StatusCode, message: String) -> RpcResponseFrame {
    let body = serde_json::to_string(&ErrorResponse { error: message.clone() }).unwrap_or(message);
    RpcResponseFrame { status: status.as_u16(), body }
}
