use async_trait::async_trait;
use pingbench_bus::Connection;
use pingbench_common::{
    ErrorResponse, PingBenchError, PingRequest, PingResponse, Result, RpcRequestFrame,
    RpcResponseFrame, TlsOptions, PING_PATH,
};
use std::path::Path;
use std::time::Duration;

/// How long a single echo call may take before it is reported as failed.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A client of the echo service, independent of the transport it runs over.
#[async_trait]
pub trait EchoClient: Send + Sync {
    /// Send `request` and wait for the echoed response.
    async fn ping(&self, request: PingRequest) -> Result<PingResponse>;
}

/// Echo client that tunnels requests over the bus to a `BusResponder`.
pub struct BusClient {
    conn: Connection,
    service: String,
    timeout: Duration,
}

impl BusClient {
    /// Create a client sending to the responder registered on `service`.
    pub fn new(conn: Connection, service: impl Into<String>) -> Self {
        Self { conn, service: service.into(), timeout: DEFAULT_REQUEST_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn service(&self) -> &str {
        &self.service
    }
}

#[async_trait]
impl EchoClient for BusClient {
    async fn ping(&self, request: PingRequest) -> Result<PingResponse> {
        let body = serde_json::to_string(&request)
            .map_err(|e| PingBenchError::RpcFailure(e.to_string()))?;
        let frame = RpcRequestFrame { method: "POST".to_string(), path: PING_PATH.to_string(), body };
        let payload =
            serde_json::to_vec(&frame).map_err(|e| PingBenchError::RpcFailure(e.to_string()))?;

        let reply = self.conn.request(&self.service, payload, self.timeout).await?;

        let frame: RpcResponseFrame = serde_json::from_slice(&reply.payload)
            .map_err(|e| PingBenchError::RpcFailure(format!("Malformed response frame: {e}")))?;
        decode_response(frame.status, frame.body.as_bytes())
    }
}

/// HTTP echo client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub tls: TlsOptions,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), tls: TlsOptions::default(), timeout: DEFAULT_REQUEST_TIMEOUT }
    }
}

/// An HTTP echo response together with its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub content_type: Option<String>,
    pub message: PingResponse,
}

/// Echo client talking to the echo server over HTTP.
pub struct HttpClient {
    pub config: ClientConfig,
    http_client: reqwest::Client,
}

impl HttpClient {
    /// Create a new client; fails if a TLS file cannot be read or parsed.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http_client = build_http_client(&config)?;
        Ok(Self { config, http_client })
    }

    /// URL of the echo operation on the configured server.
    pub fn build_ping_url(&self) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), PING_PATH)
    }

    /// Like [`EchoClient::ping`], but keeps the response's content type.
    pub async fn ping_with_headers(&self, request: PingRequest) -> Result<HttpReply> {
        let response = self
            .http_client
            .post(self.build_ping_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| PingBenchError::RpcFailure(e.to_string()))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| PingBenchError::RpcFailure(e.to_string()))?;
        let message = decode_response(status, &body)?;
        Ok(HttpReply { content_type, message })
    }
}

#[async_trait]
impl EchoClient for HttpClient {
    async fn ping(&self, request: PingRequest) -> Result<PingResponse> {
        Ok(self.ping_with_headers(request).await?.message)
    }
}

fn build_http_client(config: &ClientConfig) -> Result<reqwest::Client> {
    let tls = &config.tls;
    let mut builder = reqwest::Client::builder().timeout(config.timeout);
    if tls.insecure {
        builder = builder.danger_accept_invalid_certs(true);
    }
    if let Some(ca_file) = &tls.ca_file {
        let pem = read_pem(ca_file)?;
        let cert = reqwest::Certificate::from_pem(&pem)
            .map_err(|e| tls_error(ca_file, e))?;
        builder = builder.add_root_certificate(cert);
    }
    match (&tls.cert_file, &tls.key_file) {
        (Some(cert_file), Some(key_file)) => {
            let cert = read_pem(cert_file)?;
            let key = read_pem(key_file)?;
            let identity = reqwest::Identity::from_pkcs8_pem(&cert, &key)
                .map_err(|e| tls_error(cert_file, e))?;
            builder = builder.identity(identity);
        }
        (None, None) => {}
        _ => {
            return Err(PingBenchError::InvalidConfig(
                "a client certificate requires both a certificate and a key file".to_string(),
            ))
        }
    }
    builder.build().map_err(|e| PingBenchError::ConnectionFailure(e.to_string()))
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        PingBenchError::ConnectionFailure(format!("Unable to read {}: {e}", path.display()))
    })
}

fn tls_error(path: &Path, err: reqwest::Error) -> PingBenchError {
    PingBenchError::ConnectionFailure(format!("Invalid TLS material in {}: {err}", path.display()))
}

/// Turn a status/body pair into the echoed response or an `RpcFailure`.
fn decode_response(status: u16, body: &[u8]) -> Result<PingResponse> {
    if !(200..300).contains(&status) {
        let error_msg = serde_json::from_slice::<ErrorResponse>(body)
            .map(|r| r.error)
            .unwrap_or_else(|_| format!("Server returned status: {status}"));
        return Err(PingBenchError::RpcFailure(format!("HTTP {status}: {error_msg}")));
    }
    serde_json::from_slice(body)
        .map_err(|e| PingBenchError::RpcFailure(format!("Malformed ping response: {e}")))
}
