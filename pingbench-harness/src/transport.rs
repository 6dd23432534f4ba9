use async_trait::async_trait;
use pingbench_bus::{Cluster, ConnectOptions};
use pingbench_client::{BusClient, ClientConfig, EchoClient, HttpClient, DEFAULT_REQUEST_TIMEOUT};
use pingbench_common::{PingBenchError, Result, DEFAULT_SERVICE_HOST};
use pingbench_server::{create_router, BusResponder};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How load workers reach the echo service.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Build the client a single publisher worker uses for all of its requests.
    async fn client(&self) -> Result<Arc<dyn EchoClient>>;

    /// Register one echo responder, returning once it can receive requests.
    /// It keeps serving until `cancel` fires.
    async fn serve(&self, cancel: CancellationToken) -> Result<()>;
}

/// Each client and responder gets its own connection to the bus.
#[derive(Debug, Clone)]
pub struct BusTransport {
    cluster: Cluster,
    urls: String,
    options: ConnectOptions,
    service: String,
    timeout: Duration,
}

impl BusTransport {
    pub fn new(cluster: Cluster, urls: impl Into<String>, options: ConnectOptions) -> Self {
        Self {
            cluster,
            urls: urls.into(),
            options,
            service: DEFAULT_SERVICE_HOST.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Transport for BusTransport {
    async fn client(&self) -> Result<Arc<dyn EchoClient>> {
        let conn = self.cluster.connect(&self.urls, self.options.clone())?;
        conn.prepare_requests().await?;
        Ok(Arc::new(BusClient::new(conn, self.service.clone()).with_timeout(self.timeout)))
    }

    async fn serve(&self, cancel: CancellationToken) -> Result<()> {
        let conn = self.cluster.connect(&self.urls, self.options.clone())?;
        BusResponder::serve(conn.clone(), &self.service, create_router(), cancel)?;
        conn.flush().await?;
        debug!(service = %self.service, node = conn.node_name(), "responder ready");
        Ok(())
    }
}

/// Clients talk HTTP to an already running echo server.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    config: ClientConfig,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn client(&self) -> Result<Arc<dyn EchoClient>> {
        Ok(Arc::new(HttpClient::new(self.config.clone())?))
    }

    async fn serve(&self, _cancel: CancellationToken) -> Result<()> {
        Err(PingBenchError::InvalidConfig(
            "responders can only be started on a bus endpoint".to_string(),
        ))
    }
}
