use clap::Parser;
use pingbench_server::config::{DEFAULT_ADDRESS, SHUTDOWN_GRACE};
use pingbench_server::{Server, ServerConfig};
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pingbench-server", about = "Echo service for the PingBench clients")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = DEFAULT_ADDRESS)]
    address: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
    let cancel = CancellationToken::new();

    // Log "Listening on <addr>" once the server signals it is bound.
    tokio::spawn(async move {
        if let Ok(addr) = ready_rx.await {
            info!("Listening on {}", addr);
        }
    });

    let server = Server::new(ServerConfig { address: args.address });
    let mut handle = tokio::spawn(server.run(ready_tx, cancel.clone()));

    tokio::select! {
        result = &mut handle => return result?,
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }

    cancel.cancel();
    match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
        Ok(result) => result?,
        Err(_) => {
            warn!("in-flight requests did not finish within {:?}", SHUTDOWN_GRACE);
            Ok(())
        }
    }
}
