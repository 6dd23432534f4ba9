use pingbench_bus::{Cluster, ConnectOptions};
use pingbench_client::ClientConfig;
use pingbench_common::{PingBenchError, PingRequest};
use pingbench_harness::{BusTransport, HttpTransport, Transport};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_bus_transport_round_trip() {
    let cluster = Cluster::single("local");
    let transport = BusTransport::new(cluster, "mem://local", ConnectOptions::default());
    let cancel = CancellationToken::new();
    transport.serve(cancel.clone()).await.unwrap();

    let client = transport.client().await.unwrap();
    let response = client.ping(PingRequest { number: 22, text: String::new() }).await.unwrap();
    assert_eq!(response.number, 22);
    cancel.cancel();
}

#[tokio::test]
async fn test_bus_transport_unknown_node_is_connection_failure() {
    let transport =
        BusTransport::new(Cluster::single("local"), "mem://elsewhere", ConnectOptions::default());
    assert!(matches!(transport.client().await, Err(PingBenchError::ConnectionFailure(_))));
    assert!(matches!(
        transport.serve(CancellationToken::new()).await,
        Err(PingBenchError::ConnectionFailure(_))
    ));
}

#[tokio::test]
async fn test_bus_transport_custom_service_without_responder_times_out() {
    let cluster = Cluster::single("local");
    let transport = BusTransport::new(cluster, "mem://local", ConnectOptions::default())
        .with_service("other.bus")
        .with_timeout(Duration::from_millis(20));
    let client = transport.client().await.unwrap();
    let err = client.ping(PingRequest { number: 1, text: String::new() }).await.unwrap_err();
    assert!(matches!(err, PingBenchError::RpcFailure(_)));
}

#[tokio::test]
async fn test_http_transport_cannot_serve() {
    let transport = HttpTransport::new(ClientConfig::new("http://127.0.0.1:8080"));
    assert!(transport.client().await.is_ok());
    assert!(matches!(
        transport.serve(CancellationToken::new()).await,
        Err(PingBenchError::InvalidConfig(_))
    ));
}
