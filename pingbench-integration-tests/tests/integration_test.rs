use pingbench_bus::{Cluster, ConnectOptions};
use pingbench_client::{ClientConfig, HttpClient};
use pingbench_common::{PingBenchError, Topology};
use pingbench_harness::{
    latency, load, BenchmarkConfig, BusTransport, HttpTransport, LatencySampler, ProbeOutcome,
    ThroughputConfig,
};
use pingbench_server::{Server, ServerConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const SERVER_READY_TIMEOUT: Duration = Duration::from_secs(60);

async fn start_http_server(cancel: CancellationToken) -> String {
    let (ready_tx, ready_rx) = oneshot::channel();

    let server = Server::new(ServerConfig { address: "127.0.0.1:0".parse().unwrap() });

    tokio::spawn(async move {
        server.run(ready_tx, cancel).await.expect("server failed");
    });

    let addr = timeout(SERVER_READY_TIMEOUT, ready_rx)
        .await
        .expect("server did not start within 60 seconds")
        .expect("server ready signal dropped");

    format!("http://{}", addr)
}

fn two_node_cluster(route_delay_ms: u64) -> Cluster {
    Cluster::new(&Topology {
        nodes: vec!["east".to_string(), "west".to_string()],
        route_delay_ms,
        credentials: None,
    })
    .unwrap()
}

fn throughput_config(publishers: usize, subscribers: usize, messages: u64) -> ThroughputConfig {
    ThroughputConfig { publishers, subscribers, messages, progress: false, ..Default::default() }
}

#[tokio::test]
async fn test_latency_run_across_routed_nodes() {
    let dir = tempfile::tempdir().unwrap();
    let hist = dir.path().join("latency");
    let config = BenchmarkConfig {
        publish_url: "mem://east".to_string(),
        subscribe_url: "mem://west".to_string(),
        target_rate: 200,
        msg_size: 64,
        duration: Duration::from_secs(1),
        hist_file: Some(hist.clone()),
        ..Default::default()
    };

    let report = latency::run(&config, &two_node_cluster(30), CancellationToken::new())
        .await
        .expect("latency run failed");

    assert!(matches!(report.probe, ProbeOutcome::Routed { .. }));
    assert_eq!(report.iterations, 200);
    assert_eq!(report.summary.count(), 200);
    assert!(report.summary.value_at_quantile(0.0) <= report.summary.min());
    assert!(report.summary.value_at_quantile(100.0) >= report.summary.max());
    assert!(report.elapsed >= Duration::from_millis(500));

    let raw = std::fs::read_to_string(config.raw_path().unwrap()).unwrap();
    assert_eq!(raw.lines().count(), 200);
    assert!(raw.lines().all(|line| line.parse::<f64>().is_ok()));
    let distribution = std::fs::read_to_string(config.histogram_path().unwrap()).unwrap();
    assert!(distribution.contains("#[Total count    =          200]"));
}

#[tokio::test]
async fn test_latency_run_with_credentials() {
    let cluster = Cluster::new(&Topology {
        nodes: vec!["local".to_string()],
        route_delay_ms: 0,
        credentials: Some("letmein".to_string()),
    })
    .unwrap();
    let creds = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(creds.path(), "letmein\n").unwrap();

    let mut config = BenchmarkConfig { target_rate: 50, duration: Duration::from_secs(1), ..Default::default() };
    config.security.creds_file = Some(creds.path().to_path_buf());

    let report = latency::run(&config, &cluster, CancellationToken::new()).await.unwrap();
    assert_eq!(report.probe, ProbeOutcome::SameNode);
    assert_eq!(report.summary.count(), 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_throughput_over_the_bus() {
    let transport = BusTransport::new(two_node_cluster(0), "mem://east", ConnectOptions::default());

    let report = load::run(Arc::new(transport), &throughput_config(2, 1, 100), CancellationToken::new())
        .await
        .expect("throughput run failed");

    assert_eq!(report.total_requests, 200);
    assert!(report.throughput() > 0.0);
}

#[tokio::test]
async fn test_throughput_without_responders_fails() {
    let transport = BusTransport::new(Cluster::single("local"), "mem://local", ConnectOptions::default());

    let start = Instant::now();
    let err = load::run(Arc::new(transport), &throughput_config(1, 0, 10), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, PingBenchError::RpcFailure(_)));
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_throughput_over_http() {
    let cancel = CancellationToken::new();
    let base_url = start_http_server(cancel.clone()).await;
    let transport = HttpTransport::new(ClientConfig::new(base_url));

    let report = load::run(Arc::new(transport), &throughput_config(2, 0, 50), CancellationToken::new())
        .await
        .expect("throughput run failed");

    assert_eq!(report.total_requests, 100);
    cancel.cancel();
}

#[tokio::test]
async fn test_http_throughput_cannot_start_responders() {
    let transport = HttpTransport::new(ClientConfig::new("http://127.0.0.1:1"));

    let err = load::run(Arc::new(transport), &throughput_config(1, 1, 10), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, PingBenchError::InvalidConfig(_)));
}

#[tokio::test]
async fn test_sampler_over_http() {
    let cancel = CancellationToken::new();
    let base_url = start_http_server(cancel.clone()).await;
    let client = HttpClient::new(ClientConfig::new(base_url)).unwrap();

    let run = LatencySampler::new(Arc::new(client), 128).run(20, 1_000).await.unwrap();

    assert_eq!(run.samples.len(), 20);
    assert!(run.samples.iter().all(|&ns| ns > 0));
    cancel.cancel();
}
