use pingbench_bus::Cluster;
use pingbench_common::{PingBenchError, Topology};
use pingbench_harness::{latency, BenchmarkConfig, ProbeOutcome};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_invalid_config_fails_before_connecting() {
    let config = BenchmarkConfig { msg_size: 4, ..Default::default() };
    let err = latency::run(&config, &Cluster::single("local"), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PingBenchError::InvalidConfig(_)));
}

#[tokio::test]
async fn test_unknown_endpoint_is_connection_failure() {
    let config = BenchmarkConfig {
        subscribe_url: "mem://nowhere".to_string(),
        ..Default::default()
    };
    let err = latency::run(&config, &Cluster::single("local"), CancellationToken::new())
        .await
        .unwrap_err();
    let PingBenchError::ConnectionFailure(msg) = err else {
        panic!("expected a connection failure");
    };
    assert!(msg.starts_with("Could not connect to mem://nowhere"));
}

#[tokio::test]
async fn test_missing_credentials_are_rejected() {
    let cluster = Cluster::new(&Topology {
        nodes: vec!["local".to_string()],
        route_delay_ms: 0,
        credentials: Some("token".to_string()),
    })
    .unwrap();
    let err = latency::run(&BenchmarkConfig::default(), &cluster, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PingBenchError::ConnectionFailure(_)));
}

#[tokio::test]
async fn test_unroutable_cluster_is_routing_timeout() {
    let cluster = Cluster::new(&Topology {
        nodes: vec!["a".to_string(), "b".to_string()],
        route_delay_ms: 60_000,
        credentials: None,
    })
    .unwrap();
    let config = BenchmarkConfig {
        publish_url: "mem://a".to_string(),
        subscribe_url: "mem://b".to_string(),
        ..Default::default()
    };
    let err = latency::run(&config, &cluster, CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, PingBenchError::RoutingTimeout { .. }));
}

#[tokio::test]
async fn test_single_node_run_reports_every_sample() {
    let config = BenchmarkConfig {
        target_rate: 100,
        duration: Duration::from_secs(1),
        msg_size: 32,
        ..Default::default()
    };
    let report = latency::run(&config, &Cluster::single("local"), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.probe, ProbeOutcome::SameNode);
    assert_eq!(report.iterations, 100);
    assert_eq!(report.summary.count(), 100);
    assert!(report.summary.min() <= report.summary.max());
    assert!(report.summary.value_at_quantile(100.0) >= report.summary.max());
}
