use pingbench_bus::{Cluster, ConnectOptions};
use pingbench_common::{PingBenchError, Topology};
use pingbench_harness::probe::{wait_for_route, ProbeOutcome, DEFAULT_ROUTE_WAIT, PROBE_INTERVAL};
use std::time::{Duration, Instant};

fn two_nodes(route_delay_ms: u64) -> Cluster {
    Cluster::new(&Topology {
        nodes: vec!["a".to_string(), "b".to_string()],
        route_delay_ms,
        credentials: None,
    })
    .unwrap()
}

#[tokio::test]
async fn test_same_node_publishes_nothing() {
    let cluster = Cluster::single("local");
    let publisher = cluster.connect("mem://local", ConnectOptions::default()).unwrap();
    let subscriber = cluster.connect("mem://local", ConnectOptions::default()).unwrap();

    let outcome = wait_for_route(&publisher, &subscriber, DEFAULT_ROUTE_WAIT).await.unwrap();

    assert_eq!(outcome, ProbeOutcome::SameNode);
    assert_eq!(publisher.stats().out_msgs, 0);
}

#[tokio::test]
async fn test_routes_once_interest_propagates() {
    let cluster = two_nodes(50);
    let publisher = cluster.connect("mem://a", ConnectOptions::default()).unwrap();
    let subscriber = cluster.connect("mem://b", ConnectOptions::default()).unwrap();

    let outcome = wait_for_route(&publisher, &subscriber, DEFAULT_ROUTE_WAIT).await.unwrap();

    let ProbeOutcome::Routed { attempts, elapsed } = outcome else {
        panic!("expected a routed outcome, got {outcome:?}");
    };
    // Messages sent during the first 50 ms are dropped.
    assert!(attempts > 1);
    assert!(elapsed >= Duration::from_millis(30));
    assert_eq!(publisher.stats().out_msgs, attempts);
    assert!(subscriber.stats().in_msgs >= 1);
}

#[tokio::test]
async fn test_routes_immediately_without_delay() {
    let cluster = two_nodes(0);
    let publisher = cluster.connect("mem://a", ConnectOptions::default()).unwrap();
    let subscriber = cluster.connect("mem://b", ConnectOptions::default()).unwrap();

    let outcome = wait_for_route(&publisher, &subscriber, DEFAULT_ROUTE_WAIT).await.unwrap();
    assert!(matches!(outcome, ProbeOutcome::Routed { attempts: 1, .. }), "{outcome:?}");
}

#[tokio::test]
async fn test_times_out_within_one_interval_of_max_wait() {
    let cluster = two_nodes(10_000);
    let publisher = cluster.connect("mem://a", ConnectOptions::default()).unwrap();
    let subscriber = cluster.connect("mem://b", ConnectOptions::default()).unwrap();
    let max_wait = Duration::from_millis(100);

    let start = Instant::now();
    let err = wait_for_route(&publisher, &subscriber, max_wait).await.unwrap_err();
    let took = start.elapsed();

    assert!(matches!(err, PingBenchError::RoutingTimeout { waited_ms: 100, .. }));
    assert!(took >= max_wait);
    // One poll interval plus scheduling slack.
    assert!(took < max_wait + PROBE_INTERVAL + Duration::from_millis(40), "took {took:?}");
}

#[tokio::test]
async fn test_probe_subscription_is_released() {
    let cluster = two_nodes(10_000);
    let publisher = cluster.connect("mem://a", ConnectOptions::default()).unwrap();
    let subscriber = cluster.connect("mem://b", ConnectOptions::default()).unwrap();

    let err = wait_for_route(&publisher, &subscriber, Duration::from_millis(20))
        .await
        .unwrap_err();
    let PingBenchError::RoutingTimeout { subject, .. } = err else {
        panic!("expected a routing timeout");
    };

    // A local publish would reach a live subscription immediately.
    let local = cluster.connect("mem://b", ConnectOptions::default()).unwrap();
    let before = subscriber.stats().in_msgs;
    local.publish(&subject, Vec::<u8>::new()).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(subscriber.stats().in_msgs, before);
}

#[tokio::test]
async fn test_closed_publisher_is_connection_failure() {
    let cluster = two_nodes(10_000);
    let publisher = cluster.connect("mem://a", ConnectOptions::default()).unwrap();
    let subscriber = cluster.connect("mem://b", ConnectOptions::default()).unwrap();
    publisher.close();

    let err = wait_for_route(&publisher, &subscriber, DEFAULT_ROUTE_WAIT).await.unwrap_err();
    assert!(matches!(err, PingBenchError::ConnectionFailure(_)));
}
