use pingbench_harness::WaitGroup;
use std::time::Duration;
use tokio::time::timeout;

#[tokio::test]
async fn test_wait_on_empty_group_returns_immediately() {
    let wg = WaitGroup::new();
    timeout(Duration::from_millis(100), wg.wait()).await.unwrap();
}

#[tokio::test]
async fn test_wait_blocks_until_all_done() {
    let wg = WaitGroup::new();
    wg.add(3);
    for _ in 0..3 {
        let wg = wg.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            wg.done();
        });
    }
    timeout(Duration::from_secs(1), wg.wait()).await.unwrap();
    assert_eq!(wg.count(), 0);
}

#[tokio::test]
async fn test_wait_still_pending_with_outstanding_workers() {
    let wg = WaitGroup::new();
    wg.add(2);
    wg.done();
    assert!(timeout(Duration::from_millis(20), wg.wait()).await.is_err());
}

#[tokio::test]
async fn test_start_gate_releases_every_waiter() {
    let gate = WaitGroup::new();
    gate.add(1);
    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait().await })
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(5)).await;
    gate.done();
    for waiter in waiters {
        timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    }
}

#[test]
fn test_done_at_zero_is_noop() {
    let wg = WaitGroup::new();
    wg.done();
    assert_eq!(wg.count(), 0);
}
