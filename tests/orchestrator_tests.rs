//! Multi-route orchestration
#![allow(clippy::expect_used, clippy::unwrap_used)]

mod support;

use std::{sync::Arc, time::Duration};

use queue_relay::{
    queue::TestQueueClient, Operation, Orchestrator, RelayError, RouteSet, Signal, Termination,
};
use tokio::sync::broadcast;

use support::{no_wait, route};

#[tokio::test(start_paused = true)]
async fn test_failed_route_does_not_stop_siblings() {
    // "b-out" is never declared, so route b fails on its first send
    let client = TestQueueClient::with_queues(["a-src", "a-out", "b-src"]);
    client.seed("a-src", ["a1", "a2"]).await.unwrap();
    client.seed("b-src", ["b1"]).await.unwrap();

    let routes = RouteSet::new(vec![
        route("a-src", &["a-out"], 1),
        route("b-src", &["b-out"], 1),
    ]);

    let (shutdown, _) = broadcast::channel(4);
    let orchestrator = Orchestrator::new(Arc::new(client.clone()), no_wait());

    let running = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { orchestrator.run(&routes, &shutdown).await })
    };

    // Route a keeps polling after route b has gone down
    client
        .wait_for_receives(5, Duration::from_secs(60))
        .await
        .unwrap();
    assert!(!running.is_finished());

    shutdown.send(Signal::Shutdown).unwrap();
    let reports = running.await.unwrap();

    assert_eq!(reports.len(), 2);

    assert_eq!(reports[0].source, "a-src");
    assert!(matches!(reports[0].termination, Termination::Shutdown));
    assert_eq!(reports[0].stats.messages, 2);

    assert_eq!(reports[1].source, "b-src");
    assert!(matches!(
        reports[1].termination,
        Termination::Failed(RelayError::Send { .. })
    ));

    assert_eq!(client.memory().bodies("a-out"), ["a1", "a2"]);
    assert_eq!(client.memory().bodies("b-src"), ["b1"]);
}

#[tokio::test]
async fn test_returns_once_every_route_failed() {
    let client = TestQueueClient::with_queues(["a-src", "b-src", "out"]);
    client.fail(Operation::Receive, "a-src");
    client.fail(Operation::Delete, "b-src");
    client.seed("b-src", ["b1"]).await.unwrap();

    let routes = RouteSet::new(vec![route("a-src", &["out"], 0), route("b-src", &["out"], 0)]);

    let (shutdown, _) = broadcast::channel(4);
    let reports = Orchestrator::new(Arc::new(client.clone()), no_wait())
        .run(&routes, &shutdown)
        .await;

    assert!(reports.iter().all(|report| report.termination.is_failure()));
    assert!(matches!(
        reports[0].termination,
        Termination::Failed(RelayError::Receive { .. })
    ));
    assert!(matches!(
        reports[1].termination,
        Termination::Failed(RelayError::Delete { .. })
    ));

    // Each route was polled exactly once before it stopped
    assert_eq!(client.count(Operation::Receive), 2);
}

#[tokio::test(start_paused = true)]
async fn test_one_poller_per_route() {
    let client = TestQueueClient::with_queues(["src", "out"]);
    let routes = RouteSet::new(vec![route("src", &["out"], 10)]);

    let (shutdown, _) = broadcast::channel(4);
    let orchestrator = Orchestrator::new(Arc::new(client.clone()), no_wait());

    let running = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { orchestrator.run(&routes, &shutdown).await })
    };

    client
        .wait_for_receives(3, Duration::from_secs(60))
        .await
        .unwrap();
    shutdown.send(Signal::Shutdown).unwrap();
    let reports = running.await.unwrap();

    // A single poller sleeping 10s between polls: 3 receives span 20s, and
    // no second poller doubles the rate.
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].stats.batches, 3);
    assert_eq!(client.count(Operation::Receive), 3);
}
