// ABOUTME: Behavioral tests for the full per-server session stack
// Verifies recovery, caching, concurrency bounds and close through the public Client API

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use replwatch::client::{Client, ClientConfig, LimiterKind};
use replwatch::session::{GroupId, ReportRequest, SessionError};

use super::fixtures::{load, FakeConnector};

fn client(connector: &Arc<FakeConnector>, config: ClientConfig) -> Client {
    Client::new(Arc::clone(connector) as Arc<dyn replwatch::session::Connector>, config)
}

/// A broken first session is replaced and the call retried transparently
#[tokio::test]
async fn test_recovery_cache_and_limiter_compose() {
    let connector = Arc::new(FakeConnector::new(Duration::ZERO).with_broken_sessions(1));
    let config = ClientConfig {
        cache_duration: Duration::from_secs(60),
        recovery: true,
        recovery_interval: Duration::ZERO,
        retries: 1,
        ..ClientConfig::default()
    };
    let client = client(&connector, config);
    let cancel = CancellationToken::new();
    let group = GroupId(Uuid::new_v4());

    let traced = client.vector(&cancel, "FS01", group).await;
    let vector = traced.result.clone().expect("retry against the fresh session succeeds");
    assert_eq!(vector.as_bytes(), &[4, 2]);
    assert_eq!(load(&connector.counters.connects), 2);
    assert_eq!(load(&connector.counters.calls), 2);

    // Client.Vector > Cacher.Vector > Limiter.Vector > RecoveringSession.Vector
    let recovering = &traced.call.calls[0].calls[0].calls[0];
    assert_eq!(recovering.name, "RecoveringSession.Vector");
    assert_eq!(recovering.calls.len(), 2);
    assert!(recovering.calls[0].error.is_some());
    assert!(recovering.calls[1].error.is_none());

    // Cached vector feeds the backlog; only the source is asked
    let backlog = client.backlog(&cancel, "fs02", "fs01", group).await;
    assert_eq!(backlog.result, Ok(vec![4, 2]));
    assert_eq!(load(&connector.counters.calls), 3);

    // The replaced session is closed in the background
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(load(&connector.counters.closes), 1);

    client.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_semaphore_bounds_calls_per_server() {
    let connector = Arc::new(FakeConnector::new(Duration::from_millis(20)));
    let config = ClientConfig {
        max_concurrent_calls: 2,
        ..ClientConfig::default()
    };
    let client = client(&connector, config);
    let cancel = CancellationToken::new();
    let group = GroupId(Uuid::new_v4());

    let results = join_all((0..8).map(|_| client.vector(&cancel, "fs01", group))).await;

    assert!(results.iter().all(|traced| traced.result.is_ok()));
    assert_eq!(load(&connector.counters.calls), 8);
    assert!(load(&connector.counters.max_in_flight) <= 2);
    client.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_pool_bounds_calls_per_server() {
    let connector = Arc::new(FakeConnector::new(Duration::from_millis(20)));
    let config = ClientConfig {
        max_concurrent_calls: 3,
        limiter: LimiterKind::WorkerPool,
        ..ClientConfig::default()
    };
    let client = client(&connector, config);
    let cancel = CancellationToken::new();
    let group = GroupId(Uuid::new_v4());

    let results = join_all((0..9).map(|_| client.vector(&cancel, "fs01", group))).await;

    assert!(results.iter().all(|traced| traced.result.is_ok()));
    assert!(load(&connector.counters.max_in_flight) <= 3);
    client.close().await;
    assert_eq!(load(&connector.counters.closes), 1);
}

#[tokio::test]
async fn test_report_passes_through_stack() {
    let connector = Arc::new(FakeConnector::new(Duration::ZERO));
    let config = ClientConfig {
        cache_duration: Duration::from_secs(5),
        ..ClientConfig::default()
    };
    let client = client(&connector, config);
    let request = ReportRequest {
        group: GroupId(Uuid::new_v4()),
        vector: None,
        backlog: false,
        files: true,
    };

    let report = client
        .report(&CancellationToken::new(), "fs01", &request)
        .await
        .into_result()
        .unwrap();

    assert_eq!(report.text, "files=true backlog=false");
    assert_eq!(report.data, vec![1, 2, 3]);
    client.close().await;
}

#[tokio::test]
async fn test_close_releases_every_server() {
    let connector = Arc::new(FakeConnector::new(Duration::ZERO));
    let client = client(&connector, ClientConfig::default());
    let cancel = CancellationToken::new();
    let group = GroupId(Uuid::new_v4());

    client.backlog(&cancel, "fs01", "fs02", group).await.into_result().unwrap();
    client.backlog(&cancel, "fs02", "fs03", group).await.into_result().unwrap();
    assert_eq!(client.server_count().await, 3);

    client.close().await;

    assert_eq!(load(&connector.counters.closes), 3);
    let after = client.backlog(&cancel, "fs01", "fs02", group).await;
    assert_eq!(after.result, Err(SessionError::Closed));
}
