// ABOUTME: Behavioral tests for driving client sweeps with the poller
// Verifies interval and on-demand sweeps, and that closing the poller closes the client

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use replwatch::client::{Client, ClientConfig};
use replwatch::poller::{PollSource, Poller};
use replwatch::session::GroupId;

use super::fixtures::{load, FakeConnector};

struct BacklogSweep {
    client: Arc<Client>,
    group: GroupId,
    sweeps: Arc<AtomicUsize>,
}

#[async_trait]
impl PollSource for BacklogSweep {
    async fn poll(&self, cancel: CancellationToken) {
        let traced = self.client.backlog(&cancel, "fs02", "fs01", self.group).await;
        assert!(traced.result.is_ok());
        self.sweeps.fetch_add(1, Ordering::SeqCst);
    }

    async fn close(&self) {
        self.client.close().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_poller_drives_sweeps_and_closes_client() {
    let connector = Arc::new(FakeConnector::new(Duration::from_millis(100)));
    let client = Arc::new(Client::new(
        Arc::clone(&connector) as Arc<dyn replwatch::session::Connector>,
        ClientConfig::default(),
    ));
    let sweeps = Arc::new(AtomicUsize::new(0));
    let source = BacklogSweep {
        client: Arc::clone(&client),
        group: GroupId(Uuid::new_v4()),
        sweeps: Arc::clone(&sweeps),
    };

    let poller = Poller::start(source, Duration::from_secs(10));
    poller.poll();
    tokio::time::sleep(Duration::from_secs(25)).await;

    // One on-demand sweep plus ticks at 10s and 20s
    assert_eq!(sweeps.load(Ordering::SeqCst), 3);
    assert_eq!(load(&connector.counters.calls), 6);

    poller.close().await;
    assert_eq!(load(&connector.counters.closes), 2);
    assert_eq!(client.server_count().await, 0);
}
