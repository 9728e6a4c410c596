// ABOUTME: Time-bounded cache of version vectors per replication group
//
// Only vector fetches are cached. Entries expire lazily: age is checked on
// lookup and there is no background sweep. Concurrent refreshes of one group
// are not coalesced; each stores its own result and the last write wins.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::{Call, GroupId, Report, ReportRequest, Session, Traced, VersionVector};

/// A cached vector and when it was fetched
#[derive(Debug, Clone)]
struct CacheEntry {
    vector: VersionVector,
    created: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.created.elapsed() < ttl
    }
}

/// Caches vector lookups of the inner session for `ttl`
pub struct Cacher<S> {
    inner: S,
    ttl: Duration,
    entries: RwLock<HashMap<GroupId, CacheEntry>>,
}

impl<S: Session> Cacher<S> {
    /// Wrap `inner`, keeping vectors for `ttl`
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Configured time to live for cached vectors
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lookup(&self, group: GroupId) -> Option<VersionVector> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(&group)
            .filter(|entry| entry.is_fresh(self.ttl))
            .map(|entry| entry.vector.clone())
    }

    fn store(&self, group: GroupId, vector: VersionVector) {
        let entry = CacheEntry {
            vector,
            created: Instant::now(),
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(group, entry);
    }
}

#[async_trait]
impl<S: Session> Session for Cacher<S> {
    async fn vector(&self, cancel: &CancellationToken, group: GroupId) -> Traced<VersionVector> {
        let mut call = Call::begin("Cacher.Vector");

        if let Some(vector) = self.lookup(group) {
            trace!(group = %group, "Vector cache hit");
            return call.traced(Ok(vector));
        }

        let sub = self.inner.vector(cancel, group).await;
        call.add(sub.call);
        if let Ok(vector) = &sub.result {
            self.store(group, vector.clone());
        }
        call.traced(sub.result)
    }

    async fn backlog(&self, cancel: &CancellationToken, vector: &VersionVector) -> Traced<Vec<u64>> {
        self.inner.backlog(cancel, vector).await
    }

    async fn report(&self, cancel: &CancellationToken, request: &ReportRequest) -> Traced<Report> {
        self.inner.report(cancel, request).await
    }

    async fn close(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.inner.close().await;
    }
}
