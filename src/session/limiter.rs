// ABOUTME: Concurrency limiter decorator bounding in-flight calls to one server
//
// Admission is a fair tokio semaphore: callers beyond the limit queue in arrival
// order. Closing the semaphore wakes every queued caller with a closed error
// while calls that were already admitted run to completion.

use async_trait::async_trait;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{
    Call, GroupId, Report, ReportRequest, Session, SessionError, SessionResult, Traced,
    VersionVector,
};

/// Admits at most `limit` concurrent calls into the inner session
pub struct Limiter<S> {
    inner: S,
    slots: Semaphore,
    limit: usize,
}

impl<S: Session> Limiter<S> {
    /// Wrap `inner`, allowing `limit` calls in flight
    ///
    /// Returns [`SessionError::ZeroCapacity`] if `limit` is zero.
    pub fn new(inner: S, limit: usize) -> SessionResult<Self> {
        if limit == 0 {
            return Err(SessionError::ZeroCapacity);
        }
        Ok(Self {
            inner,
            slots: Semaphore::new(limit),
            limit,
        })
    }

    /// Configured number of concurrent calls
    pub const fn limit(&self) -> usize {
        self.limit
    }

    async fn admit(&self) -> SessionResult<SemaphorePermit<'_>> {
        self.slots.acquire().await.map_err(|_| SessionError::Closed)
    }
}

#[async_trait]
impl<S: Session> Session for Limiter<S> {
    async fn vector(&self, cancel: &CancellationToken, group: GroupId) -> Traced<VersionVector> {
        let mut call = Call::begin("Limiter.Vector");
        let _permit = match self.admit().await {
            Ok(permit) => permit,
            Err(e) => return call.traced(Err(e)),
        };
        let sub = self.inner.vector(cancel, group).await;
        call.add(sub.call);
        call.traced(sub.result)
    }

    async fn backlog(&self, cancel: &CancellationToken, vector: &VersionVector) -> Traced<Vec<u64>> {
        let mut call = Call::begin("Limiter.Backlog");
        let _permit = match self.admit().await {
            Ok(permit) => permit,
            Err(e) => return call.traced(Err(e)),
        };
        let sub = self.inner.backlog(cancel, vector).await;
        call.add(sub.call);
        call.traced(sub.result)
    }

    async fn report(&self, cancel: &CancellationToken, request: &ReportRequest) -> Traced<Report> {
        let mut call = Call::begin("Limiter.Report");
        let _permit = match self.admit().await {
            Ok(permit) => permit,
            Err(e) => return call.traced(Err(e)),
        };
        let sub = self.inner.report(cancel, request).await;
        call.add(sub.call);
        call.traced(sub.result)
    }

    async fn close(&self) {
        self.slots.close();
        debug!(limit = self.limit, "Limiter closed");
        self.inner.close().await;
    }
}
