// ABOUTME: Shared fixtures for session stack tests
//
// Provides:
// - Counters: connects, calls, concurrency and closes across all fake sessions
// - FakeConnector: hands out in-memory sessions, the first few of them broken

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use replwatch::session::{
    Call, Connector, GroupId, Report, ReportRequest, ServerName, Session, SessionError,
    SessionResult, Traced, VersionVector,
};

/// Observations shared by a connector and all sessions it created
#[derive(Debug, Default)]
pub struct Counters {
    pub connects: AtomicUsize,
    pub calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub closes: AtomicUsize,
}

/// Read a counter
pub fn load(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

/// In-memory session; a broken one fails every call with a transport error
pub struct FakeSession {
    counters: Arc<Counters>,
    delay: Duration,
    broken: bool,
}

impl FakeSession {
    async fn serve<T>(&self, name: &str, value: T) -> Traced<T> {
        let call = Call::begin(name);
        self.counters.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.broken {
            call.traced(Err(SessionError::Transport("connection reset".to_string())))
        } else {
            call.traced(Ok(value))
        }
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn vector(&self, _cancel: &CancellationToken, group: GroupId) -> Traced<VersionVector> {
        self.serve("Fake.Vector", VersionVector::new(group, vec![4, 2])).await
    }

    async fn backlog(&self, _cancel: &CancellationToken, vector: &VersionVector) -> Traced<Vec<u64>> {
        let backlog = vector.as_bytes().iter().map(|b| u64::from(*b)).collect();
        self.serve("Fake.Backlog", backlog).await
    }

    async fn report(&self, _cancel: &CancellationToken, request: &ReportRequest) -> Traced<Report> {
        let report = Report {
            data: vec![1, 2, 3],
            text: format!("files={} backlog={}", request.files, request.backlog),
        };
        self.serve("Fake.Report", report).await
    }

    async fn close(&self) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Connector whose first `broken` sessions fail every call
pub struct FakeConnector {
    pub counters: Arc<Counters>,
    delay: Duration,
    broken: usize,
}

impl FakeConnector {
    pub fn new(delay: Duration) -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            delay,
            broken: 0,
        }
    }

    pub fn with_broken_sessions(mut self, broken: usize) -> Self {
        self.broken = broken;
        self
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _server: &ServerName) -> SessionResult<Box<dyn Session>> {
        let index = self.counters.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            counters: Arc::clone(&self.counters),
            delay: self.delay,
            broken: index < self.broken,
        }))
    }
}
