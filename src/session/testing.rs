// ABOUTME: Scripted sessions for exercising decorators in unit tests
//
// A Probe is shared between a connector and every session it creates so tests
// can count calls, concurrency, closes and reconnects across recreations.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{
    Call, Connector, GroupId, Report, ReportRequest, ServerName, Session, SessionError,
    SessionResult, Traced, VersionVector,
};

#[derive(Debug, Default)]
pub(crate) struct Probe {
    pub calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub closes: AtomicUsize,
    pub connects: AtomicUsize,
}

impl Probe {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

pub(crate) struct ScriptedSession {
    probe: Arc<Probe>,
    delay: Duration,
    error: Option<SessionError>,
}

impl ScriptedSession {
    pub fn new(probe: Arc<Probe>) -> Self {
        Self {
            probe,
            delay: Duration::ZERO,
            error: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self, error: SessionError) -> Self {
        self.error = Some(error);
        self
    }

    async fn serve<T>(&self, name: &str, value: impl FnOnce(usize) -> T) -> Traced<T> {
        let call = Call::begin(name);
        let seq = self.probe.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now = self.probe.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.probe.in_flight.fetch_sub(1, Ordering::SeqCst);
        match &self.error {
            Some(error) => call.traced(Err(error.clone())),
            None => call.traced(Ok(value(seq))),
        }
    }
}

#[async_trait]
impl Session for ScriptedSession {
    async fn vector(&self, _cancel: &CancellationToken, group: GroupId) -> Traced<VersionVector> {
        self.serve("Scripted.Vector", |seq| VersionVector::new(group, seq.to_le_bytes().to_vec()))
            .await
    }

    async fn backlog(&self, _cancel: &CancellationToken, vector: &VersionVector) -> Traced<Vec<u64>> {
        let len = vector.as_bytes().len() as u64;
        self.serve("Scripted.Backlog", |_| vec![len, 0]).await
    }

    async fn report(&self, _cancel: &CancellationToken, request: &ReportRequest) -> Traced<Report> {
        let text = format!("report for {}", request.group);
        self.serve("Scripted.Report", |_| Report {
            data: vec![7],
            text,
        })
        .await
    }

    async fn close(&self) {
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Connector handing out scripted sessions that share one probe
pub(crate) struct ScriptedConnector {
    pub probe: Arc<Probe>,
    delay: Duration,
    connect_delay: Duration,
    session_error: Option<SessionError>,
    connect_error: Mutex<Option<SessionError>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self {
            probe: Arc::new(Probe::default()),
            delay: Duration::ZERO,
            connect_delay: Duration::ZERO,
            session_error: None,
            connect_error: Mutex::new(None),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    pub fn with_failing_sessions(mut self, error: SessionError) -> Self {
        self.session_error = Some(error);
        self
    }

    pub fn fail_connects(&self, error: Option<SessionError>) {
        *self.connect_error.lock().unwrap() = error;
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _server: &ServerName) -> SessionResult<Box<dyn Session>> {
        self.probe.connects.fetch_add(1, Ordering::SeqCst);
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        if let Some(error) = self.connect_error.lock().unwrap().clone() {
            return Err(error);
        }
        let mut session = ScriptedSession::new(Arc::clone(&self.probe)).with_delay(self.delay);
        if let Some(error) = &self.session_error {
            session = session.failing(error.clone());
        }
        Ok(Box::new(session))
    }
}
