// ABOUTME: Self-healing session that recreates its connection after failures
//
// Every call runs against a snapshot of the active session. On failure the
// session is recreated (rate limited, at most one recreation per failure
// generation) and the call retried until the attempt budget is spent. The last
// failed attempt schedules recreation in the background instead of blocking.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    Call, Connector, GroupId, Report, ReportRequest, ServerName, Session, SessionError,
    SessionResult, Traced, VersionVector,
};

/// Default minimum time between recreation attempts
pub const DEFAULT_RECOVERY_INTERVAL: Duration = Duration::from_secs(30);

// === Recovery State ===

/// The active session and the bookkeeping guarding its replacement
struct RecoveryState {
    active: Arc<dyn Session>,
    /// Bumped on every swap; identifies which session a caller observed
    generation: u64,
    last_attempt: Instant,
}

struct Shared {
    server: ServerName,
    connector: Arc<dyn Connector>,
    interval: Duration,
    state: RwLock<RecoveryState>,
}

impl Shared {
    async fn snapshot(&self) -> (Arc<dyn Session>, u64) {
        let state = self.state.read().await;
        (Arc::clone(&state.active), state.generation)
    }

    /// Replace the session observed at `generation`, if still permitted
    ///
    /// A no-op when another caller already swapped it or when the last attempt
    /// was less than `interval` ago.
    async fn recover(&self, generation: u64) -> SessionResult<()> {
        let mut state = self.state.write().await;

        if state.generation != generation {
            debug!(server = %self.server, "Session already recovered by another caller");
            return Ok(());
        }
        if state.last_attempt.elapsed() < self.interval {
            debug!(server = %self.server, "Skipping recovery, attempted too recently");
            return Ok(());
        }

        let result = self.connector.connect(&self.server).await;
        state.last_attempt = Instant::now();

        match result {
            Ok(session) => {
                let old = std::mem::replace(&mut state.active, Arc::from(session));
                state.generation += 1;
                tokio::spawn(async move { old.close().await });
                info!(server = %self.server, generation = state.generation, "Session recreated");
                Ok(())
            }
            Err(e) => {
                warn!(server = %self.server, error = %e, "Session recreation failed");
                Err(e)
            }
        }
    }
}

// === Recovering Session ===

/// Session wrapper that recreates the underlying session on failure
///
/// Calls are attempted up to `retries + 1` times. Between attempts the caller
/// blocks on a recreation; after the final attempt recreation continues in the
/// background and the error is returned. [`SessionError::Closed`] is never
/// retried.
pub struct RecoveringSession {
    shared: Arc<Shared>,
    attempts: u32,
}

impl RecoveringSession {
    /// Connect to `server` and wrap the session
    ///
    /// `interval` is the minimum time between recreation attempts; the
    /// initial connection counts as one.
    pub async fn connect(
        connector: Arc<dyn Connector>,
        server: ServerName,
        interval: Duration,
        retries: u32,
    ) -> SessionResult<Self> {
        let session = connector.connect(&server).await?;
        Ok(Self {
            shared: Arc::new(Shared {
                server,
                connector,
                interval,
                state: RwLock::new(RecoveryState {
                    active: Arc::from(session),
                    generation: 0,
                    last_attempt: Instant::now(),
                }),
            }),
            attempts: retries.saturating_add(1),
        })
    }

    /// Server this session is bound to
    pub fn server(&self) -> &ServerName {
        &self.shared.server
    }

    /// Number of recreations performed so far
    pub async fn generation(&self) -> u64 {
        self.shared.state.read().await.generation
    }

    async fn attempt<T, F, Fut>(&self, call: &mut Call, action: F) -> SessionResult<T>
    where
        F: Fn(Arc<dyn Session>) -> Fut + Send + Sync,
        Fut: Future<Output = Traced<T>> + Send,
        T: Send,
    {
        let mut attempt = 0;
        loop {
            let (session, generation) = self.shared.snapshot().await;
            let sub = action(session).await;
            call.add(sub.call);

            let error = match sub.result {
                Ok(value) => return Ok(value),
                Err(SessionError::Closed) => return Err(SessionError::Closed),
                Err(e) => e,
            };

            attempt += 1;
            if attempt >= self.attempts {
                let shared = Arc::clone(&self.shared);
                tokio::spawn(async move {
                    // Failure is logged inside recover and otherwise unobserved
                    let _ = shared.recover(generation).await;
                });
                return Err(error);
            }

            debug!(
                server = %self.shared.server,
                attempt,
                error = %error,
                "Call failed, recovering before retry"
            );
            self.shared.recover(generation).await?;
        }
    }
}

#[async_trait]
impl Session for RecoveringSession {
    async fn vector(&self, cancel: &CancellationToken, group: GroupId) -> Traced<VersionVector> {
        let mut call = Call::begin("RecoveringSession.Vector");
        let result = self
            .attempt(&mut call, |session| async move { session.vector(cancel, group).await })
            .await;
        call.traced(result)
    }

    async fn backlog(&self, cancel: &CancellationToken, vector: &VersionVector) -> Traced<Vec<u64>> {
        let mut call = Call::begin("RecoveringSession.Backlog");
        let result = self
            .attempt(&mut call, |session| async move { session.backlog(cancel, vector).await })
            .await;
        call.traced(result)
    }

    async fn report(&self, cancel: &CancellationToken, request: &ReportRequest) -> Traced<Report> {
        let mut call = Call::begin("RecoveringSession.Report");
        let result = self
            .attempt(&mut call, |session| async move { session.report(cancel, request).await })
            .await;
        call.traced(result)
    }

    async fn close(&self) {
        let (session, _) = self.shared.snapshot().await;
        session.close().await;
    }
}
