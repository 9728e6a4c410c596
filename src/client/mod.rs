// ABOUTME: Server registry owning one decorated session per server
// ABOUTME: Lazily builds session stacks, routes vector/backlog/report calls and closes them all

//! Replication Client
//!
//! The `Client` owns one fully decorated session per server and routes calls
//! to it. Sessions are created on first use and live until [`Client::close`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                         Client                          │
//! │  servers: HashMap<ServerName, Arc<dyn Session>>         │
//! │                                                         │
//! │   fs01 -> Cacher                                        │
//! │             └─ Limiter | WorkerPool                     │
//! │                  └─ RecoveringSession (optional)        │
//! │                       └─ leaf session (Connector)       │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let client = Client::new(connector, ClientConfig::default());
//! let traced = client.backlog(&cancel, "fs02", "fs01", group).await;
//! println!("{}", traced.call);
//! client.close().await;
//! ```

mod config;

pub use config::{ClientConfig, LimiterKind};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::session::{
    Cacher, Call, Connector, GroupId, Limiter, RecoveringSession, Report, ReportRequest,
    ServerName, Session, SessionError, SessionResult, Traced, VersionVector, WorkerPool,
};

/// Registry of per-server sessions
pub struct Client {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    servers: RwLock<HashMap<ServerName, Arc<dyn Session>>>,
    closed: AtomicBool,
}

impl Client {
    /// Create an empty registry; no connections are made until first use
    pub fn new(connector: Arc<dyn Connector>, config: ClientConfig) -> Self {
        Self {
            config,
            connector,
            servers: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Get the configuration applied to new sessions
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Number of servers with a live session
    pub async fn server_count(&self) -> usize {
        self.servers.read().await.len()
    }

    /// Get the session for `server`, creating it on first use
    ///
    /// Names are case-insensitive. A failed creation is not remembered, so the
    /// next call tries again. Creation connects while holding the registry
    /// write lock, so a slow server delays resolution of every other server.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] after [`Client::close`], or the error
    /// raised while connecting.
    pub async fn resolve(&self, server: &str) -> SessionResult<Arc<dyn Session>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SessionError::Closed);
        }

        let name = ServerName::new(server);

        if let Some(session) = self.servers.read().await.get(&name) {
            return Ok(Arc::clone(session));
        }

        let mut servers = self.servers.write().await;
        // close() may have drained the map while we waited for the write lock
        if self.closed.load(Ordering::SeqCst) {
            return Err(SessionError::Closed);
        }
        // Another caller may have created it while we waited for the write lock
        if let Some(session) = servers.get(&name) {
            return Ok(Arc::clone(session));
        }

        let session = self.create(&name).await?;
        servers.insert(name, Arc::clone(&session));
        Ok(session)
    }

    /// Build the decorated session stack for one server
    async fn create(&self, server: &ServerName) -> SessionResult<Arc<dyn Session>> {
        let config = &self.config;
        if config.max_concurrent_calls == 0 {
            return Err(SessionError::ZeroCapacity);
        }

        debug!(server = %server, "Connecting");
        let leaf: Box<dyn Session> = if config.recovery {
            Box::new(
                RecoveringSession::connect(
                    Arc::clone(&self.connector),
                    server.clone(),
                    config.recovery_interval,
                    config.retries,
                )
                .await?,
            )
        } else {
            self.connector.connect(server).await?
        };

        let limited: Box<dyn Session> = match config.limiter {
            LimiterKind::Semaphore => Box::new(Limiter::new(leaf, config.max_concurrent_calls)?),
            LimiterKind::WorkerPool => {
                Box::new(WorkerPool::new(leaf, config.max_concurrent_calls)?)
            }
        };

        let session: Arc<dyn Session> = match config.cache_ttl() {
            Some(ttl) => Arc::new(Cacher::new(limited, ttl)),
            None => Arc::from(limited),
        };

        info!(
            server = %server,
            limiter = ?config.limiter,
            max_concurrent_calls = config.max_concurrent_calls,
            recovery = config.recovery,
            "Session created"
        );
        Ok(session)
    }

    /// Backlog of `to` relative to `from` for every folder of `group`
    ///
    /// Fetches the destination's version vector and has the source compute
    /// the backlog against it. The vector is released once the call returns.
    pub async fn backlog(
        &self,
        cancel: &CancellationToken,
        from: &str,
        to: &str,
        group: GroupId,
    ) -> Traced<Vec<u64>> {
        let mut call = Call::begin("Client.Backlog");
        let result = self.fetch_backlog(&mut call, cancel, from, to, group).await;
        call.traced(result)
    }

    async fn fetch_backlog(
        &self,
        call: &mut Call,
        cancel: &CancellationToken,
        from: &str,
        to: &str,
        group: GroupId,
    ) -> SessionResult<Vec<u64>> {
        let source = self.resolve(from).await?;
        let destination = self.resolve(to).await?;

        let sub = destination.vector(cancel, group).await;
        call.add(sub.call);
        let vector = sub.result?;

        let sub = source.backlog(cancel, &vector).await;
        call.add(sub.call);
        sub.result
    }

    /// Version vector of `group` on `server`
    pub async fn vector(
        &self,
        cancel: &CancellationToken,
        server: &str,
        group: GroupId,
    ) -> Traced<VersionVector> {
        let mut call = Call::begin("Client.Vector");
        let session = match self.resolve(server).await {
            Ok(session) => session,
            Err(e) => return call.traced(Err(e)),
        };
        let sub = session.vector(cancel, group).await;
        call.add(sub.call);
        call.traced(sub.result)
    }

    /// Replication report from `server`
    pub async fn report(
        &self,
        cancel: &CancellationToken,
        server: &str,
        request: &ReportRequest,
    ) -> Traced<Report> {
        let mut call = Call::begin("Client.Report");
        let session = match self.resolve(server).await {
            Ok(session) => session,
            Err(e) => return call.traced(Err(e)),
        };
        let sub = session.report(cancel, request).await;
        call.add(sub.call);
        call.traced(sub.result)
    }

    /// Close every session and refuse further calls
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);

        let sessions: Vec<(ServerName, Arc<dyn Session>)> =
            self.servers.write().await.drain().collect();
        info!(server_count = sessions.len(), "Closing client");

        join_all(sessions.into_iter().map(|(server, session)| async move {
            session.close().await;
            debug!(server = %server, "Session closed");
        }))
        .await;
    }
}
