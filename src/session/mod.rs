// ABOUTME: Session capability set shared by the remote leaf and every decorator
//
// A session answers three queries against one server (version vector, backlog,
// report) and can be closed. Decorators implement the same trait and own exactly
// one inner session, so they stack in any order:
// - limiter: bounds in-flight calls with a FIFO semaphore
// - pool: bounds vector fetches with a fixed set of worker tasks
// - cache: memoizes vectors per group for a fixed duration
// - recovery: recreates a broken session and retries failed calls

pub mod cache;
pub mod call;
pub mod limiter;
pub mod pool;
pub mod recovery;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub use cache::Cacher;
pub use call::{Call, Traced};
pub use limiter::Limiter;
pub use pool::WorkerPool;
pub use recovery::RecoveringSession;

// === Errors ===

/// Errors produced by sessions and their decorators
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The server could not be reached, at construction or during a call
    #[error("server {0} is disconnected or offline")]
    Disconnected(ServerName),

    /// The session is closing or already closed; never retried
    #[error("session is closing or already closed")]
    Closed,

    /// A limiter or worker pool was configured with zero slots
    #[error("zero workers were specified for the limiter")]
    ZeroCapacity,

    /// The server answered with an error
    #[error("remote call failed ({code}): {message}")]
    Remote {
        /// Protocol error code
        code: i64,
        /// Error text reported by the server
        message: String,
    },

    /// The exchange with the server broke down
    #[error("transport error: {0}")]
    Transport(String),

    /// The caller's cancellation token fired before the call completed
    #[error("call cancelled")]
    Cancelled,
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

// === Identities ===

/// Fully qualified server name, normalized to lower case
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ServerName(String);

impl ServerName {
    /// Normalize a host name into a server identity
    pub fn new(name: &str) -> Self {
        Self(name.trim().to_lowercase())
    }

    /// The normalized host name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ServerName {
    fn from(name: String) -> Self {
        Self::new(&name)
    }
}

impl From<&str> for ServerName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<ServerName> for String {
    fn from(name: ServerName) -> Self {
        name.0
    }
}

impl fmt::Display for ServerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a replication group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub Uuid);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GroupId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim_matches(|c| c == '{' || c == '}')).map(Self)
    }
}

// === Query payloads ===

/// Snapshot of one server's replication progress for one group
///
/// Cloning is cheap and shares the snapshot; dropping the last clone releases it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionVector {
    group: GroupId,
    data: Arc<[u8]>,
}

impl VersionVector {
    /// Wrap an encoded vector produced by a server
    pub fn new(group: GroupId, data: impl Into<Vec<u8>>) -> Self {
        Self {
            group,
            data: data.into().into(),
        }
    }

    /// The group this vector describes
    pub const fn group(&self) -> GroupId {
        self.group
    }

    /// The encoded vector as delivered by the server
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Parameters for a replication report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRequest {
    /// Group to report on
    pub group: GroupId,
    /// Reference vector for backlog figures
    pub vector: Option<VersionVector>,
    /// Include backlog counts in the report
    pub backlog: bool,
    /// Include per-file detail in the report
    pub files: bool,
}

/// A replication report: binary payload plus rendered text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    /// Raw report payload
    pub data: Vec<u8>,
    /// Human readable report
    pub text: String,
}

// === Capability traits ===

/// One live connection to a server, or a decorator around one
///
/// Every call returns a [`Traced`] carrying the outcome and its diagnostics
/// record. The cancellation token is forwarded untouched to the leaf session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Session: Send + Sync {
    /// Fetch the current version vector for a group
    async fn vector(&self, cancel: &CancellationToken, group: GroupId) -> Traced<VersionVector>;

    /// Compute per-folder backlog of this server relative to a vector
    async fn backlog(&self, cancel: &CancellationToken, vector: &VersionVector) -> Traced<Vec<u64>>;

    /// Produce a replication report
    async fn report(&self, cancel: &CancellationToken, request: &ReportRequest) -> Traced<Report>;

    /// Tear the session down
    async fn close(&self);
}

/// Creates leaf sessions for a server
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a session, failing with [`SessionError::Disconnected`] if unreachable
    async fn connect(&self, server: &ServerName) -> SessionResult<Box<dyn Session>>;
}

#[async_trait]
impl<S: Session + ?Sized> Session for Box<S> {
    async fn vector(&self, cancel: &CancellationToken, group: GroupId) -> Traced<VersionVector> {
        (**self).vector(cancel, group).await
    }

    async fn backlog(&self, cancel: &CancellationToken, vector: &VersionVector) -> Traced<Vec<u64>> {
        (**self).backlog(cancel, vector).await
    }

    async fn report(&self, cancel: &CancellationToken, request: &ReportRequest) -> Traced<Report> {
        (**self).report(cancel, request).await
    }

    async fn close(&self) {
        (**self).close().await;
    }
}

#[async_trait]
impl<S: Session + ?Sized> Session for Arc<S> {
    async fn vector(&self, cancel: &CancellationToken, group: GroupId) -> Traced<VersionVector> {
        (**self).vector(cancel, group).await
    }

    async fn backlog(&self, cancel: &CancellationToken, vector: &VersionVector) -> Traced<Vec<u64>> {
        (**self).backlog(cancel, vector).await
    }

    async fn report(&self, cancel: &CancellationToken, request: &ReportRequest) -> Traced<Report> {
        (**self).report(cancel, request).await
    }

    async fn close(&self) {
        (**self).close().await;
    }
}

#[cfg(test)]
pub(crate) mod testing;
