// ABOUTME: Leaf session backed by a bridge process speaking JSON-RPC over stdio
//
// Each server gets its own bridge process. Requests are written one per line
// and answered in order, one exchange at a time. An exchange that is cancelled
// or breaks down leaves the stream in an unknown state, so the session is
// poisoned and reports the server as disconnected from then on.

use std::process::Stdio;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::protocol::{
    method, BacklogParams, BacklogResult, ConnectParams, ReportParams, ReportResult, Request,
    Response, VectorParams, VectorResult,
};
use crate::config::BridgeConfig;
use crate::session::{
    Call, Connector, GroupId, Report, ReportRequest, ServerName, Session, SessionError,
    SessionResult, Traced, VersionVector,
};

/// Placeholder in bridge arguments replaced by the server name
pub const SERVER_PLACEHOLDER: &str = "{server}";

// === Connector ===

/// Spawns one bridge process per server
#[derive(Debug, Clone)]
pub struct BridgeConnector {
    config: BridgeConfig,
}

impl BridgeConnector {
    pub const fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    fn args_for(&self, server: &ServerName) -> Vec<String> {
        self.config
            .args
            .iter()
            .map(|arg| arg.replace(SERVER_PLACEHOLDER, server.as_str()))
            .collect()
    }
}

#[async_trait]
impl Connector for BridgeConnector {
    async fn connect(&self, server: &ServerName) -> SessionResult<Box<dyn Session>> {
        let session =
            BridgeSession::spawn(&self.config.command, &self.args_for(server), server.clone())?;

        // The connect handshake is not cancellable by callers
        let cancel = CancellationToken::new();
        let params = ConnectParams { server };
        if let Err(e) = session
            .exchange::<_, serde_json::Value>(&cancel, method::CONNECT, params)
            .await
        {
            warn!(server = %server, error = %e, "Bridge handshake failed");
            session.close().await;
            return Err(e);
        }

        info!(server = %server, "Bridge session connected");
        Ok(Box::new(session))
    }
}

// === Session ===

/// The live pipe to one bridge process
struct Channel {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    next_id: u64,
    poisoned: bool,
}

impl Channel {
    async fn round_trip<P, T>(
        &mut self,
        server: &ServerName,
        method: &str,
        params: P,
    ) -> SessionResult<T>
    where
        P: Serialize + Send,
        T: DeserializeOwned + Send,
    {
        self.next_id += 1;
        let id = self.next_id;

        let mut line = serde_json::to_string(&Request::new(id, method, params))
            .map_err(|e| SessionError::Transport(format!("failed to encode request: {e}")))?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await.map_err(io_error)?;
        self.stdin.flush().await.map_err(io_error)?;

        let mut buf = String::new();
        loop {
            buf.clear();
            let read = self.stdout.read_line(&mut buf).await.map_err(io_error)?;
            if read == 0 {
                return Err(SessionError::Transport("bridge closed its output".to_string()));
            }
            if !buf.trim().is_empty() {
                break;
            }
        }

        let response: Response = serde_json::from_str(&buf)
            .map_err(|e| SessionError::Transport(format!("malformed response: {e}")))?;
        if response.id != Some(id) {
            return Err(SessionError::Transport(format!(
                "response id {:?} does not match request {id}",
                response.id
            )));
        }
        response.into_result(server)
    }
}

fn io_error(e: std::io::Error) -> SessionError {
    SessionError::Transport(e.to_string())
}

/// Remote session driven through a bridge process
pub struct BridgeSession {
    server: ServerName,
    channel: Mutex<Option<Channel>>,
}

impl BridgeSession {
    /// Start the bridge process for `server`
    pub fn spawn(command: &str, args: &[String], server: ServerName) -> SessionResult<Self> {
        if command.is_empty() {
            return Err(SessionError::Transport("bridge command is empty".to_string()));
        }

        debug!(server = %server, command = %command, args = ?args, "Spawning bridge");
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SessionError::Transport(format!("failed to start {command}: {e}")))?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(SessionError::Transport("bridge stdio unavailable".to_string()));
        };

        Ok(Self {
            server,
            channel: Mutex::new(Some(Channel {
                child,
                stdin,
                stdout: BufReader::new(stdout),
                next_id: 0,
                poisoned: false,
            })),
        })
    }

    /// Server this session talks to
    pub fn server(&self) -> &ServerName {
        &self.server
    }

    async fn exchange<P, T>(
        &self,
        cancel: &CancellationToken,
        method: &str,
        params: P,
    ) -> SessionResult<T>
    where
        P: Serialize + Send,
        T: DeserializeOwned + Send,
    {
        let mut guard = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(SessionError::Cancelled),
            guard = self.channel.lock() => guard,
        };
        let Some(channel) = guard.as_mut() else {
            return Err(SessionError::Closed);
        };
        if channel.poisoned {
            return Err(SessionError::Disconnected(self.server.clone()));
        }

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(SessionError::Cancelled),
            result = channel.round_trip(&self.server, method, params) => result,
        };

        match &result {
            Err(
                e @ (SessionError::Cancelled
                | SessionError::Transport(_)
                | SessionError::Disconnected(_)),
            ) => {
                debug!(server = %self.server, method, error = %e, "Bridge session poisoned");
                channel.poisoned = true;
            }
            _ => {}
        }
        result
    }
}

#[async_trait]
impl Session for BridgeSession {
    async fn vector(&self, cancel: &CancellationToken, group: GroupId) -> Traced<VersionVector> {
        let call = Call::begin("Bridge.Vector");
        let result = self
            .exchange::<_, VectorResult>(cancel, method::VECTOR, VectorParams { group })
            .await
            .map(|r| VersionVector::new(group, r.vector));
        call.traced(result)
    }

    async fn backlog(&self, cancel: &CancellationToken, vector: &VersionVector) -> Traced<Vec<u64>> {
        let call = Call::begin("Bridge.Backlog");
        let params = BacklogParams {
            group: vector.group(),
            vector: vector.as_bytes(),
        };
        let result = self
            .exchange::<_, BacklogResult>(cancel, method::BACKLOG, params)
            .await
            .map(|r| r.backlog);
        call.traced(result)
    }

    async fn report(&self, cancel: &CancellationToken, request: &ReportRequest) -> Traced<Report> {
        let call = Call::begin("Bridge.Report");
        let params = ReportParams {
            group: request.group,
            vector: request.vector.as_ref().map(VersionVector::as_bytes),
            backlog: request.backlog,
            files: request.files,
        };
        let result = self
            .exchange::<_, ReportResult>(cancel, method::REPORT, params)
            .await
            .map(|r| Report {
                data: r.data,
                text: r.text,
            });
        call.traced(result)
    }

    async fn close(&self) {
        let channel = self.channel.lock().await.take();
        let Some(mut channel) = channel else {
            return;
        };
        drop(channel.stdin);
        if let Err(e) = channel.child.kill().await {
            warn!(server = %self.server, error = %e, "Failed to stop bridge process");
        }
        debug!(server = %self.server, "Bridge session closed");
    }
}
