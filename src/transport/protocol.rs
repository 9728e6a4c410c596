// ABOUTME: JSON-RPC 2.0 messages exchanged with the replication bridge process
//
// One request per line on the bridge's stdin, one response per line on its
// stdout. Error code -32010 means the bridge lost the server; every other
// code is a failure reported by the server itself.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::{GroupId, ServerName, SessionError, SessionResult};

/// Protocol version tag carried by every message
pub const JSONRPC_VERSION: &str = "2.0";

/// Error code the bridge uses when the server is unreachable
pub const DISCONNECTED_CODE: i64 = -32010;

/// Method names understood by the bridge
pub mod method {
    pub const CONNECT: &str = "connect";
    pub const VECTOR: &str = "vector";
    pub const BACKLOG: &str = "backlog";
    pub const REPORT: &str = "report";
}

/// Outgoing request
#[derive(Debug, Serialize)]
pub struct Request<'a, P> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: P,
}

impl<'a, P: Serialize> Request<'a, P> {
    pub const fn new(id: u64, method: &'a str, params: P) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params,
        }
    }
}

/// Incoming response; exactly one of `result` and `error` is expected
#[derive(Debug, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

/// Error object of a failed response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    /// Map to the session error callers see
    pub fn into_session_error(self, server: &ServerName) -> SessionError {
        if self.code == DISCONNECTED_CODE {
            SessionError::Disconnected(server.clone())
        } else {
            SessionError::Remote {
                code: self.code,
                message: self.message,
            }
        }
    }
}

impl Response {
    /// Decode the result payload, or convert the error object
    pub fn into_result<T: serde::de::DeserializeOwned>(
        self,
        server: &ServerName,
    ) -> SessionResult<T> {
        if let Some(error) = self.error {
            return Err(error.into_session_error(server));
        }
        let result = self.result.unwrap_or(Value::Null);
        serde_json::from_value(result)
            .map_err(|e| SessionError::Transport(format!("malformed result: {e}")))
    }
}

// === Method payloads ===

#[derive(Debug, Serialize)]
pub struct ConnectParams<'a> {
    pub server: &'a ServerName,
}

#[derive(Debug, Serialize)]
pub struct VectorParams {
    pub group: GroupId,
}

#[derive(Debug, Deserialize)]
pub struct VectorResult {
    pub vector: Vec<u8>,
}

#[derive(Debug, Serialize)]
pub struct BacklogParams<'a> {
    pub group: GroupId,
    pub vector: &'a [u8],
}

#[derive(Debug, Deserialize)]
pub struct BacklogResult {
    pub backlog: Vec<u64>,
}

#[derive(Debug, Serialize)]
pub struct ReportParams<'a> {
    pub group: GroupId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<&'a [u8]>,
    pub backlog: bool,
    pub files: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReportResult {
    #[serde(default)]
    pub data: Vec<u8>,
    #[serde(default)]
    pub text: String,
}
