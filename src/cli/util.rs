// ABOUTME: Shared CLI utilities for argument values, group lookup and deadlines
//
// Provides the count-or-infinite argument type, group resolution by name or
// identifier, and cancellation tokens that fire after a timeout.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::session::GroupId;

/// A non-negative count, or "infinite"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    Times(u64),
    Infinite,
}

impl Repeat {
    /// Interpret as a duration in seconds; zero and infinite mean no limit
    pub const fn as_timeout(self) -> Option<Duration> {
        match self {
            Self::Times(0) | Self::Infinite => None,
            Self::Times(secs) => Some(Duration::from_secs(secs)),
        }
    }
}

impl FromStr for Repeat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("infinite") || s.eq_ignore_ascii_case("inf") {
            return Ok(Self::Infinite);
        }
        s.parse::<u64>()
            .map(Self::Times)
            .map_err(|_| format!("expected a non-negative number or \"infinite\", got '{s}'"))
    }
}

impl fmt::Display for Repeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Times(n) => write!(f, "{n}"),
            Self::Infinite => f.write_str("infinite"),
        }
    }
}

/// Find a group by configured name or identifier
///
/// An identifier that is not in the configuration is still accepted.
pub fn resolve_group(config: &AppConfig, name_or_id: &str) -> Result<(String, GroupId)> {
    if let Some(group) = config.topology().group(name_or_id) {
        return Ok((group.name.clone(), group.id));
    }
    name_or_id
        .parse::<GroupId>()
        .map(|id| (id.to_string(), id))
        .map_err(|_| anyhow!("Unknown group '{name_or_id}'. Use a configured group name or a group identifier."))
}

/// Cancellation token that fires once `timeout` elapses
///
/// Dropping the returned deadline stops the timer without cancelling.
pub fn deadline(timeout: Option<Duration>) -> Deadline {
    let token = CancellationToken::new();
    let timer = timeout.map(|timeout| {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            tracing::debug!(timeout_ms = %timeout.as_millis(), "Deadline reached, cancelling");
            token.cancel();
        })
    });
    Deadline { token, timer }
}

/// A cancellation token bound to an optional timer
pub struct Deadline {
    pub token: CancellationToken,
    timer: Option<JoinHandle<()>>,
}

impl Drop for Deadline {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
