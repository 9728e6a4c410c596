// ABOUTME: Tuning for the per-server session stack built by the client
//
// Defines ClientConfig with the knobs applied to every server session:
// - Concurrency bound and which limiter strategy enforces it
// - Vector cache duration
// - Session recovery and retry budget

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::duration_secs;
use crate::session::recovery::DEFAULT_RECOVERY_INTERVAL;

/// How concurrent calls to one server are bounded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LimiterKind {
    /// FIFO semaphore in front of the session
    #[default]
    Semaphore,
    /// Fixed set of worker tasks consuming a job queue
    WorkerPool,
}

/// Configuration for the sessions a client creates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    // === Concurrency ===
    /// Maximum concurrent calls per server
    pub max_concurrent_calls: usize,

    /// Strategy enforcing `max_concurrent_calls`
    pub limiter: LimiterKind,

    // === Caching ===
    /// How long fetched vectors are reused, 0 disables the cache
    #[serde(with = "duration_secs")]
    pub cache_duration: Duration,

    // === Recovery ===
    /// Recreate broken sessions and retry failed calls
    pub recovery: bool,

    /// Minimum time between recreation attempts
    #[serde(with = "duration_secs")]
    pub recovery_interval: Duration,

    /// Retries after the first failed attempt
    pub retries: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calls: 1,
            limiter: LimiterKind::Semaphore,

            cache_duration: Duration::ZERO,

            recovery: false,
            recovery_interval: DEFAULT_RECOVERY_INTERVAL,
            retries: 1,
        }
    }
}

impl ClientConfig {
    /// Cache time to live, or None when caching is disabled
    pub fn cache_ttl(&self) -> Option<Duration> {
        (!self.cache_duration.is_zero()).then_some(self.cache_duration)
    }
}
