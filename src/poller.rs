// ABOUTME: Interval and on-demand poller with single-flight updates
//
// A background loop waits on a ticker, an on-demand pulse or a stop signal.
// Each accepted trigger runs the source's poll in its own task. Triggers that
// arrive while a poll is running are dropped, never queued. Closing waits for a
// running poll to finish before closing the source.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Work driven by a [`Poller`]
#[async_trait]
pub trait PollSource: Send + Sync {
    /// Perform one poll; never invoked concurrently with itself
    async fn poll(&self, cancel: CancellationToken);

    /// Release the source once polling has stopped
    async fn close(&self);
}

/// Shortest period the ticker accepts; smaller intervals are raised to it
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Default)]
struct PollerState {
    updating: bool,
    closed: bool,
}

struct Shared {
    source: Arc<dyn PollSource>,
    state: Mutex<PollerState>,
    /// Signalled whenever an update finishes
    idle: Notify,
    /// On-demand trigger
    pulse: Notify,
    stop: CancellationToken,
    /// Parent of the tokens handed to each poll
    polls: CancellationToken,
}

impl Shared {
    fn state(&self) -> std::sync::MutexGuard<'_, PollerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_update(&self) -> bool {
        let mut state = self.state();
        if state.closed || state.updating {
            return false;
        }
        state.updating = true;
        true
    }

    fn finish_update(&self) {
        self.state().updating = false;
        self.idle.notify_waiters();
    }

    async fn wait_idle(&self) {
        loop {
            let idle = self.idle.notified();
            tokio::pin!(idle);
            // Register before checking so a finish in between is not missed
            idle.as_mut().enable();
            if !self.state().updating {
                return;
            }
            idle.await;
        }
    }
}

/// Clears the updating flag even if the poll panics
struct UpdateGuard(Arc<Shared>);

impl Drop for UpdateGuard {
    fn drop(&mut self) {
        self.0.finish_update();
    }
}

/// Runs a [`PollSource`] on an interval and on demand
pub struct Poller {
    shared: Arc<Shared>,
    interval: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Poller {
    /// Start polling `source` every `interval`
    ///
    /// The first tick fires one interval after start; call [`Poller::poll`]
    /// for an immediate run. An interval below [`MIN_INTERVAL`] is raised to
    /// it. Must be called from within a tokio runtime.
    pub fn start<S: PollSource + 'static>(source: S, interval: Duration) -> Self {
        let interval = interval.max(MIN_INTERVAL);
        let shared = Arc::new(Shared {
            source: Arc::new(source),
            state: Mutex::new(PollerState::default()),
            idle: Notify::new(),
            pulse: Notify::new(),
            stop: CancellationToken::new(),
            polls: CancellationToken::new(),
        });

        let handle = tokio::spawn(Self::run(Arc::clone(&shared), interval));
        info!(interval_ms = %interval.as_millis(), "Poller started");

        Self {
            shared,
            interval,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Configured polling interval
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Request an immediate poll without waiting for it
    ///
    /// Ignored once the poller is closed; dropped if a poll is already running.
    pub fn poll(&self) {
        if !self.shared.state().closed {
            self.shared.pulse.notify_one();
        }
    }

    /// Whether [`Poller::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.shared.state().closed
    }

    /// Whether a poll is currently running
    pub fn is_updating(&self) -> bool {
        self.shared.state().updating
    }

    /// Stop polling, wait for a running poll to finish and close the source
    ///
    /// Calling close again is a no-op.
    pub async fn close(&self) {
        {
            let mut state = self.shared.state();
            if state.closed {
                return;
            }
            state.closed = true;
        }

        self.shared.stop.cancel();
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        self.shared.wait_idle().await;
        self.shared.source.close().await;
        info!("Poller closed");
    }

    async fn run(shared: Arc<Shared>, interval: Duration) {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = shared.stop.cancelled() => break,
                () = shared.pulse.notified() => {}
                _ = ticker.tick() => {}
            }
            Self::update(&shared);
        }

        debug!("Poll loop ended");
    }

    fn update(shared: &Arc<Shared>) {
        if !shared.start_update() {
            debug!("Poll still running, dropping trigger");
            return;
        }

        let guard = UpdateGuard(Arc::clone(shared));
        tokio::spawn(async move {
            let shared = Arc::clone(&guard.0);
            shared.source.poll(shared.polls.child_token()).await;
            drop(guard);
        });
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        // Stop the loop and cancel outstanding polls if never closed
        self.shared.stop.cancel();
        if !self.shared.state().closed {
            self.shared.polls.cancel();
        }
    }
}
