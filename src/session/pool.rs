// ABOUTME: Worker pool decorator serving vector fetches from a fixed set of tasks
//
// N long-lived workers share one session and pull jobs from a common queue.
// A submitter waits for its job's reply, so at most N vector fetches reach the
// session at once. Backlog and report calls are not pooled and go straight to
// the shared session.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{
    Call, GroupId, Report, ReportRequest, Session, SessionError, SessionResult, Traced,
    VersionVector,
};

struct VectorJob {
    cancel: CancellationToken,
    group: GroupId,
    reply: oneshot::Sender<Traced<VersionVector>>,
}

type JobQueue = Arc<tokio::sync::Mutex<mpsc::Receiver<VectorJob>>>;

/// Pre-allocated pool of vector workers in front of one session
pub struct WorkerPool<S> {
    shared: Arc<S>,
    jobs: Mutex<Option<mpsc::Sender<VectorJob>>>,
    workers: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl<S: Session + 'static> WorkerPool<S> {
    /// Spawn `workers` tasks serving vector fetches against `inner`
    ///
    /// Must be called from within a tokio runtime. Returns
    /// [`SessionError::ZeroCapacity`] if `workers` is zero.
    pub fn new(inner: S, workers: usize) -> SessionResult<Self> {
        if workers == 0 {
            return Err(SessionError::ZeroCapacity);
        }

        let shared = Arc::new(inner);
        let (tx, rx) = mpsc::channel(workers);
        let queue: JobQueue = Arc::new(tokio::sync::Mutex::new(rx));

        let handles = (0..workers)
            .map(|id| tokio::spawn(Self::work(id, Arc::clone(&shared), Arc::clone(&queue))))
            .collect();

        Ok(Self {
            shared,
            jobs: Mutex::new(Some(tx)),
            workers: tokio::sync::Mutex::new(handles),
            size: workers,
        })
    }

    /// Number of workers in the pool
    pub const fn size(&self) -> usize {
        self.size
    }

    async fn work(id: usize, session: Arc<S>, queue: JobQueue) {
        loop {
            let job = queue.lock().await.recv().await;
            let Some(job) = job else {
                break;
            };
            let traced = session.vector(&job.cancel, job.group).await;
            // The submitter may have given up waiting
            let _ = job.reply.send(traced);
        }
        debug!(worker = id, "Vector worker stopped");
    }

    fn sender(&self) -> Option<mpsc::Sender<VectorJob>> {
        self.jobs.lock().ok().and_then(|jobs| jobs.clone())
    }
}

#[async_trait]
impl<S: Session + 'static> Session for WorkerPool<S> {
    async fn vector(&self, cancel: &CancellationToken, group: GroupId) -> Traced<VersionVector> {
        let mut call = Call::begin("WorkerPool.Vector");

        let Some(jobs) = self.sender() else {
            return call.traced(Err(SessionError::Closed));
        };
        let (reply, response) = oneshot::channel();
        let job = VectorJob {
            cancel: cancel.clone(),
            group,
            reply,
        };
        if jobs.send(job).await.is_err() {
            return call.traced(Err(SessionError::Closed));
        }
        drop(jobs);

        let Ok(sub) = response.await else {
            panic!("vector worker dropped an accepted job without replying");
        };
        call.add(sub.call);
        call.traced(sub.result)
    }

    async fn backlog(&self, cancel: &CancellationToken, vector: &VersionVector) -> Traced<Vec<u64>> {
        self.shared.backlog(cancel, vector).await
    }

    async fn report(&self, cancel: &CancellationToken, request: &ReportRequest) -> Traced<Report> {
        self.shared.report(cancel, request).await
    }

    async fn close(&self) {
        // Dropping the only sender lets workers drain the queue and exit
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.take();
        }
        let handles: Vec<_> = self.workers.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        debug!(workers = self.size, "Worker pool closed");
        self.shared.close().await;
    }
}
