//! Queue manager — registry, pending FIFO, and worker pool lifecycle.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::queue::handler::JobHandler;
use crate::queue::worker::{self, WorkerContext};
use crate::queue::Job;

/// Items carried on the pending queue. `Shutdown` is the poison value
/// `stop()` pushes once per worker for a graceful drain.
pub(crate) enum Signal {
    Run(Uuid),
    Shutdown,
}

/// In-memory job registry, keyed by id with insertion order preserved for
/// `list()`.
#[derive(Default)]
pub(crate) struct Registry {
    jobs: HashMap<Uuid, Job>,
    order: Vec<Uuid>,
}

impl Registry {
    fn insert(&mut self, job: Job) {
        self.order.push(job.id);
        self.jobs.insert(job.id, job);
    }

    pub(crate) fn get(&self, id: &Uuid) -> Option<&Job> {
        self.jobs.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &Uuid) -> Option<&mut Job> {
        self.jobs.get_mut(id)
    }

    fn snapshot(&self) -> Vec<Job> {
        self.order
            .iter()
            .filter_map(|id| self.jobs.get(id))
            .cloned()
            .collect()
    }

    /// Drop the oldest terminal jobs beyond `cap`. Queued and processing
    /// jobs are never evicted.
    fn prune_finished(&mut self, cap: usize) {
        let terminal: Vec<Uuid> = self
            .order
            .iter()
            .copied()
            .filter(|id| {
                self.jobs
                    .get(id)
                    .is_some_and(|job| job.status.is_terminal())
            })
            .collect();

        if terminal.len() <= cap {
            return;
        }
        let excess = terminal.len() - cap;
        for id in terminal.into_iter().take(excess) {
            self.jobs.remove(&id);
        }
        self.order.retain(|id| self.jobs.contains_key(id));
    }
}

/// Accepts work, bounds parallel execution to a fixed worker pool, and
/// exposes status lookup over an in-memory registry.
///
/// Submission is fire-and-forget: failures surface only through the job
/// record, observed by polling `get`/`list`.
pub struct QueueManager {
    config: QueueConfig,
    handler: Option<Arc<dyn JobHandler>>,
    registry: Arc<RwLock<Registry>>,
    tx: mpsc::UnboundedSender<Signal>,
    /// Receiver parked here until `start()` hands it to the worker pool.
    rx: Mutex<Option<mpsc::UnboundedReceiver<Signal>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl QueueManager {
    /// Create a queue with no handler. Every dequeued job will fail with a
    /// fixed "no handler configured" error; this guards against bad
    /// startup ordering instead of crashing the pool.
    pub fn new(config: QueueConfig) -> Self {
        Self::build(config, None)
    }

    /// Create a queue that executes jobs with the given handler.
    pub fn with_handler(config: QueueConfig, handler: Arc<dyn JobHandler>) -> Self {
        Self::build(config, Some(handler))
    }

    fn build(config: QueueConfig, handler: Option<Arc<dyn JobHandler>>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            config,
            handler,
            registry: Arc::new(RwLock::new(Registry::default())),
            tx,
            rx: Mutex::new(Some(rx)),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Construct a job, store it, and append it to the pending queue.
    /// Returns the job id immediately; execution happens on the worker
    /// pool. The payload is not validated here; a malformed payload
    /// surfaces as a handler failure.
    pub async fn submit(
        &self,
        job_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Uuid {
        let job = Job::new(job_type, payload);
        let id = job.id;

        {
            let mut registry = self.registry.write().await;
            registry.insert(job);
            if let Some(cap) = self.config.max_finished_jobs {
                registry.prune_finished(cap);
            }
        }

        if self.tx.send(Signal::Run(id)).is_err() {
            // Only possible once all workers have exited and dropped the
            // receiver; the job stays queued forever.
            warn!(%id, "Pending queue is closed, job will not run");
        }
        debug!(%id, "Job submitted");
        id
    }

    /// Look up a job by id. Pure read; `None` for unknown ids.
    pub async fn get(&self, id: Uuid) -> Option<Job> {
        self.registry.read().await.get(&id).cloned()
    }

    /// Snapshot of every job in the registry, in submission order.
    pub async fn list(&self) -> Vec<Job> {
        self.registry.read().await.snapshot()
    }

    /// Spawn exactly `concurrency` workers. Must be called before any
    /// submitted job can progress; calling it a second time is an error.
    pub async fn start(&self, concurrency: usize) -> Result<(), QueueError> {
        let rx = self
            .rx
            .lock()
            .await
            .take()
            .ok_or(QueueError::AlreadyStarted)?;
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = self.workers.lock().await;
        for worker_id in 0..concurrency {
            let ctx = WorkerContext {
                worker_id,
                registry: Arc::clone(&self.registry),
                handler: self.handler.clone(),
                job_timeout: self.config.job_timeout,
            };
            workers.push(tokio::spawn(worker::run(ctx, Arc::clone(&rx))));
        }
        info!(concurrency, "Started queue workers");
        Ok(())
    }

    /// Graceful drain: push one shutdown sentinel per worker onto the
    /// queue (behind any pending jobs) and wait for every worker to exit.
    /// In-flight and already-pending jobs finish; nothing is interrupted.
    pub async fn stop(&self) {
        let mut workers = self.workers.lock().await;
        for _ in workers.iter() {
            let _ = self.tx.send(Signal::Shutdown);
        }
        let drained = workers.len();
        futures::future::join_all(workers.drain(..)).await;
        if drained > 0 {
            info!(workers = drained, "Queue workers stopped");
        }
    }
}
