//! Worker loop — one per concurrency slot.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::queue::handler::JobHandler;
use crate::queue::manager::{Registry, Signal};
use crate::queue::Job;

/// Fixed error recorded when a job is dequeued with no handler configured.
pub const NO_HANDLER_ERROR: &str = "no handler configured";

/// Everything a worker task needs, cloned once per slot.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub worker_id: usize,
    pub registry: Arc<RwLock<Registry>>,
    pub handler: Option<Arc<dyn JobHandler>>,
    pub job_timeout: Option<Duration>,
}

/// Run one worker until a shutdown sentinel arrives (or the queue channel
/// closes). The receiver is shared across workers behind a mutex; whichever
/// idle worker acquires it takes the next item.
pub(crate) async fn run(ctx: WorkerContext, rx: Arc<Mutex<mpsc::UnboundedReceiver<Signal>>>) {
    debug!(worker = ctx.worker_id, "Worker started");

    loop {
        let signal = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };

        match signal {
            Some(Signal::Run(job_id)) => process(&ctx, job_id).await,
            Some(Signal::Shutdown) => {
                debug!(worker = ctx.worker_id, "Worker shutting down");
                break;
            }
            None => {
                debug!(worker = ctx.worker_id, "Queue channel closed");
                break;
            }
        }
    }
}

/// Execute one job: mark it processing, invoke the handler, record the
/// outcome. A bad job or a bookkeeping error is logged and the worker
/// keeps draining the queue.
async fn process(ctx: &WorkerContext, job_id: Uuid) {
    let snapshot = {
        let mut registry = ctx.registry.write().await;
        let Some(job) = registry.get_mut(&job_id) else {
            // Should not happen in correct usage; skip rather than die.
            warn!(%job_id, "Dequeued unknown job id, skipping");
            return;
        };
        if let Err(e) = job.mark_processing() {
            warn!(%job_id, error = %e, "Could not mark job processing, skipping");
            return;
        }
        job.clone()
    };

    debug!(worker = ctx.worker_id, %job_id, job_type = %snapshot.job_type, "Job started");
    let outcome = invoke_handler(ctx, &snapshot).await;

    let mut registry = ctx.registry.write().await;
    let Some(job) = registry.get_mut(&job_id) else {
        warn!(%job_id, "Job vanished from registry before outcome was recorded");
        return;
    };

    let recorded = match outcome {
        Ok(result) => {
            info!(worker = ctx.worker_id, %job_id, "Job completed");
            job.complete(result)
        }
        Err(message) => {
            warn!(worker = ctx.worker_id, %job_id, error = %message, "Job failed");
            job.fail(message)
        }
    };
    if let Err(e) = recorded {
        warn!(%job_id, error = %e, "Could not record job outcome");
    }
}

/// Run the handler and map any failure (including a missing handler or a
/// supervisory timeout) to the error string stored on the job.
async fn invoke_handler(
    ctx: &WorkerContext,
    job: &Job,
) -> std::result::Result<serde_json::Value, String> {
    let Some(handler) = ctx.handler.as_ref() else {
        return Err(NO_HANDLER_ERROR.to_string());
    };

    match ctx.job_timeout {
        Some(limit) => match tokio::time::timeout(limit, handler.handle(job)).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(_) => Err(format!("job timed out after {}s", limit.as_secs())),
        },
        None => handler.handle(job).await.map_err(|e| e.to_string()),
    }
}
