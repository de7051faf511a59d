// src/services/queue.rs
//
// In-process job queue. Dispatch and status-check work runs on a small
// worker pool fed by an unbounded channel; delayed jobs are parked on a
// timer task before entering the channel. Handler errors are logged and the
// job is dropped; retry policy lives in the jobs themselves (the status
// check re-enqueues itself with an incremented attempt counter).

use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Initiate payouts for every finalized, unpaid record of the period.
    /// The job id is handed back to the caller that queued the run so log
    /// lines can be correlated with it.
    DispatchPayouts { job_id: Uuid, pay_period_id: Uuid },
    /// Safety-net poll for payouts that have not reported back via webhook.
    CheckPayoutStatus {
        pay_period_id: Uuid,
        transaction_ids: Vec<Uuid>,
        tracking_id: String,
        attempt: u32,
    },
}

impl Job {
    pub fn kind(&self) -> &'static str {
        match self {
            Job::DispatchPayouts { .. } => "dispatch_payouts",
            Job::CheckPayoutStatus { .. } => "check_payout_status",
        }
    }
}

#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, job: Job) -> AppResult<()>;
}

#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl JobQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Job>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn enqueue(&self, job: Job) -> AppResult<()> {
        debug!(kind = job.kind(), "Enqueueing job");
        self.tx
            .send(job)
            .map_err(|_| AppError::Internal("Job queue is closed".to_string()))
    }

    /// Park the job on a timer before it enters the queue. Fire-and-forget:
    /// if the queue has shut down by the time the timer fires, the job is
    /// dropped with a log line.
    pub fn enqueue_delayed(&self, job: Job, delay: Duration) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(job).is_err() {
                error!("Job queue closed before delayed job could run");
            }
        });
    }
}

/// Spawn `count` workers draining the shared receiver. Each worker pulls one
/// job at a time; jobs therefore run with at most `count`-way parallelism.
pub fn spawn_workers(
    rx: mpsc::UnboundedReceiver<Job>,
    handler: Arc<dyn JobHandler>,
    count: usize,
) -> Vec<JoinHandle<()>> {
    let rx = Arc::new(Mutex::new(rx));
    (0..count)
        .map(|worker_id| {
            let rx = Arc::clone(&rx);
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                loop {
                    let job = { rx.lock().await.recv().await };
                    let Some(job) = job else {
                        info!(worker_id, "Job queue closed, worker exiting");
                        break;
                    };
                    let kind = job.kind();
                    if let Err(e) = handler.handle(job).await {
                        error!(worker_id, kind, "Job failed: {}", e);
                    }
                }
            })
        })
        .collect()
}
