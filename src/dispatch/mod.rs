//! Dispatch loop: a bounded pool of workers pulling from the queue.
//!
//! Each worker claims one entry at a time and runs the executor to
//! completion under the job's wall-clock budget. A timed-out run is
//! cancelled by dropping its future and the job is marked `timeout` —
//! distinct from `failed`. One job's failure never stops the loop. A
//! separate sweeper task periodically re-queues stale in-flight entries
//! left behind by a crashed worker.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, sleep, timeout};
use tracing::{debug, info, warn};

use crate::executor::WorkflowExecutor;
use crate::queue::{JobQueue, QueueEntry};
use crate::store::JobStore;

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Sleep between polls when the queue is empty.
    pub poll_interval: Duration,
    /// In-flight entries older than this are re-queued by the sweeper.
    pub stale_age: Duration,
    /// How often the sweeper runs.
    pub sweep_interval: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            poll_interval: Duration::from_millis(500),
            stale_age: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

pub struct Dispatcher {
    store: Arc<JobStore>,
    queue: Arc<dyn JobQueue>,
    executor: Arc<WorkflowExecutor>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        store: Arc<JobStore>,
        queue: Arc<dyn JobQueue>,
        executor: Arc<WorkflowExecutor>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            store,
            queue,
            executor,
            config,
        }
    }

    /// Spawn the worker pool and the stale-entry sweeper. Tasks exit when
    /// `shutdown` flips to `true`; in-flight jobs finish their current run
    /// first.
    pub fn start(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        info!(workers = self.config.workers, "starting dispatch workers");
        for worker_id in 0..self.config.workers {
            let dispatcher = self.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                dispatcher.run_worker(worker_id, shutdown).await;
            });
        }

        let dispatcher = self.clone();
        let sweeper_shutdown = shutdown;
        tokio::spawn(async move {
            dispatcher.run_sweeper(sweeper_shutdown).await;
        });
    }

    async fn run_worker(&self, worker_id: usize, shutdown: watch::Receiver<bool>) {
        debug!(worker_id, "worker started");
        while !*shutdown.borrow() {
            match self.queue.dequeue().await {
                Ok(Some(entry)) => self.process_entry(entry).await,
                Ok(None) => sleep(self.config.poll_interval).await,
                Err(e) => {
                    // Claim failures are logged and skipped; the loop goes on.
                    warn!(worker_id, err = %e, "dequeue failed");
                    sleep(self.config.poll_interval).await;
                }
            }
        }
        debug!(worker_id, "worker stopped");
    }

    /// Run one claimed entry to a terminal state, then release the queue
    /// entry.
    async fn process_entry(&self, entry: QueueEntry) {
        let job_id = entry.job_id.clone();
        let budget = Duration::from_millis(entry.descriptor.effective_timeout_ms());

        if timeout(budget, self.executor.execute(&job_id)).await.is_err() {
            // The execute future (and its session) was just dropped.
            warn!(job_id = %job_id, budget_ms = budget.as_millis() as u64, "job exceeded wall-clock budget");
            if let Err(e) = self.store.mark_timeout(&job_id).await {
                warn!(job_id = %job_id, err = %e, "failed to record timeout");
            }
        }

        if let Err(e) = self.queue.complete(&job_id).await {
            warn!(job_id = %job_id, err = %e, "failed to remove completed queue entry");
        }
    }

    /// Recovery sweep on a fixed interval.
    async fn run_sweeper(&self, shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.sweep_interval);
        ticker.tick().await; // immediate first tick — skip it
        while !*shutdown.borrow() {
            ticker.tick().await;
            match self.queue.requeue_stale(self.config.stale_age).await {
                Ok(moved) if moved > 0 => info!(count = moved, "re-queued stale in-flight entries"),
                Ok(_) => {}
                Err(e) => warn!(err = %e, "stale-entry sweep failed"),
            }
        }
    }
}
