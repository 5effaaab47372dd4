//! Durable handoff between submission and execution.
//!
//! One `JobQueue` interface with two interchangeable backends selected by
//! configuration: a filesystem queue (durable across crashes) and an
//! in-memory queue (single-process deployments and tests). An unresolved
//! entry lives in exactly one of two locations — pending or in-flight — and
//! the claim that moves it between them is atomic, so two workers can never
//! hold the same job.

pub mod fs;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::workflow::WorkflowDescriptor;

/// A claimed queue entry: the job id plus the submission payload, carried
/// verbatim so a worker can re-hydrate the workflow after a crash without
/// consulting anything but the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub job_id: String,
    pub descriptor: WorkflowDescriptor,
}

/// Pending / in-flight depths, surfaced on the health endpoint.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub in_flight: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("queue entry for job {job_id} is unreadable: {message}")]
    CorruptEntry { job_id: String, message: String },
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Durably record `entry` in the pending location. Called once per job
    /// id by the submission path; calling it again for the same id
    /// overwrites the previous payload rather than duplicating the entry.
    async fn enqueue(&self, entry: &QueueEntry) -> Result<(), QueueError>;

    /// Atomically claim one pending entry, moving it in-flight. Returns
    /// `None` without blocking when nothing is pending. Ordering is
    /// best-effort FIFO by enqueue time.
    async fn dequeue(&self) -> Result<Option<QueueEntry>, QueueError>;

    /// Remove an in-flight entry once its job has reached a terminal state.
    async fn complete(&self, job_id: &str) -> Result<(), QueueError>;

    /// Recovery sweep: move in-flight entries older than `max_age` back to
    /// pending, reconciling against Job Store status first — entries whose
    /// job is already terminal are removed instead of re-queued, so a crash
    /// between executor completion and `complete` cannot re-execute a
    /// finished job. Returns the number of entries moved back to pending.
    async fn requeue_stale(&self, max_age: Duration) -> Result<usize, QueueError>;

    /// Current depths of both locations.
    async fn stats(&self) -> Result<QueueStats, QueueError>;
}
