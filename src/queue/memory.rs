//! In-memory queue backend.
//!
//! Same contract as the filesystem queue behind one mutex: the claim pops
//! from the pending deque and records the in-flight entry in a single
//! critical section, which makes it atomic with respect to other workers.
//! Entries do not survive a process restart — pick the filesystem backend
//! when crash recovery matters.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{JobQueue, QueueEntry, QueueError, QueueStats};
use crate::store::JobStore;

#[derive(Default)]
struct State {
    pending: VecDeque<QueueEntry>,
    in_flight: HashMap<String, (QueueEntry, Instant)>,
}

pub struct MemoryQueue {
    state: Mutex<State>,
    store: Arc<JobStore>,
}

impl MemoryQueue {
    pub fn new(store: Arc<JobStore>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            store,
        }
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, entry: &QueueEntry) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        // Same id again replaces the old payload instead of duplicating.
        state.pending.retain(|e| e.job_id != entry.job_id);
        state.pending.push_back(entry.clone());
        debug!(job_id = %entry.job_id, "job enqueued");
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<QueueEntry>, QueueError> {
        let mut state = self.state.lock().await;
        match state.pending.pop_front() {
            Some(entry) => {
                state
                    .in_flight
                    .insert(entry.job_id.clone(), (entry.clone(), Instant::now()));
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    async fn complete(&self, job_id: &str) -> Result<(), QueueError> {
        self.state.lock().await.in_flight.remove(job_id);
        Ok(())
    }

    async fn requeue_stale(&self, max_age: Duration) -> Result<usize, QueueError> {
        // Collect candidates first; the store lookups happen outside the lock.
        let stale: Vec<QueueEntry> = {
            let state = self.state.lock().await;
            state
                .in_flight
                .values()
                .filter(|(_, claimed_at)| claimed_at.elapsed() >= max_age)
                .map(|(entry, _)| entry.clone())
                .collect()
        };

        let mut moved = 0;
        for entry in stale {
            let requeue = match self.store.get(&entry.job_id).await {
                Ok(row) if row.status()?.is_terminal() => {
                    debug!(job_id = %entry.job_id, status = %row.status, "dropping stale entry for terminal job");
                    false
                }
                Ok(_) => true,
                Err(crate::store::StoreError::NotFound(_)) => {
                    warn!(job_id = %entry.job_id, "dropping orphaned queue entry with no job row");
                    false
                }
                Err(e) => return Err(e.into()),
            };

            let mut state = self.state.lock().await;
            if state.in_flight.remove(&entry.job_id).is_some() && requeue {
                state.pending.push_back(entry);
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn stats(&self) -> Result<QueueStats, QueueError> {
        let state = self.state.lock().await;
        Ok(QueueStats {
            pending: state.pending.len(),
            in_flight: state.in_flight.len(),
        })
    }
}
