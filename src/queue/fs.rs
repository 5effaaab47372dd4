//! Filesystem-backed queue.
//!
//! Layout under the queue root:
//!   pending/{job_id}.json     — accepted, not yet claimed
//!   processing/{job_id}.json  — claimed by a worker, job unresolved
//!
//! The claim is a single `rename` from pending/ to processing/ — atomic on
//! POSIX filesystems, so concurrent dequeuers racing on the same entry
//! resolve to exactly one winner (the losers see NotFound and move on).
//! Writing an entry goes through a temp file in the queue root followed by a
//! rename into pending/, so a reader never observes a half-written payload.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{JobQueue, QueueEntry, QueueError, QueueStats};
use crate::store::JobStore;

pub struct FsQueue {
    pending_dir: PathBuf,
    processing_dir: PathBuf,
    tmp_dir: PathBuf,
    store: Arc<JobStore>,
}

impl FsQueue {
    /// Create the queue directories under `root` if they do not exist.
    pub async fn open(root: &Path, store: Arc<JobStore>) -> Result<Self, QueueError> {
        let queue = Self {
            pending_dir: root.join("pending"),
            processing_dir: root.join("processing"),
            tmp_dir: root.join("tmp"),
            store,
        };
        for dir in [&queue.pending_dir, &queue.processing_dir, &queue.tmp_dir] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(queue)
    }

    fn entry_name(job_id: &str) -> String {
        format!("{job_id}.json")
    }

    /// List `(path, mtime)` for every `.json` entry in `dir`, oldest first.
    async fn list_entries(dir: &Path) -> Result<Vec<(PathBuf, SystemTime)>, QueueError> {
        let mut entries = Vec::new();
        let mut rd = tokio::fs::read_dir(dir).await?;
        while let Some(ent) = rd.next_entry().await? {
            let path = ent.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let modified = ent.metadata().await?.modified()?;
            entries.push((path, modified));
        }
        entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        Ok(entries)
    }

    async fn count_entries(dir: &Path) -> Result<usize, QueueError> {
        Ok(Self::list_entries(dir).await?.len())
    }
}

#[async_trait]
impl JobQueue for FsQueue {
    async fn enqueue(&self, entry: &QueueEntry) -> Result<(), QueueError> {
        let payload = serde_json::to_vec(entry).map_err(|e| QueueError::CorruptEntry {
            job_id: entry.job_id.clone(),
            message: e.to_string(),
        })?;
        let name = Self::entry_name(&entry.job_id);
        let tmp = self.tmp_dir.join(&name);
        tokio::fs::write(&tmp, &payload).await?;
        tokio::fs::rename(&tmp, self.pending_dir.join(&name)).await?;
        debug!(job_id = %entry.job_id, "job enqueued");
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<QueueEntry>, QueueError> {
        for (path, _) in Self::list_entries(&self.pending_dir).await? {
            let name = match path.file_name() {
                Some(n) => n.to_owned(),
                None => continue,
            };
            let claimed = self.processing_dir.join(&name);

            // The atomic claim. A concurrent worker may win the race for
            // this entry; rename then fails with NotFound and we try the
            // next one.
            match tokio::fs::rename(&path, &claimed).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }

            let job_id = name
                .to_string_lossy()
                .trim_end_matches(".json")
                .to_string();
            let bytes = tokio::fs::read(&claimed).await?;
            match serde_json::from_slice::<QueueEntry>(&bytes) {
                Ok(entry) => {
                    // rename preserves mtime; rewrite the payload so the
                    // stale sweep measures age from the claim, not from
                    // enqueue.
                    tokio::fs::write(&claimed, &bytes).await?;
                    return Ok(Some(entry));
                }
                Err(e) => {
                    // Unreadable entries are logged and dropped rather than
                    // halting the dispatch loop.
                    warn!(job_id = %job_id, err = %e, "dropping unreadable queue entry");
                    tokio::fs::remove_file(&claimed).await.ok();
                    continue;
                }
            }
        }
        Ok(None)
    }

    async fn complete(&self, job_id: &str) -> Result<(), QueueError> {
        let path = self.processing_dir.join(Self::entry_name(job_id));
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn requeue_stale(&self, max_age: Duration) -> Result<usize, QueueError> {
        let now = SystemTime::now();
        let mut moved = 0;
        for (path, mtime) in Self::list_entries(&self.processing_dir).await? {
            let age = now.duration_since(mtime).unwrap_or_default();
            if age < max_age {
                continue;
            }
            let job_id = path
                .file_name()
                .map(|n| n.to_string_lossy().trim_end_matches(".json").to_string())
                .unwrap_or_default();

            // Reconcile against the Job Store before re-queueing: the worker
            // may have crashed after finishing the job but before calling
            // complete(), or the job row may be terminal for other reasons.
            match self.store.get(&job_id).await {
                Ok(row) if row.status()?.is_terminal() => {
                    debug!(job_id = %job_id, status = %row.status, "removing stale entry for terminal job");
                    tokio::fs::remove_file(&path).await.ok();
                    continue;
                }
                Ok(_) => {}
                Err(crate::store::StoreError::NotFound(_)) => {
                    warn!(job_id = %job_id, "removing orphaned queue entry with no job row");
                    tokio::fs::remove_file(&path).await.ok();
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            let target = self.pending_dir.join(path.file_name().unwrap_or_default());
            match tokio::fs::rename(&path, &target).await {
                Ok(()) => moved += 1,
                // Another sweeper got there first.
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(moved)
    }

    async fn stats(&self) -> Result<QueueStats, QueueError> {
        Ok(QueueStats {
            pending: Self::count_entries(&self.pending_dir).await?,
            in_flight: Self::count_entries(&self.processing_dir).await?,
        })
    }
}
