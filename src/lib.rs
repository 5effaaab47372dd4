pub mod config;
pub mod dispatch;
pub mod executor;
pub mod queue;
pub mod rest;
pub mod store;
pub mod templates;
pub mod workflow;

use std::sync::Arc;

use anyhow::Result;

use config::{DaemonConfig, QueueBackend};
use queue::JobQueue;
use store::JobStore;
use templates::TemplateCatalog;

/// Shared application state passed to every REST handler and background task.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<DaemonConfig>,
    pub store: Arc<JobStore>,
    pub queue: Arc<dyn JobQueue>,
    pub templates: Arc<TemplateCatalog>,
    pub started_at: std::time::Instant,
}

impl AppContext {
    pub async fn new(config: Arc<DaemonConfig>) -> Result<Self> {
        let store = Arc::new(JobStore::open(&config.data_dir).await?);
        let queue = build_queue(&config, store.clone()).await?;
        tokio::fs::create_dir_all(&config.storage_path).await?;
        Ok(Self {
            config,
            store,
            queue,
            templates: Arc::new(TemplateCatalog::builtin()),
            started_at: std::time::Instant::now(),
        })
    }
}

/// Construct the configured queue backend.
pub async fn build_queue(
    config: &DaemonConfig,
    store: Arc<JobStore>,
) -> Result<Arc<dyn JobQueue>> {
    Ok(match config.queue.backend {
        QueueBackend::Fs => Arc::new(queue::fs::FsQueue::open(&config.queue_dir(), store).await?),
        QueueBackend::Memory => Arc::new(queue::memory::MemoryQueue::new(store)),
    })
}
