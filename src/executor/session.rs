//! The automation capability seam.
//!
//! The executor drives a browser only through these traits; the actual
//! browser integration lives outside this crate and is plugged in at startup.
//! Implementations must release their underlying resources on `Drop` as well
//! as on `close()` — a job that exceeds its wall-clock budget is cancelled by
//! dropping the in-flight future, and the session goes with it.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use crate::workflow::Viewport;

/// How one job's session is configured before any step runs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub viewport: Viewport,
    pub user_agent: Option<String>,
    /// Default per-interaction timeout in milliseconds (navigation waits,
    /// selector waits).
    pub default_timeout_ms: u64,
}

/// A step failed inside the automation capability. The message is recorded
/// on the job as its `error_message`.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ExecutionError {
    pub message: String,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A file download announced by the page, ready to be persisted.
#[async_trait]
pub trait DownloadHandle: Send {
    fn suggested_filename(&self) -> String;
    async fn save_to(&mut self, path: &Path) -> Result<(), ExecutionError>;
}

/// One exclusive browser session, owned by a single executor invocation.
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigate and wait for the network to go idle.
    async fn navigate(&mut self, url: &str) -> Result<(), ExecutionError>;
    async fn wait_ms(&mut self, duration: u64) -> Result<(), ExecutionError>;
    async fn click(&mut self, selector: &str) -> Result<(), ExecutionError>;
    async fn fill(&mut self, selector: &str, value: &str) -> Result<(), ExecutionError>;
    async fn wait_for_selector(&mut self, selector: &str) -> Result<(), ExecutionError>;
    async fn capture_screenshot(&mut self, path: &Path, full_page: bool)
        -> Result<(), ExecutionError>;
    async fn await_next_download(&mut self) -> Result<Box<dyn DownloadHandle>, ExecutionError>;
    async fn evaluate_script(&mut self, script: &str) -> Result<Value, ExecutionError>;
    async fn close(&mut self) -> Result<(), ExecutionError>;
}

/// Opens sessions. One factory serves the whole worker pool; each `open`
/// yields a session exclusively owned by one job execution.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self, config: SessionConfig) -> Result<Box<dyn BrowserSession>, ExecutionError>;
}

/// Placeholder factory wired when no automation backend is configured.
/// Every job fails fast with a clear message instead of hanging.
pub struct NoBackendFactory;

#[async_trait]
impl SessionFactory for NoBackendFactory {
    async fn open(&self, _config: SessionConfig) -> Result<Box<dyn BrowserSession>, ExecutionError> {
        Err(ExecutionError::new(
            "no browser automation backend is configured",
        ))
    }
}
