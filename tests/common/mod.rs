//! Shared test fixtures: a scripted fake automation backend and store helpers.
#![allow(dead_code)] // not every test binary uses every fixture

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use orbitald::executor::session::{
    BrowserSession, DownloadHandle, ExecutionError, SessionConfig, SessionFactory,
};
use orbitald::store::JobStore;
use orbitald::workflow::WorkflowDescriptor;
use serde_json::json;
use tokio::sync::Mutex;

/// Open a job store in a temp directory. The TempDir must outlive the store.
pub async fn test_store(dir: &tempfile::TempDir) -> Arc<JobStore> {
    Arc::new(JobStore::open(dir.path()).await.expect("store opens"))
}

pub fn descriptor_from(value: serde_json::Value) -> WorkflowDescriptor {
    serde_json::from_value(value).expect("test descriptor parses")
}

/// A session factory whose sessions succeed at everything, except that any
/// action whose selector/url/script contains `fail_marker` raises an
/// ExecutionError. Every action is appended to `log`.
pub struct FakeFactory {
    pub fail_marker: Option<String>,
    pub log: Arc<Mutex<Vec<String>>>,
}

impl FakeFactory {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            fail_marker: None,
            log: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn failing_on(marker: &str) -> Arc<Self> {
        Arc::new(Self {
            fail_marker: Some(marker.to_string()),
            log: Arc::new(Mutex::new(Vec::new())),
        })
    }
}

#[async_trait]
impl SessionFactory for FakeFactory {
    async fn open(&self, config: SessionConfig) -> Result<Box<dyn BrowserSession>, ExecutionError> {
        self.log
            .lock()
            .await
            .push(format!("open {}x{}", config.viewport.width, config.viewport.height));
        Ok(Box::new(FakeSession {
            fail_marker: self.fail_marker.clone(),
            log: self.log.clone(),
        }))
    }
}

pub struct FakeSession {
    fail_marker: Option<String>,
    log: Arc<Mutex<Vec<String>>>,
}

impl FakeSession {
    async fn record(&mut self, entry: String, subject: &str) -> Result<(), ExecutionError> {
        self.log.lock().await.push(entry);
        match &self.fail_marker {
            Some(marker) if subject.contains(marker.as_str()) => {
                Err(ExecutionError::new(format!("scripted failure on {subject}")))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&mut self, url: &str) -> Result<(), ExecutionError> {
        self.record(format!("goto {url}"), url).await
    }

    async fn wait_ms(&mut self, duration: u64) -> Result<(), ExecutionError> {
        self.log.lock().await.push(format!("wait {duration}"));
        tokio::time::sleep(std::time::Duration::from_millis(duration)).await;
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<(), ExecutionError> {
        self.record(format!("click {selector}"), selector).await
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<(), ExecutionError> {
        self.record(format!("type {selector}={value}"), selector).await
    }

    async fn wait_for_selector(&mut self, selector: &str) -> Result<(), ExecutionError> {
        self.record(format!("waitForSelector {selector}"), selector).await
    }

    async fn capture_screenshot(
        &mut self,
        path: &Path,
        full_page: bool,
    ) -> Result<(), ExecutionError> {
        self.log
            .lock()
            .await
            .push(format!("screenshot full_page={full_page}"));
        tokio::fs::write(path, b"\x89PNG fake")
            .await
            .map_err(|e| ExecutionError::new(e.to_string()))
    }

    async fn await_next_download(&mut self) -> Result<Box<dyn DownloadHandle>, ExecutionError> {
        self.log.lock().await.push("waitForDownload".to_string());
        Ok(Box::new(FakeDownload))
    }

    async fn evaluate_script(&mut self, script: &str) -> Result<serde_json::Value, ExecutionError> {
        self.record(format!("evaluate {script}"), script).await?;
        Ok(json!("evaluated"))
    }

    async fn close(&mut self) -> Result<(), ExecutionError> {
        self.log.lock().await.push("close".to_string());
        Ok(())
    }
}

pub struct FakeDownload;

#[async_trait]
impl DownloadHandle for FakeDownload {
    fn suggested_filename(&self) -> String {
        "report.pdf".to_string()
    }

    async fn save_to(&mut self, path: &Path) -> Result<(), ExecutionError> {
        tokio::fs::write(path, b"%PDF fake")
            .await
            .map_err(|e| ExecutionError::new(e.to_string()))
    }
}
