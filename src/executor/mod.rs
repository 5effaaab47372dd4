//! Workflow execution: drives one job through its state machine.
//!
//! `Pending -> Running -> {Completed | Failed}` happens here; the `Timeout`
//! terminal state is applied by the dispatcher, which owns the wall-clock
//! budget wrapping the whole run. Steps execute strictly in order; the first
//! failing step aborts the rest. The session is closed on every exit path.

pub mod session;

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::store::{JobStore, StoreError};
use crate::workflow::{Step, WorkflowDescriptor};
use session::{BrowserSession, ExecutionError, SessionConfig, SessionFactory};

/// A file produced by a step, exposed through the artifact route.
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub url: String,
    pub filename: String,
    pub step: usize,
}

pub struct WorkflowExecutor {
    store: Arc<JobStore>,
    sessions: Arc<dyn SessionFactory>,
    /// Root directory for artifacts; each job gets a subdirectory named by
    /// its id.
    storage_path: PathBuf,
    /// Public base URL used to build artifact retrieval links.
    app_url: String,
}

impl WorkflowExecutor {
    pub fn new(
        store: Arc<JobStore>,
        sessions: Arc<dyn SessionFactory>,
        storage_path: PathBuf,
        app_url: String,
    ) -> Self {
        Self {
            store,
            sessions,
            storage_path,
            app_url,
        }
    }

    /// Execute one job end to end. All outcomes are recorded on the Job
    /// Store; this never returns an error to the dispatch loop.
    pub async fn execute(&self, job_id: &str) {
        let row = match self.store.get(job_id).await {
            Ok(row) => row,
            Err(StoreError::NotFound(_)) => {
                // Nothing to mark — the queue entry pointed at a job that
                // does not exist.
                warn!(job_id = %job_id, "queued job has no store row; skipping");
                return;
            }
            Err(e) => {
                error!(job_id = %job_id, err = %e, "failed to load job");
                return;
            }
        };

        let descriptor = match row.descriptor() {
            Ok(d) => d,
            Err(e) => {
                error!(job_id = %job_id, err = %e, "job row holds an unreadable workflow");
                let _ = self.store.mark_running(job_id).await;
                let _ = self.store.mark_failed(job_id, "stored workflow is unreadable").await;
                return;
            }
        };

        if let Err(e) = self.store.mark_running(job_id).await {
            warn!(job_id = %job_id, err = %e, "could not mark job running; skipping");
            return;
        }
        info!(
            job_id = %job_id,
            steps = descriptor.workflow.steps.len(),
            "job execution started"
        );

        match self.run_steps(job_id, &descriptor).await {
            Ok(artifacts) => {
                let result = json!({
                    "artifacts": artifacts,
                    "steps_completed": descriptor.workflow.steps.len(),
                });
                if let Err(e) = self.store.mark_completed(job_id, &result).await {
                    error!(job_id = %job_id, err = %e, "failed to record completion");
                } else {
                    info!(job_id = %job_id, artifacts = artifacts_len(&result), "job completed");
                }
            }
            Err(e) => {
                if let Err(store_err) = self.store.mark_failed(job_id, &e.message).await {
                    error!(job_id = %job_id, err = %store_err, "failed to record failure");
                } else {
                    info!(job_id = %job_id, err = %e, "job failed");
                }
            }
        }
    }

    /// Open a session, run every step in order, and close the session no
    /// matter how the steps ended.
    async fn run_steps(
        &self,
        job_id: &str,
        descriptor: &WorkflowDescriptor,
    ) -> Result<Vec<Artifact>, ExecutionError> {
        let config = SessionConfig {
            viewport: descriptor.effective_viewport(),
            user_agent: None,
            default_timeout_ms: descriptor.effective_timeout_ms(),
        };
        // Directory first: once a session is open, every path must reach
        // session.close() below.
        let artifact_dir = self.storage_path.join(job_id);
        tokio::fs::create_dir_all(&artifact_dir)
            .await
            .map_err(|e| ExecutionError::new(format!("cannot create artifact directory: {e}")))?;

        let mut session = self.sessions.open(config).await?;

        let mut artifacts = Vec::new();
        let mut outcome = Ok(());
        for (index, step) in descriptor.workflow.steps.iter().enumerate() {
            debug!(job_id = %job_id, step = index, action = step.action(), "executing step");
            match self
                .run_step(job_id, index, step, session.as_mut(), &artifact_dir)
                .await
            {
                Ok(Some(artifact)) => artifacts.push(artifact),
                Ok(None) => {}
                Err(e) => {
                    outcome = Err(ExecutionError::new(format!(
                        "step {index} ({}): {}",
                        step.action(),
                        e.message
                    )));
                    break;
                }
            }
        }

        if let Err(e) = session.close().await {
            // The job outcome stands; a close failure is only logged.
            warn!(job_id = %job_id, err = %e, "session close failed");
        }

        outcome.map(|_| artifacts)
    }

    async fn run_step(
        &self,
        job_id: &str,
        index: usize,
        step: &Step,
        session: &mut dyn BrowserSession,
        artifact_dir: &std::path::Path,
    ) -> Result<Option<Artifact>, ExecutionError> {
        match step {
            Step::Goto { url } => session.navigate(url).await.map(|_| None),
            Step::Wait { duration } => session.wait_ms(*duration).await.map(|_| None),
            Step::Click { selector } => session.click(selector).await.map(|_| None),
            Step::Type { selector, value } => session.fill(selector, value).await.map(|_| None),
            Step::WaitForSelector { selector } => {
                session.wait_for_selector(selector).await.map(|_| None)
            }
            Step::Screenshot { full_page } => {
                let filename = format!("screenshot-{index}.png");
                let path = artifact_dir.join(&filename);
                session
                    .capture_screenshot(&path, full_page.unwrap_or(false))
                    .await?;
                Ok(Some(self.artifact("screenshot", job_id, filename, index)))
            }
            Step::WaitForDownload => {
                let mut download = session.await_next_download().await?;
                let filename = format!("download-{index}-{}", download.suggested_filename());
                let path = artifact_dir.join(&filename);
                download.save_to(&path).await?;
                Ok(Some(self.artifact("download", job_id, filename, index)))
            }
            Step::Evaluate { script } => {
                // Result is logged only, never persisted as an artifact.
                let value = session.evaluate_script(script).await?;
                debug!(job_id = %job_id, step = index, result = %value, "evaluate result");
                Ok(None)
            }
        }
    }

    fn artifact(&self, kind: &'static str, job_id: &str, filename: String, step: usize) -> Artifact {
        Artifact {
            kind,
            url: format!("{}/artifacts/{job_id}/{filename}", self.app_url),
            filename,
            step,
        }
    }
}

fn artifacts_len(result: &serde_json::Value) -> usize {
    result
        .get("artifacts")
        .and_then(|a| a.as_array())
        .map(|a| a.len())
        .unwrap_or(0)
}
