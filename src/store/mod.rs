//! Durable job records (SQLite).
//!
//! The store owns every `automation_jobs` row. Lifecycle transitions are
//! single guarded `UPDATE` statements: the `WHERE` clause names the states
//! the transition may leave, so a terminal row can never be mutated again
//! no matter how many workers race on it — the losing update simply affects
//! zero rows.

use std::path::Path;
use std::str::FromStr;

use anyhow::Context as _;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};
use uuid::Uuid;

use crate::workflow::WorkflowDescriptor;

/// Job lifecycle states. `Completed`, `Failed`, and `Timeout` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Timeout,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Timeout => "timeout",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Timeout)
    }
}

impl FromStr for JobStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, StoreError> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "timeout" => Ok(JobStatus::Timeout),
            other => Err(StoreError::CorruptRow(format!("unknown status {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct JobRow {
    pub id: String,
    pub status: String,
    pub workflow_json: String,
    pub result_json: Option<String>,
    pub error_message: Option<String>,
    pub attempts: i64,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl JobRow {
    pub fn status(&self) -> Result<JobStatus, StoreError> {
        self.status.parse()
    }

    /// Deserialize the persisted descriptor. The row was written from a
    /// validated descriptor, so failure here means external tampering.
    pub fn descriptor(&self) -> Result<WorkflowDescriptor, StoreError> {
        serde_json::from_str(&self.workflow_json)
            .map_err(|e| StoreError::CorruptRow(format!("workflow_json: {e}")))
    }
}

/// Errors from the Job Store. `Database` maps to the PersistenceError class —
/// fatal to the enclosing operation, surfaced as a 5xx at the transport.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(String),
    #[error("job {id} is {status} and cannot transition")]
    InvalidTransition { id: String, status: String },
    #[error("corrupt job row: {0}")]
    CorruptRow(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct JobStore {
    pool: SqlitePool,
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

impl JobStore {
    /// Open (or create) the job database under `data_dir`.
    pub async fn open(data_dir: &Path) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let db_path = data_dir.join("orbital.db");
        let opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .create_if_missing(true);

        let pool = SqlitePool::connect_with(opts).await?;
        sqlx::migrate!("src/store/migrations")
            .run(&pool)
            .await
            .context("failed to run database migrations")?;
        Ok(Self { pool })
    }

    /// Create a pending job from a validated descriptor. Returns the new row.
    pub async fn create(&self, descriptor: &WorkflowDescriptor) -> Result<JobRow, StoreError> {
        let id = Uuid::new_v4().to_string();
        let workflow_json = serde_json::to_string(descriptor)
            .map_err(|e| StoreError::CorruptRow(e.to_string()))?;
        let now = now_rfc3339();
        sqlx::query(
            "INSERT INTO automation_jobs (id, status, workflow_json, attempts, created_at, updated_at)
             VALUES (?, 'pending', ?, 0, ?, ?)",
        )
        .bind(&id)
        .bind(&workflow_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get(&id).await
    }

    pub async fn get(&self, id: &str) -> Result<JobRow, StoreError> {
        sqlx::query_as("SELECT * FROM automation_jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Newest-first listing for the jobs index endpoint.
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<JobRow>, StoreError> {
        let limit = limit.clamp(1, 500);
        Ok(sqlx::query_as(
            "SELECT * FROM automation_jobs ORDER BY created_at DESC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await?)
    }

    /// pending|running → running, bumping `attempts` and stamping
    /// `started_at` on the first start.
    pub async fn mark_running(&self, id: &str) -> Result<(), StoreError> {
        let now = now_rfc3339();
        let affected = sqlx::query(
            "UPDATE automation_jobs
             SET status = 'running',
                 attempts = attempts + 1,
                 started_at = COALESCE(started_at, ?),
                 updated_at = ?
             WHERE id = ? AND status IN ('pending', 'running')",
        )
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        self.check_transition(id, affected).await
    }

    /// running → completed. `result` and `error_message` are mutually
    /// exclusive by construction: this statement never touches
    /// `error_message` and the failure paths never touch `result_json`.
    pub async fn mark_completed(
        &self,
        id: &str,
        result: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let now = now_rfc3339();
        let affected = sqlx::query(
            "UPDATE automation_jobs
             SET status = 'completed', result_json = ?, finished_at = ?, updated_at = ?
             WHERE id = ? AND status = 'running'",
        )
        .bind(result.to_string())
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        self.check_transition(id, affected).await
    }

    /// running → failed.
    pub async fn mark_failed(&self, id: &str, message: &str) -> Result<(), StoreError> {
        let now = now_rfc3339();
        let affected = sqlx::query(
            "UPDATE automation_jobs
             SET status = 'failed', error_message = ?, finished_at = ?, updated_at = ?
             WHERE id = ? AND status = 'running'",
        )
        .bind(message)
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        self.check_transition(id, affected).await
    }

    /// running → timeout, with the fixed timeout message.
    pub async fn mark_timeout(&self, id: &str) -> Result<(), StoreError> {
        let now = now_rfc3339();
        let affected = sqlx::query(
            "UPDATE automation_jobs
             SET status = 'timeout', error_message = 'Execution timed out', finished_at = ?, updated_at = ?
             WHERE id = ? AND status = 'running'",
        )
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        self.check_transition(id, affected).await
    }

    /// Distinguish "row missing" from "row in a state the transition does
    /// not leave" after a guarded UPDATE affected zero rows.
    async fn check_transition(&self, id: &str, affected: u64) -> Result<(), StoreError> {
        if affected == 1 {
            return Ok(());
        }
        let row = self.get(id).await?;
        Err(StoreError::InvalidTransition {
            id: id.to_string(),
            status: row.status,
        })
    }
}
