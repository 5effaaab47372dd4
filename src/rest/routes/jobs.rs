// rest/routes/jobs.rs — job submission and status retrieval.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::queue::QueueEntry;
use crate::store::{JobRow, JobStatus, StoreError};
use crate::workflow::validate::{self, ValidationError};
use crate::workflow::WorkflowDescriptor;
use crate::AppContext;

type ApiError = (StatusCode, Json<Value>);

/// POST /api/v1/jobs — validate, persist as pending, enqueue.
///
/// The raw body goes straight to the validator so the size ceiling applies
/// before any parsing. No job row or queue entry exists unless validation
/// passed in full.
pub async fn create_job(
    State(ctx): State<Arc<AppContext>>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let descriptor = validate::validate_submission(&body)
        .await
        .map_err(validation_response)?;

    persist_and_enqueue(&ctx, descriptor)
        .await
        .map(|row| {
            (
                StatusCode::CREATED,
                Json(json!({ "job_id": row.id, "status": row.status })),
            )
        })
}

/// Create the pending row, then the queue entry. Shared with the template
/// job route.
pub(crate) async fn persist_and_enqueue(
    ctx: &AppContext,
    descriptor: WorkflowDescriptor,
) -> Result<JobRow, ApiError> {
    let row = ctx.store.create(&descriptor).await.map_err(persistence_response)?;
    let entry = QueueEntry {
        job_id: row.id.clone(),
        descriptor,
    };
    if let Err(e) = ctx.queue.enqueue(&entry).await {
        error!(job_id = %row.id, err = %e, "enqueue failed after job creation");
        // The row stays pending; the caller sees a 5xx and may retry with a
        // new submission.
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Failed to enqueue job" })),
        ));
    }
    info!(job_id = %row.id, "job accepted");
    Ok(row)
}

pub(crate) fn validation_response(err: ValidationError) -> ApiError {
    let status = match err {
        ValidationError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    };
    (
        status,
        Json(json!({
            "error": "Validation failed",
            "details": { (err.field_path()): [err.detail()] },
        })),
    )
}

pub(crate) fn persistence_response(err: StoreError) -> ApiError {
    error!(err = %err, "job store operation failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Storage unavailable" })),
    )
}

/// GET /api/v1/jobs/{id} — status projection.
pub async fn get_job(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match ctx.store.get(&id).await {
        Ok(row) => Ok(Json(job_projection(&row))),
        Err(StoreError::NotFound(_)) => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Job not found" })),
        )),
        Err(e) => Err(persistence_response(e)),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// GET /api/v1/jobs — newest first.
pub async fn list_jobs(
    State(ctx): State<Arc<AppContext>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, ApiError> {
    let rows = ctx
        .store
        .list(params.limit.unwrap_or(100), params.offset.unwrap_or(0))
        .await
        .map_err(persistence_response)?;
    let jobs: Vec<Value> = rows.iter().map(job_projection).collect();
    Ok(Json(json!({ "jobs": jobs })))
}

/// The client-facing view of a job row. `result` appears only on completed
/// jobs, `error` only on failed or timed-out ones.
pub(crate) fn job_projection(row: &JobRow) -> Value {
    let mut obj = serde_json::Map::new();
    obj.insert("job_id".into(), Value::String(row.id.clone()));
    obj.insert("status".into(), Value::String(row.status.clone()));
    obj.insert("attempts".into(), json!(row.attempts));
    obj.insert("created_at".into(), Value::String(row.created_at.clone()));

    match row.status().ok() {
        Some(JobStatus::Completed) => {
            if let Some(ref result) = row.result_json {
                let parsed: Value = serde_json::from_str(result).unwrap_or(Value::Null);
                obj.insert("result".into(), parsed);
            }
        }
        Some(JobStatus::Failed) | Some(JobStatus::Timeout) => {
            if let Some(ref message) = row.error_message {
                obj.insert("error".into(), Value::String(message.clone()));
            }
        }
        _ => {}
    }
    if let Some(ref started) = row.started_at {
        obj.insert("started_at".into(), Value::String(started.clone()));
    }
    if let Some(ref finished) = row.finished_at {
        obj.insert("finished_at".into(), Value::String(finished.clone()));
    }
    Value::Object(obj)
}
