// rest/routes/artifacts.rs — artifact retrieval.
//
// Both path segments are pattern-checked before any filesystem access: the
// job id must be a UUID and the filename must match the allow-list (the
// executor only ever produces names that do). Anything else is a 404 — the
// route never reveals whether a path existed.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use crate::AppContext;

static JOB_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("job id pattern compiles")
});

/// Artifact filenames: screenshot-{i}.png or download-{i}-{name} with a safe
/// character set and an allow-listed extension.
static FILENAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,127}\.(png|jpg|jpeg|pdf|txt|json|csv|zip)$")
        .expect("filename pattern compiles")
});

pub async fn get_artifact(
    State(ctx): State<Arc<AppContext>>,
    Path((job_id, file)): Path<(String, String)>,
) -> impl IntoResponse {
    if !JOB_ID_RE.is_match(&job_id) || !FILENAME_RE.is_match(&file) || file.contains("..") {
        return not_found();
    }

    let path = ctx.config.storage_path.join(&job_id).join(&file);
    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, content_type(&file))],
            bytes,
        )
            .into_response(),
        Err(_) => not_found(),
    }
}

fn not_found() -> axum::response::Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Artifact not found" })),
    )
        .into_response()
}

fn content_type(filename: &str) -> &'static str {
    match filename.rsplit('.').next() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("pdf") => "application/pdf",
        Some("json") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        Some("csv") => "text/csv",
        _ => "application/octet-stream",
    }
}

/// Pattern checks factored for direct testing.
pub fn is_valid_artifact_path(job_id: &str, file: &str) -> bool {
    JOB_ID_RE.is_match(job_id) && FILENAME_RE.is_match(file) && !file.contains("..")
}
