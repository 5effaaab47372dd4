// rest/auth.rs — API key middleware.
//
// Keys come from the static allow-list in DaemonConfig. Either header form
// is accepted: `x-api-key: <key>` or `Authorization: Bearer <key>`.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
    Json,
};
use serde_json::{json, Value};

use crate::AppContext;

pub async fn require_api_key(
    State(ctx): State<Arc<AppContext>>,
    request: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<Value>)> {
    let supplied = extract_key(&request);
    match supplied {
        Some(key) if ctx.config.api_keys.iter().any(|k| k == key) => Ok(next.run(request).await),
        _ => Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized: Invalid or missing API key" })),
        )),
    }
}

fn extract_key(request: &Request) -> Option<&str> {
    let headers = request.headers();
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Some(key);
    }
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}
