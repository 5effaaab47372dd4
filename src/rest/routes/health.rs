// rest/routes/health.rs — liveness probe with queue depths.

use std::sync::Arc;

use axum::{extract::State, Json};
use chrono::Utc;
use serde_json::{json, Value};

use crate::AppContext;

pub async fn health(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    let queue = match ctx.queue.stats().await {
        Ok(stats) => json!({ "pending": stats.pending, "in_flight": stats.in_flight }),
        Err(_) => Value::Null,
    };
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "queue": queue,
    }))
}
