// rest/routes/templates.rs — template catalog and template-based job creation.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::jobs::{persist_and_enqueue, validation_response};
use crate::templates::TemplateError;
use crate::AppContext;

type ApiError = (StatusCode, Json<Value>);

/// GET /api/v1/templates — catalog index.
pub async fn list_templates(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    let list: Vec<Value> = ctx
        .templates
        .list()
        .iter()
        .map(|t| {
            json!({
                "id": t.id,
                "name": t.name,
                "description": t.description,
                "parameters": t.parameters,
            })
        })
        .collect();
    Json(json!({ "templates": list }))
}

/// GET /api/v1/templates/{id} — full template including the workflow body.
pub async fn get_template(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match ctx.templates.get(&id) {
        Some(t) => Ok(Json(json!({
            "id": t.id,
            "name": t.name,
            "description": t.description,
            "workflow": t.workflow,
            "options": t.options,
            "parameters": t.parameters,
        }))),
        None => Err(template_not_found()),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TemplateJobRequest {
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

/// POST /api/v1/templates/{id}/jobs — render, validate, persist, enqueue.
pub async fn create_job_from_template(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    Json(body): Json<TemplateJobRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let descriptor = ctx
        .templates
        .render(&id, &body.parameters)
        .await
        .map_err(|e| template_error_response(&id, e))?;

    let row = persist_and_enqueue(&ctx, descriptor).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "job_id": row.id,
            "status": row.status,
            "template_used": id,
        })),
    ))
}

fn template_not_found() -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Template not found" })),
    )
}

fn template_error_response(id: &str, err: TemplateError) -> ApiError {
    match err {
        TemplateError::NotFound(_) => template_not_found(),
        TemplateError::MissingParameter { ref name } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "error": "Validation failed",
                "details": { (name.clone()): [err.to_string()] },
            })),
        ),
        TemplateError::CorruptRender(message) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "error": format!("Template {id} rendered an invalid workflow"),
                "details": { "parameters": [message] },
            })),
        ),
        TemplateError::Validation(e) => validation_response(e),
    }
}
