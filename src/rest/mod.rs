// rest/mod.rs — Public REST API server.
//
// Axum HTTP server exposing the job orchestration surface:
//   POST /api/v1/jobs
//   GET  /api/v1/jobs
//   GET  /api/v1/jobs/{id}
//   GET  /api/v1/templates
//   GET  /api/v1/templates/{id}
//   POST /api/v1/templates/{id}/jobs
//   GET  /artifacts/{job_id}/{file}   (no auth)
//   GET  /health                      (no auth)
//
// Everything under /api/v1 requires an API key from the static allow-list,
// supplied as `x-api-key` or `Authorization: Bearer`.

pub mod auth;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::get,
    Router,
};
use tokio::sync::watch;
use tracing::info;

use crate::workflow::MAX_BODY_BYTES;
use crate::AppContext;

pub async fn start_rest_server(ctx: Arc<AppContext>, shutdown: watch::Receiver<bool>) -> Result<()> {
    let bind = format!("{}:{}", ctx.config.bind_address, ctx.config.port);
    let addr: SocketAddr = bind.parse()?;

    let router = build_router(ctx);

    info!("REST API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(wait_for_shutdown(shutdown))
        .await?;
    Ok(())
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    let api = Router::new()
        .route(
            "/api/v1/jobs",
            get(routes::jobs::list_jobs).post(routes::jobs::create_job),
        )
        .route("/api/v1/jobs/{id}", get(routes::jobs::get_job))
        .route("/api/v1/templates", get(routes::templates::list_templates))
        .route("/api/v1/templates/{id}", get(routes::templates::get_template))
        .route(
            "/api/v1/templates/{id}/jobs",
            axum::routing::post(routes::templates::create_job_from_template),
        )
        .layer(middleware::from_fn_with_state(
            ctx.clone(),
            auth::require_api_key,
        ));

    Router::new()
        // Health and artifact retrieval are exempt from auth.
        .route("/health", get(routes::health::health))
        .route(
            "/artifacts/{job_id}/{file}",
            get(routes::artifacts::get_artifact),
        )
        .merge(api)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(ctx)
}
