//! System Handlers
//!
//! Root redirect, OpenAPI document, health and metrics.

use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Redirect},
};
use utoipa::OpenApi;

use crate::api::{app_state::AppState, docs::ApiDoc, dto::config_dto::HealthResponse};

/// GET / → /docs
pub async fn root() -> Redirect {
    Redirect::temporary("/docs")
}

/// OpenAPI document
pub async fn openapi_doc() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

/// 存活检查
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "memgate".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        generation: state.engine.generation(),
        uptime_seconds: state.uptime_seconds(),
    })
}

/// Prometheus 指标端点
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.gather(state.engine.generation()),
    )
}
