//! Configuration Handlers
//!
//! Runtime replacement of the engine configuration.

use axum::{Json, extract::State, response::IntoResponse};
use tracing::info;

use crate::{
    api::{app_state::AppState, dto::config_dto::*, extract::ApiJson},
    config::config::EngineConfigPatch,
    error::{AppError, ErrorResponse},
};

/// Replace parts of the engine configuration
///
/// POST /configure
#[utoipa::path(
    post,
    path = "/configure",
    tag = "configuration",
    request_body = EngineConfigPatch,
    responses(
        (status = 200, description = "New engine active", body = ConfigureResponse),
        (status = 400, description = "Invalid configuration, previous engine kept", body = ErrorResponse)
    )
)]
pub async fn set_configuration(
    State(state): State<AppState>,
    ApiJson(patch): ApiJson<EngineConfigPatch>,
) -> Result<impl IntoResponse, AppError> {
    let result = state.engine.reconfigure(patch).await;
    state.metrics.record_reconfigure(result.is_ok());
    let active = result?;

    info!(
        "Configuration set, generation {} ({} / {} / {})",
        active.generation,
        active.config.vector_store.provider,
        active.config.llm.provider,
        active.config.embedder.provider
    );

    Ok(Json(ConfigureResponse {
        message: "Configuration set successfully".to_string(),
        generation: active.generation,
    }))
}

/// Current engine configuration with secrets hidden
///
/// GET /configure
#[utoipa::path(
    get,
    path = "/configure",
    tag = "configuration",
    responses((status = 200, description = "Redacted configuration", body = ConfigurationResponse))
)]
pub async fn get_configuration(State(state): State<AppState>) -> impl IntoResponse {
    let active = state.engine.current();
    Json(ConfigurationResponse {
        generation: active.generation,
        config: active.config.redacted(),
    })
}
