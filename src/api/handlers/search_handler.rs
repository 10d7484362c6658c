//! Search Handlers

use axum::{Json, extract::State, response::IntoResponse};
use std::time::Instant;
use tracing::debug;

use crate::{
    api::{app_state::AppState, dto::search_dto::*, extract::ApiJson},
    error::{AppError, ErrorResponse},
};

/// Semantic search within a scope
///
/// POST /search
#[utoipa::path(
    post,
    path = "/search",
    tag = "search",
    request_body = SearchMemoriesRequest,
    responses(
        (status = 200, description = "Matches ordered by descending score", body = SearchMemoriesResponse),
        (status = 400, description = "Missing scope or empty query", body = ErrorResponse)
    )
)]
pub async fn search_memories(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SearchMemoriesRequest>,
) -> Result<impl IntoResponse, AppError> {
    let start = Instant::now();
    debug!("Searching memories: {}", request.query);

    let active = state.engine.current();
    let results = active.engine.search(request.into()).await?;
    state
        .metrics
        .record_search(start.elapsed().as_millis() as u64);

    Ok(Json(SearchMemoriesResponse { results }))
}
