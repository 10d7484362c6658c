//! Memory API Handlers
//!
//! HTTP handlers for memory CRUD, bulk delete, history and reset.

use axum::{Json, extract::State, response::IntoResponse};
use tracing::debug;

use crate::{
    api::{
        app_state::AppState,
        dto::memory_dto::*,
        extract::{ApiJson, ApiPath, ApiQuery},
    },
    engine::types::{HistoryRecord, MemoryItem},
    error::{AppError, ErrorResponse},
};

/// 默认列表数量
const DEFAULT_LIST_LIMIT: usize = 100;

/// Create memories from a conversation
///
/// POST /memories
#[utoipa::path(
    post,
    path = "/memories",
    tag = "memories",
    request_body = CreateMemoryRequest,
    responses(
        (status = 200, description = "Stored memories", body = MemoryEventsResponse),
        (status = 400, description = "Missing scope or empty messages", body = ErrorResponse)
    )
)]
pub async fn create_memory(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CreateMemoryRequest>,
) -> Result<impl IntoResponse, AppError> {
    debug!("Creating memories from {} messages", request.messages.len());

    let active = state.engine.current();
    let results = active.engine.add(request.into()).await?;
    state.metrics.record_added(results.len());

    Ok(Json(MemoryEventsResponse { results }))
}

/// List memories in a scope
///
/// GET /memories
#[utoipa::path(
    get,
    path = "/memories",
    tag = "memories",
    params(ListMemoriesParams),
    responses(
        (status = 200, description = "Memories in the scope", body = MemoryListResponse),
        (status = 400, description = "Missing scope or malformed filters", body = ErrorResponse)
    )
)]
pub async fn list_memories(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ListMemoriesParams>,
) -> Result<impl IntoResponse, AppError> {
    let filters = params.filters()?;
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);

    let active = state.engine.current();
    let results = active
        .engine
        .get_all(&params.scope(), &filters, limit)
        .await?;

    Ok(Json(MemoryListResponse { results }))
}

/// Get a memory by ID
///
/// GET /memories/:id
#[utoipa::path(
    get,
    path = "/memories/{id}",
    tag = "memories",
    params(("id" = String, Path, description = "Memory ID")),
    responses(
        (status = 200, description = "The memory", body = MemoryItem),
        (status = 404, description = "Unknown memory", body = ErrorResponse)
    )
)]
pub async fn get_memory(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
) -> Result<impl IntoResponse, AppError> {
    debug!("Getting memory: {}", id);

    let active = state.engine.current();
    Ok(Json(active.engine.get(&id).await?))
}

/// Update a memory's text and/or metadata
///
/// PUT /memories/:id
#[utoipa::path(
    put,
    path = "/memories/{id}",
    tag = "memories",
    params(("id" = String, Path, description = "Memory ID")),
    request_body = UpdateMemoryRequest,
    responses(
        (status = 200, description = "The updated memory", body = MemoryItem),
        (status = 400, description = "Nothing to update", body = ErrorResponse),
        (status = 404, description = "Unknown memory", body = ErrorResponse)
    )
)]
pub async fn update_memory(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
    ApiJson(request): ApiJson<UpdateMemoryRequest>,
) -> Result<impl IntoResponse, AppError> {
    debug!("Updating memory: {}", id);

    let active = state.engine.current();
    let item = active.engine.update(&id, request.into()).await?;
    state.metrics.record_updated();

    Ok(Json(item))
}

/// Delete a memory
///
/// DELETE /memories/:id
#[utoipa::path(
    delete,
    path = "/memories/{id}",
    tag = "memories",
    params(("id" = String, Path, description = "Memory ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 404, description = "Unknown memory", body = ErrorResponse)
    )
)]
pub async fn delete_memory(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
) -> Result<impl IntoResponse, AppError> {
    debug!("Deleting memory: {}", id);

    let active = state.engine.current();
    active.engine.delete(&id).await?;
    state.metrics.record_deleted(1);

    Ok(Json(MessageResponse::new("Memory deleted successfully")))
}

/// Delete every memory in a scope
///
/// DELETE /memories
#[utoipa::path(
    delete,
    path = "/memories",
    tag = "memories",
    params(ScopeParams),
    responses(
        (status = 200, description = "Deleted", body = BulkDeleteResponse),
        (status = 400, description = "Missing scope", body = ErrorResponse)
    )
)]
pub async fn delete_all_memories(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ScopeParams>,
) -> Result<impl IntoResponse, AppError> {
    let active = state.engine.current();
    let deleted = active.engine.delete_all(&params.scope()).await?;
    state.metrics.record_deleted(deleted);

    Ok(Json(BulkDeleteResponse {
        message: "All relevant memories deleted".to_string(),
        deleted,
    }))
}

/// Revision history of a memory, oldest first
///
/// GET /memories/:id/history
#[utoipa::path(
    get,
    path = "/memories/{id}/history",
    tag = "memories",
    params(("id" = String, Path, description = "Memory ID")),
    responses(
        (status = 200, description = "History records, possibly empty", body = [HistoryRecord])
    )
)]
pub async fn memory_history(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
) -> Result<impl IntoResponse, AppError> {
    let active = state.engine.current();
    Ok(Json(active.engine.history(&id).await?))
}

/// Delete all memories and history
///
/// POST /reset
#[utoipa::path(
    post,
    path = "/reset",
    tag = "memories",
    responses((status = 200, description = "Store cleared", body = MessageResponse))
)]
pub async fn reset_memories(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let active = state.engine.current();
    active.engine.reset().await?;
    state.metrics.record_reset();

    Ok(Json(MessageResponse::new("All memories reset")))
}
