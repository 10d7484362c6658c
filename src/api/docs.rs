//! OpenAPI 文档

use utoipa::OpenApi;

use crate::api::dto::*;
use crate::api::handlers::{config_handler, memory_handler, search_handler, system_handler};
use crate::config::config::{EngineConfig, EngineConfigPatch, ProviderConfig};
use crate::engine::types::{EventKind, HistoryRecord, MemoryEvent, MemoryItem, Message, Role};
use crate::error::ErrorResponse;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "memgate",
        description = "REST gateway for storing, searching and managing agent memories"
    ),
    paths(
        memory_handler::create_memory,
        memory_handler::list_memories,
        memory_handler::get_memory,
        memory_handler::update_memory,
        memory_handler::delete_memory,
        memory_handler::delete_all_memories,
        memory_handler::memory_history,
        memory_handler::reset_memories,
        search_handler::search_memories,
        config_handler::set_configuration,
        config_handler::get_configuration,
        system_handler::health,
    ),
    components(schemas(
        CreateMemoryRequest,
        UpdateMemoryRequest,
        SearchMemoriesRequest,
        MemoryEventsResponse,
        MemoryListResponse,
        SearchMemoriesResponse,
        MessageResponse,
        BulkDeleteResponse,
        ConfigureResponse,
        ConfigurationResponse,
        HealthResponse,
        EngineConfig,
        EngineConfigPatch,
        ProviderConfig,
        MemoryItem,
        MemoryEvent,
        EventKind,
        HistoryRecord,
        Message,
        Role,
        ErrorResponse,
    )),
    tags(
        (name = "memories", description = "Memory CRUD, history and reset"),
        (name = "search", description = "Semantic search"),
        (name = "configuration", description = "Runtime engine configuration"),
        (name = "system", description = "Health and metrics")
    )
)]
pub struct ApiDoc;
