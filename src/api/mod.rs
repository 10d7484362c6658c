//! API 模块
//!
//! 提供 REST API 支持。

#[cfg(test)]
mod api_tests;
pub mod app_state;
pub mod docs;
pub mod dto;
pub mod extract;
pub mod handlers;
pub mod routes;

use crate::api::app_state::AppState;
use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .merge(routes::system_routes::create_system_router())
        .merge(routes::memory_routes::create_memory_router())
        .merge(routes::search_routes::create_search_router())
        .merge(routes::config_routes::create_config_router())
        .layer(axum::middleware::from_fn_with_state(
            app_state.metrics.clone(),
            crate::observability::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}
