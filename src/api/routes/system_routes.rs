//! System Routes

use axum::{Router, routing::get};

use crate::api::app_state::AppState;
use crate::api::handlers::system_handler::*;

/// 创建系统路由器：文档、健康检查、指标
pub fn create_system_router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/docs", get(openapi_doc))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
}
