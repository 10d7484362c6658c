//! Search Routes
//!
//! 定义搜索相关的 API 路由。

use axum::{Router, routing::post};

use crate::api::app_state::AppState;
use crate::api::handlers::search_handler::*;

/// 创建搜索路由器
pub fn create_search_router() -> Router<AppState> {
    Router::new().route("/search", post(search_memories))
}
