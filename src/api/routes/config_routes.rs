//! Configuration Routes

use axum::{Router, routing::get};

use crate::api::app_state::AppState;
use crate::api::handlers::config_handler::*;

/// 创建配置路由器
pub fn create_config_router() -> Router<AppState> {
    Router::new().route("/configure", get(get_configuration).post(set_configuration))
}
