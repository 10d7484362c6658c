//! Routes 模块
//!
//! 定义 API 路由。

pub mod config_routes;
pub mod memory_routes;
pub mod search_routes;
pub mod system_routes;
