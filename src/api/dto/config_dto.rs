//! 配置 DTO

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::config::EngineConfig;

/// `POST /configure` 响应
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConfigureResponse {
    pub message: String,
    /// 新引擎的版本号
    pub generation: u64,
}

/// `GET /configure` 响应，敏感字段已隐藏
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConfigurationResponse {
    pub generation: u64,
    #[serde(flatten)]
    pub config: EngineConfig,
}

/// 健康检查响应
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub generation: u64,
    pub uptime_seconds: f64,
}
