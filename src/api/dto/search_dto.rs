//! 搜索 DTO
//!
//! 定义搜索相关的请求和响应数据结构。

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::engine::SearchRequest;
use crate::engine::types::{MemoryItem, Metadata, Scope};

/// 默认返回结果数量
pub const DEFAULT_SEARCH_LIMIT: usize = 100;

/// 语义搜索请求
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct SearchMemoriesRequest {
    /// 搜索查询
    pub query: String,
    pub user_id: Option<String>,
    pub agent_id: Option<String>,
    pub run_id: Option<String>,
    /// 元数据过滤条件
    #[schema(value_type = Option<Object>)]
    pub filters: Option<Metadata>,
    /// 返回结果数量
    pub limit: Option<usize>,
    /// 相似度阈值
    pub threshold: Option<f32>,
}

impl From<SearchMemoriesRequest> for SearchRequest {
    fn from(request: SearchMemoriesRequest) -> Self {
        SearchRequest {
            scope: Scope::new(request.user_id, request.agent_id, request.run_id),
            query: request.query,
            filters: request.filters.unwrap_or_default(),
            limit: request.limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
            threshold: request.threshold,
        }
    }
}

/// 搜索响应，按分数降序
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SearchMemoriesResponse {
    pub results: Vec<MemoryItem>,
}
