//! 记忆 DTO
//!
//! API 请求和响应的数据传输对象

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::engine::types::{MemoryEvent, MemoryItem, Message, Metadata, Scope};
use crate::engine::{AddRequest, MemoryUpdate};
use crate::error::{AppError, Result};

fn default_infer() -> bool {
    true
}

/// 创建记忆请求
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateMemoryRequest {
    /// 对话消息
    pub messages: Vec<Message>,
    pub user_id: Option<String>,
    pub agent_id: Option<String>,
    pub run_id: Option<String>,
    /// 附加到每条记忆的元数据
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<Metadata>,
    /// 是否调用语言模型抽取事实
    #[serde(default = "default_infer")]
    pub infer: bool,
}

impl From<CreateMemoryRequest> for AddRequest {
    fn from(request: CreateMemoryRequest) -> Self {
        AddRequest {
            scope: Scope::new(request.user_id, request.agent_id, request.run_id),
            messages: request.messages,
            metadata: request.metadata.unwrap_or_default(),
            infer: request.infer,
        }
    }
}

/// 更新记忆请求；`text`、`memory`、`data` 为同义字段
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateMemoryRequest {
    pub text: Option<String>,
    pub memory: Option<String>,
    pub data: Option<String>,
    /// 合并进现有元数据
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<Metadata>,
}

impl From<UpdateMemoryRequest> for MemoryUpdate {
    fn from(request: UpdateMemoryRequest) -> Self {
        MemoryUpdate {
            text: request.text.or(request.memory).or(request.data),
            metadata: request.metadata,
        }
    }
}

/// 作用域查询参数
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ScopeParams {
    pub user_id: Option<String>,
    pub agent_id: Option<String>,
    pub run_id: Option<String>,
}

impl ScopeParams {
    pub fn scope(&self) -> Scope {
        Scope::new(
            self.user_id.clone(),
            self.agent_id.clone(),
            self.run_id.clone(),
        )
    }
}

/// 列表查询参数
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListMemoriesParams {
    pub user_id: Option<String>,
    pub agent_id: Option<String>,
    pub run_id: Option<String>,
    /// 最大返回数量，默认 100
    pub limit: Option<usize>,
    /// JSON 对象形式的元数据过滤条件
    pub filters: Option<String>,
}

impl ListMemoriesParams {
    pub fn scope(&self) -> Scope {
        Scope::new(
            self.user_id.clone(),
            self.agent_id.clone(),
            self.run_id.clone(),
        )
    }

    /// Decodes `filters`; an absent or blank value means no filter.
    pub fn filters(&self) -> Result<Metadata> {
        match self.filters.as_deref().map(str::trim) {
            None | Some("") => Ok(Metadata::new()),
            Some(raw) => serde_json::from_str::<Metadata>(raw).map_err(|e| {
                AppError::Validation(format!("filters must be a JSON object: {}", e))
            }),
        }
    }
}

/// 写入结果
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MemoryEventsResponse {
    pub results: Vec<MemoryEvent>,
}

/// 记忆列表
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MemoryListResponse {
    pub results: Vec<MemoryItem>,
}

/// 简单消息响应
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// 批量删除响应
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BulkDeleteResponse {
    pub message: String,
    pub deleted: usize,
}
