//! 错误处理模块
//!
//! 定义应用程序的错误类型和错误处理逻辑。

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 应用程序错误类型
#[derive(Error, Debug)]
pub enum AppError {
    /// 参数验证错误
    #[error("validation failed: {0}")]
    Validation(String),

    /// 资源不存在
    #[error("not found: {0}")]
    NotFound(String),

    /// 配置错误
    #[error("invalid configuration: {0}")]
    Config(String),

    /// 连接错误
    #[error("connection error: {0}")]
    Connection(String),

    /// 向量存储错误
    #[error("vector store error: {0}")]
    VectorStore(String),

    /// 语言模型错误
    #[error("llm error: {0}")]
    Llm(String),

    /// 嵌入模型错误
    #[error("embedding error: {0}")]
    Embedding(String),

    /// 历史记录错误
    #[error("history store error: {0}")]
    History(String),

    /// 序列化错误
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO 错误
    #[error("io error: {0}")]
    Io(String),

    /// 内部错误
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the error is the caller's fault (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::Validation(_) | AppError::Config(_) | AppError::NotFound(_)
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Serialization(e.to_string())
    }
}

impl From<figment::Error> for AppError {
    fn from(e: figment::Error) -> Self {
        AppError::Config(e.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::History(e.to_string())
    }
}

#[cfg(feature = "surrealdb")]
impl From<surrealdb::Error> for AppError {
    fn from(e: surrealdb::Error) -> Self {
        AppError::VectorStore(e.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

/// Axum response implementation for AppError
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = (&self).into();
        if !self.is_client_error() {
            tracing::error!(code = %code, "request failed: {}", self);
        }
        let body = Json(ErrorResponse::new(&code, &self.to_string()));
        (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body,
        )
            .into_response()
    }
}

/// 错误响应
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// 错误代码
    pub code: String,
    /// 错误消息
    pub message: String,
    /// 详细信息
    pub details: Option<String>,
    /// 请求 ID
    pub request_id: Option<String>,
}

impl ErrorResponse {
    /// 创建新错误响应
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
            details: None,
            request_id: None,
        }
    }
}

/// HTTP 状态码映射
impl From<&AppError> for (u16, String) {
    fn from(err: &AppError) -> (u16, String) {
        match err {
            AppError::Validation(_) => (400, "BAD_REQUEST".to_string()),
            AppError::Config(_) => (400, "INVALID_CONFIG".to_string()),
            AppError::NotFound(_) => (404, "NOT_FOUND".to_string()),
            AppError::Connection(_) => (503, "SERVICE_UNAVAILABLE".to_string()),
            AppError::VectorStore(_) => (500, "VECTOR_STORE_ERROR".to_string()),
            AppError::Llm(_) => (500, "LLM_ERROR".to_string()),
            AppError::Embedding(_) => (500, "EMBEDDING_ERROR".to_string()),
            AppError::History(_) => (500, "HISTORY_ERROR".to_string()),
            _ => (500, "INTERNAL_ERROR".to_string()),
        }
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, AppError>;
