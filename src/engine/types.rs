//! 引擎数据类型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// 元数据 / 过滤条件
pub type Metadata = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 对话消息，仅作为输入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Message {
    /// Role of the message (user or assistant).
    pub role: Role,
    /// Message content.
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// 记忆作用域：user / agent / run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

impl Scope {
    /// Builds a scope, dropping empty identifiers.
    pub fn new(user_id: Option<String>, agent_id: Option<String>, run_id: Option<String>) -> Self {
        let keep = |id: Option<String>| id.filter(|s| !s.trim().is_empty());
        Self {
            user_id: keep(user_id),
            agent_id: keep(agent_id),
            run_id: keep(run_id),
        }
    }

    pub fn user(user_id: &str) -> Self {
        Self::new(Some(user_id.to_string()), None, None)
    }

    pub fn is_empty(&self) -> bool {
        self.user_id.is_none() && self.agent_id.is_none() && self.run_id.is_none()
    }

    /// `(field, value)` pairs of the identifiers that are set.
    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = Vec::with_capacity(3);
        if let Some(id) = &self.user_id {
            pairs.push(("user_id", id.as_str()));
        }
        if let Some(id) = &self.agent_id {
            pairs.push(("agent_id", id.as_str()));
        }
        if let Some(id) = &self.run_id {
            pairs.push(("run_id", id.as_str()));
        }
        pairs
    }
}

/// 向量存储中的记录负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryPayload {
    pub data: String,
    pub hash: String,
    #[serde(flatten)]
    pub scope: Scope,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl MemoryPayload {
    pub fn new(data: &str, scope: Scope, metadata: Metadata) -> Self {
        Self {
            data: data.to_string(),
            hash: content_hash(data),
            scope,
            metadata,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    /// Whether every filter key matches the metadata or scope field exactly.
    pub fn matches(&self, filters: &Metadata) -> bool {
        filters.iter().all(|(key, expected)| {
            let actual = match key.as_str() {
                "user_id" => self.scope.user_id.clone().map(Value::String),
                "agent_id" => self.scope.agent_id.clone().map(Value::String),
                "run_id" => self.scope.run_id.clone().map(Value::String),
                _ => self.metadata.get(key).cloned(),
            };
            actual.as_ref() == Some(expected)
        })
    }
}

/// API 返回的记忆对象
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct MemoryItem {
    pub id: String,
    pub memory: String,
    pub hash: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl MemoryItem {
    pub fn from_payload(id: &str, payload: MemoryPayload, score: Option<f32>) -> Self {
        Self {
            id: id.to_string(),
            memory: payload.data,
            hash: payload.hash,
            metadata: payload.metadata,
            created_at: payload.created_at,
            updated_at: payload.updated_at,
            user_id: payload.scope.user_id,
            agent_id: payload.scope.agent_id,
            run_id: payload.scope.run_id,
            score,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    Add,
    Update,
    Delete,
    None,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Add => "ADD",
            EventKind::Update => "UPDATE",
            EventKind::Delete => "DELETE",
            EventKind::None => "NONE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ADD" => Some(EventKind::Add),
            "UPDATE" => Some(EventKind::Update),
            "DELETE" => Some(EventKind::Delete),
            "NONE" => Some(EventKind::None),
            _ => None,
        }
    }
}

/// 写操作的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct MemoryEvent {
    pub id: String,
    pub memory: String,
    pub event: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_memory: Option<String>,
}

/// 历史记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct HistoryRecord {
    pub id: String,
    pub memory_id: String,
    pub old_memory: Option<String>,
    pub new_memory: Option<String>,
    pub event: EventKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
}

/// 向量检索命中
#[derive(Debug, Clone)]
pub struct ScoredPayload {
    pub id: String,
    pub score: f32,
    pub payload: MemoryPayload,
}

/// Hex SHA-256 of the memory text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:064x}", hasher.finalize())
}
