use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 需要在日志和 API 输出中隐藏的配置键
const SECRET_KEYS: &[&str] = &["api_key", "password", "token", "secret"];

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 服务地址
    pub host: String,
    /// 服务端口
    pub port: u16,
    /// 工作线程数
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            workers: 1,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
    /// 结构化日志格式
    pub structured: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            structured: false,
        }
    }
}

/// 单个 provider 的配置: 名称 + 自由格式的 JSON 参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ProviderConfig {
    /// provider 名称，例如 `openai`、`surrealdb`
    pub provider: String,
    /// provider 专属参数
    #[serde(default)]
    #[schema(value_type = Object)]
    pub config: Map<String, Value>,
}

impl ProviderConfig {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            config: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.config.insert(key.to_string(), value.into());
        self
    }

    /// Returns a string parameter, treating empty strings as absent.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.config
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// 复制配置并隐藏敏感字段
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for (key, value) in copy.config.iter_mut() {
            let secret = SECRET_KEYS
                .iter()
                .any(|s| key == s || key.ends_with(&format!("_{s}")));
            if secret && !value.is_null() {
                *value = Value::String("***".into());
            }
        }
        copy
    }
}

/// 记忆引擎配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct EngineConfig {
    /// 向量存储
    pub vector_store: ProviderConfig,
    /// 语言模型
    pub llm: ProviderConfig,
    /// 嵌入模型
    pub embedder: ProviderConfig,
    /// 历史记录 SQLite 文件路径
    pub history_db_path: String,
}

impl EngineConfig {
    /// Offline configuration: in-process vector store, passthrough LLM and the hashing embedder.
    pub fn local(history_db_path: impl Into<String>) -> Self {
        Self {
            vector_store: ProviderConfig::new("memory"),
            llm: ProviderConfig::new("passthrough"),
            embedder: ProviderConfig::new("simple"),
            history_db_path: history_db_path.into(),
        }
    }

    /// 合并部分配置，已提供的段整体替换
    pub fn merged(&self, patch: EngineConfigPatch) -> Self {
        Self {
            vector_store: patch.vector_store.unwrap_or_else(|| self.vector_store.clone()),
            llm: patch.llm.unwrap_or_else(|| self.llm.clone()),
            embedder: patch.embedder.unwrap_or_else(|| self.embedder.clone()),
            history_db_path: patch
                .history_db_path
                .unwrap_or_else(|| self.history_db_path.clone()),
        }
    }

    pub fn redacted(&self) -> Self {
        Self {
            vector_store: self.vector_store.redacted(),
            llm: self.llm.redacted(),
            embedder: self.embedder.redacted(),
            history_db_path: self.history_db_path.clone(),
        }
    }
}

/// `POST /configure` 的请求体：任意子集
#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(deny_unknown_fields)]
pub struct EngineConfigPatch {
    pub vector_store: Option<ProviderConfig>,
    pub llm: Option<ProviderConfig>,
    pub embedder: Option<ProviderConfig>,
    pub history_db_path: Option<String>,
    /// 兼容旧客户端发送的版本号，忽略
    #[serde(default, skip_serializing)]
    pub version: Option<String>,
}

impl EngineConfigPatch {
    pub fn is_empty(&self) -> bool {
        self.vector_store.is_none()
            && self.llm.is_none()
            && self.embedder.is_none()
            && self.history_db_path.is_none()
    }
}

/// 应用配置
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 日志配置
    pub logging: LoggingConfig,
    /// 记忆引擎配置
    pub engine: EngineConfig,
    /// 加载时跳过的设置，日志初始化后输出
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_redaction_hides_secrets_only() {
        let provider = ProviderConfig::new("openai")
            .with("api_key", "sk-live")
            .with("model", "gpt-4.1-mini")
            .with("max_tokens", 512);

        let redacted = provider.redacted();
        assert_eq!(redacted.config["api_key"], json!("***"));
        assert_eq!(redacted.config["model"], json!("gpt-4.1-mini"));
        assert_eq!(redacted.config["max_tokens"], json!(512));
        assert_eq!(provider.config["api_key"], json!("sk-live"));
    }

    #[test]
    fn test_merge_replaces_only_supplied_sections() {
        let base = EngineConfig::local(":memory:");
        let patch = EngineConfigPatch {
            llm: Some(ProviderConfig::new("ollama").with("model", "llama3")),
            ..Default::default()
        };

        let merged = base.merged(patch);
        assert_eq!(merged.llm.provider, "ollama");
        assert_eq!(merged.vector_store, base.vector_store);
        assert_eq!(merged.embedder, base.embedder);
        assert_eq!(merged.history_db_path, ":memory:");
    }

    #[test]
    fn test_patch_rejects_unknown_sections() {
        let result: Result<EngineConfigPatch, _> =
            serde_json::from_value(json!({"graph_store": {"provider": "neo4j"}}));
        assert!(result.is_err());
    }

    #[test]
    fn test_get_str_ignores_empty() {
        let provider = ProviderConfig::new("openai").with("api_key", "");
        assert_eq!(provider.get_str("api_key"), None);
    }
}
