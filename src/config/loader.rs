use crate::config::config::{
    EngineConfig, GatewayConfig, LoggingConfig, ProviderConfig, ServerConfig,
};
use crate::engine::factory::{EMBEDDER_PROVIDERS, LLM_PROVIDERS, VECTOR_PROVIDERS};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// 默认配置文件
const CONFIG_FILE: &str = "memgate.toml";

/// 环境变量（及可选配置文件）中识别的全部键，均为扁平结构
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EnvSettings {
    #[serde(deserialize_with = "lenient_string")]
    vector_provider: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    vector_host: Option<String>,
    vector_port: Option<u16>,
    #[serde(deserialize_with = "lenient_string")]
    vector_namespace: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    vector_db: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    vector_user: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    vector_password: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    vector_collection: Option<String>,

    #[serde(deserialize_with = "lenient_string")]
    llm_provider: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    llm_model: Option<String>,
    llm_temperature: Option<f64>,
    llm_extra_config: Option<Value>,

    #[serde(deserialize_with = "lenient_string")]
    embedder_provider: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    embedder_model: Option<String>,
    embedder_extra_config: Option<Value>,

    #[serde(deserialize_with = "lenient_string")]
    openai_api_key: Option<String>,

    #[serde(deserialize_with = "lenient_string")]
    history_db_path: Option<String>,

    #[serde(deserialize_with = "lenient_string")]
    host: Option<String>,
    port: Option<u16>,
    workers: Option<usize>,
    #[serde(deserialize_with = "lenient_string")]
    log_level: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    log_format: Option<String>,
}

/// Env values such as passwords may look numeric; accept any scalar as a string.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从默认路径加载配置
    ///
    /// 搜索顺序（后者覆盖前者）：
    /// 1. ./memgate.toml
    /// 2. `MEMGATE_*` 环境变量与 `OPENAI_API_KEY`
    pub fn load() -> Result<GatewayConfig, ConfigValidationError> {
        Self::load_from(PathBuf::from(CONFIG_FILE))
    }

    /// 从指定路径加载配置
    pub fn load_from(path: PathBuf) -> Result<GatewayConfig, ConfigValidationError> {
        let figment = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("MEMGATE_"))
            .merge(Env::raw().only(&["OPENAI_API_KEY"]));

        let settings: EnvSettings = figment.extract()?;
        let config = Self::assemble(settings);
        Self::validate(&config)?;
        Ok(config)
    }

    fn assemble(settings: EnvSettings) -> GatewayConfig {
        let vector_provider = settings
            .vector_provider
            .unwrap_or_else(|| "surrealdb".to_string());
        let mut vector_store = ProviderConfig::new(&vector_provider);
        if vector_provider == "surrealdb" {
            vector_store = vector_store
                .with("host", settings.vector_host.unwrap_or_else(|| "localhost".into()))
                .with("port", settings.vector_port.unwrap_or(8000))
                .with(
                    "namespace",
                    settings.vector_namespace.unwrap_or_else(|| "memgate".into()),
                )
                .with("database", settings.vector_db.unwrap_or_else(|| "memgate".into()))
                .with("user", settings.vector_user.unwrap_or_else(|| "root".into()))
                .with("password", settings.vector_password.unwrap_or_else(|| "root".into()))
                .with(
                    "collection_name",
                    settings.vector_collection.unwrap_or_else(|| "memories".into()),
                );
        }

        let llm_provider = settings.llm_provider.unwrap_or_else(|| "openai".to_string());
        let mut llm = ProviderConfig::new(&llm_provider).with(
            "model",
            settings.llm_model.unwrap_or_else(|| "gpt-4.1-mini".into()),
        );
        if let Some(temperature) = settings.llm_temperature {
            llm = llm.with("temperature", temperature);
        }
        let mut warnings = Vec::new();
        warnings.extend(merge_extra(
            &mut llm,
            settings.llm_extra_config,
            "MEMGATE_LLM_EXTRA_CONFIG",
        ));

        let embedder_provider = settings
            .embedder_provider
            .unwrap_or_else(|| "openai".to_string());
        let mut embedder = ProviderConfig::new(&embedder_provider);
        if let Some(model) = settings.embedder_model {
            embedder = embedder.with("model", model);
        }
        warnings.extend(merge_extra(
            &mut embedder,
            settings.embedder_extra_config,
            "MEMGATE_EMBEDDER_EXTRA_CONFIG",
        ));

        if let Some(api_key) = settings.openai_api_key.filter(|k| !k.is_empty()) {
            fill_api_key(&mut llm, &api_key);
            fill_api_key(&mut embedder, &api_key);
        }

        let defaults = ServerConfig::default();
        let server = ServerConfig {
            host: settings.host.unwrap_or(defaults.host),
            port: settings.port.unwrap_or(defaults.port),
            workers: settings.workers.unwrap_or(defaults.workers),
        };

        let logging = LoggingConfig {
            level: settings.log_level.unwrap_or_else(|| "info".into()),
            structured: settings
                .log_format
                .is_some_and(|f| f.eq_ignore_ascii_case("json")),
        };

        GatewayConfig {
            server,
            logging,
            engine: EngineConfig {
                vector_store,
                llm,
                embedder,
                history_db_path: settings
                    .history_db_path
                    .unwrap_or_else(|| "/var/lib/memgate/history.db".into()),
            },
            warnings,
        }
    }

    /// 验证配置
    pub fn validate(config: &GatewayConfig) -> Result<(), ConfigValidationError> {
        if config.server.port == 0 {
            return Err(ConfigValidationError::InvalidPort);
        }

        if config.server.workers == 0 {
            return Err(ConfigValidationError::InvalidWorkers);
        }

        Self::validate_engine(&config.engine)
    }

    /// 为运行时提交的引擎配置补上 `OPENAI_API_KEY`
    pub fn apply_env_api_key(engine: &mut EngineConfig) {
        if let Some(api_key) = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()) {
            fill_api_key(&mut engine.llm, &api_key);
            fill_api_key(&mut engine.embedder, &api_key);
        }
    }

    /// 验证引擎配置（启动时与 `/configure` 共用）
    pub fn validate_engine(engine: &EngineConfig) -> Result<(), ConfigValidationError> {
        let sections = [
            ("vector_store", &engine.vector_store, VECTOR_PROVIDERS),
            ("llm", &engine.llm, LLM_PROVIDERS),
            ("embedder", &engine.embedder, EMBEDDER_PROVIDERS),
        ];

        for (section, provider, known) in sections {
            if !known.contains(&provider.provider.as_str()) {
                return Err(ConfigValidationError::UnknownProvider {
                    section,
                    provider: provider.provider.clone(),
                });
            }
            if provider.provider == "openai" && provider.get_str("api_key").is_none() {
                return Err(ConfigValidationError::MissingApiKey(section));
            }
        }

        if engine.history_db_path.trim().is_empty() {
            return Err(ConfigValidationError::InvalidPath(
                "history_db_path is empty".into(),
            ));
        }

        Ok(())
    }
}

/// Gives an `openai` provider the process-wide key unless it carries its own.
fn fill_api_key(provider: &mut ProviderConfig, api_key: &str) {
    if provider.provider == "openai" && provider.get_str("api_key").is_none() {
        provider.config.insert("api_key".into(), api_key.into());
    }
}

/// Merges a JSON object (given inline or as a JSON string) into a provider config.
/// A malformed value is skipped and reported back as a warning.
fn merge_extra(provider: &mut ProviderConfig, extra: Option<Value>, var: &str) -> Option<String> {
    let parsed = match extra {
        None => return None,
        Some(Value::String(raw)) if raw.trim().is_empty() => return None,
        Some(Value::String(raw)) => serde_json::from_str::<Map<String, Value>>(&raw),
        Some(other) => serde_json::from_value::<Map<String, Value>>(other),
    };

    match parsed {
        Ok(map) => {
            provider.config.extend(map);
            None
        }
        Err(e) => Some(format!("Failed to parse {}: {}", var, e)),
    }
}

/// 配置验证错误
#[derive(thiserror::Error, Debug)]
pub enum ConfigValidationError {
    #[error("failed to read configuration: {0}")]
    Extract(#[from] figment::Error),

    #[error("server port must be greater than 0")]
    InvalidPort,

    #[error("worker count must be greater than 0")]
    InvalidWorkers,

    #[error("unknown {section} provider: {provider}")]
    UnknownProvider {
        section: &'static str,
        provider: String,
    },

    #[error("{0} provider `openai` requires an API key; set OPENAI_API_KEY")]
    MissingApiKey(&'static str),

    #[error("invalid path: {0}")]
    InvalidPath(String),
}
