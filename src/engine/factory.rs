//! 引擎工厂
//!
//! 根据 `EngineConfig` 创建各个 provider 并组装成 `MemoryEngine`。

use std::sync::Arc;
use tracing::info;

use super::MemoryEngine;
use crate::config::config::{EngineConfig, ProviderConfig};
use crate::error::{AppError, Result};
use crate::index::{Embedder, MemoryVectorStore, VectorStore, create_embedder};
use crate::llm::create_language_model;
use crate::storage::HistoryStore;

pub const VECTOR_PROVIDERS: &[&str] = &["surrealdb", "memory"];
pub const LLM_PROVIDERS: &[&str] = &["openai", "ollama", "passthrough"];
pub const EMBEDDER_PROVIDERS: &[&str] = &["openai", "ollama", "simple"];

/// 创建向量存储，`dimension` 来自嵌入模型
#[cfg(feature = "surrealdb")]
pub async fn create_vector_store(
    config: &ProviderConfig,
    dimension: usize,
) -> Result<Arc<dyn VectorStore>> {
    use crate::storage::surrealdb::{SurrealSettings, SurrealVectorStore};

    match config.provider.as_str() {
        "surrealdb" => {
            let settings = SurrealSettings::from_provider(config)?;
            Ok(Arc::new(SurrealVectorStore::connect(settings, dimension).await?))
        }
        "memory" => Ok(Arc::new(MemoryVectorStore::new(dimension))),
        other => Err(AppError::Config(format!(
            "unknown vector_store provider: {}",
            other
        ))),
    }
}

#[cfg(not(feature = "surrealdb"))]
pub async fn create_vector_store(
    config: &ProviderConfig,
    dimension: usize,
) -> Result<Arc<dyn VectorStore>> {
    match config.provider.as_str() {
        "surrealdb" => Err(AppError::Config(
            "SurrealDB support is not enabled. Enable the 'surrealdb' feature to use it.".into(),
        )),
        "memory" => Ok(Arc::new(MemoryVectorStore::new(dimension))),
        other => Err(AppError::Config(format!(
            "unknown vector_store provider: {}",
            other
        ))),
    }
}

/// 从零构建一个引擎
pub async fn build_engine(config: &EngineConfig) -> Result<MemoryEngine> {
    let embedder: Arc<dyn Embedder> = Arc::from(create_embedder(&config.embedder)?);
    let vector_store = create_vector_store(&config.vector_store, embedder.dimension()).await?;
    let llm = Arc::from(create_language_model(&config.llm)?);
    let history = HistoryStore::open(&config.history_db_path).await?;

    info!(
        "Memory engine ready: vector_store={}, llm={}, embedder={} ({} dims)",
        vector_store.name(),
        config.llm.provider,
        embedder.name(),
        embedder.dimension()
    );

    Ok(MemoryEngine::new(vector_store, embedder, llm, history))
}

/// 按新配置重建引擎，未变化的段复用旧引擎中的实例
///
/// The vector store is tied to the embedder dimension, so both are rebuilt when either
/// section changes.
pub async fn rebuild_engine(
    config: &EngineConfig,
    previous_config: &EngineConfig,
    previous: &MemoryEngine,
) -> Result<MemoryEngine> {
    let (embedder, vector_store) = if config.embedder == previous_config.embedder
        && config.vector_store == previous_config.vector_store
    {
        (previous.embedder().clone(), previous.vector_store().clone())
    } else {
        let embedder: Arc<dyn Embedder> = Arc::from(create_embedder(&config.embedder)?);
        let store = create_vector_store(&config.vector_store, embedder.dimension()).await?;
        (embedder, store)
    };

    let llm = Arc::from(create_language_model(&config.llm)?);

    let history = if config.history_db_path == previous_config.history_db_path {
        previous.history_store().clone()
    } else {
        HistoryStore::open(&config.history_db_path).await?
    };

    info!(
        "Memory engine rebuilt: vector_store={}, llm={}, embedder={}",
        vector_store.name(),
        config.llm.provider,
        embedder.name()
    );

    Ok(MemoryEngine::new(vector_store, embedder, llm, history))
}
