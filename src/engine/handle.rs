//! 引擎句柄：带版本号的原子替换
//!
//! Requests clone the current `Arc<ActiveEngine>` under a short read lock and never hold the
//! lock across an await. A reconfigure builds the next engine outside the lock and swaps it in,
//! so in-flight requests finish on the generation they started with.

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::MemoryEngine;
use super::factory::{build_engine, rebuild_engine};
use crate::config::config::{EngineConfig, EngineConfigPatch};
use crate::config::loader::ConfigLoader;
use crate::error::{AppError, Result};

/// 某一代配置及其引擎
pub struct ActiveEngine {
    pub generation: u64,
    pub config: EngineConfig,
    pub engine: MemoryEngine,
}

impl std::fmt::Debug for ActiveEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveEngine")
            .field("generation", &self.generation)
            .field("providers", &self.engine.providers())
            .finish()
    }
}

pub struct EngineHandle {
    active: RwLock<Arc<ActiveEngine>>,
    reconfigure_lock: Mutex<()>,
}

impl EngineHandle {
    /// 构建第一代引擎
    pub async fn start(config: EngineConfig) -> Result<Self> {
        let engine = build_engine(&config).await?;
        Ok(Self::new(config, engine))
    }

    pub fn new(config: EngineConfig, engine: MemoryEngine) -> Self {
        Self {
            active: RwLock::new(Arc::new(ActiveEngine {
                generation: 1,
                config,
                engine,
            })),
            reconfigure_lock: Mutex::new(()),
        }
    }

    /// 当前快照
    pub fn current(&self) -> Arc<ActiveEngine> {
        self.active.read().clone()
    }

    pub fn generation(&self) -> u64 {
        self.active.read().generation
    }

    /// 合并补丁、校验并替换引擎。失败时保留当前一代。
    pub async fn reconfigure(&self, patch: EngineConfigPatch) -> Result<Arc<ActiveEngine>> {
        if patch.is_empty() {
            return Err(AppError::Validation(
                "configuration must contain at least one of vector_store, llm, embedder, history_db_path"
                    .into(),
            ));
        }

        let _guard = self.reconfigure_lock.lock().await;
        let previous = self.current();

        let mut config = previous.config.merged(patch);
        ConfigLoader::apply_env_api_key(&mut config);
        ConfigLoader::validate_engine(&config).map_err(|e| {
            warn!("Rejected configuration: {}", e);
            AppError::Config(e.to_string())
        })?;

        let engine = rebuild_engine(&config, &previous.config, &previous.engine)
            .await
            .inspect_err(|e| warn!("Failed to build engine for new configuration: {}", e))?;

        let next = Arc::new(ActiveEngine {
            generation: previous.generation + 1,
            config,
            engine,
        });
        *self.active.write() = next.clone();

        info!("Engine reconfigured, generation {}", next.generation);
        Ok(next)
    }
}
