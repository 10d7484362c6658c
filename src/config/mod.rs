//! 配置管理模块
//!
//! 从 `memgate.toml` 与 `MEMGATE_*` 环境变量加载配置，并提供启动校验。

pub mod config;
pub mod loader;
