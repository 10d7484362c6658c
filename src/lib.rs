//! memgate - 记忆网关
//!
//! 通过 REST API 为 AI Agent 提供记忆的写入、检索、更新和删除。事实抽取、
//! 向量化和相似度检索交给可替换的 provider（OpenAI、Ollama、SurrealDB）。

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod llm;
pub mod observability;
pub mod storage;
