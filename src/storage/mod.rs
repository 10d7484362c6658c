//! 存储层模块
//!
//! SQLite 历史记录，以及 SurrealDB 向量存储（`surrealdb` 特性）。

pub mod history;

#[cfg(feature = "surrealdb")]
pub mod surrealdb;

pub use history::{HistoryEntry, HistoryStore};
