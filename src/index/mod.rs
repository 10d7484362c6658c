//! 索引模块
//!
//! 嵌入模型与向量存储抽象，以及进程内实现。

pub mod embedding;
pub mod vector;

pub use embedding::{Embedder, OllamaEmbedder, OpenAiEmbedder, SimpleEmbedder, create_embedder};
pub use vector::{MemoryVectorStore, VectorStore};
