//! 记忆引擎
//!
//! 把语言模型、嵌入模型、向量存储和历史记录组合成记忆操作。一个 `MemoryEngine`
//! 对应一代配置，由 [`handle::EngineHandle`] 负责热替换。

pub mod factory;
pub mod handle;
pub mod types;

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::index::{Embedder, VectorStore};
use crate::llm::LanguageModel;
use crate::storage::{HistoryEntry, HistoryStore};
use types::{
    EventKind, HistoryRecord, MemoryEvent, MemoryItem, MemoryPayload, Message, Metadata, Role,
    Scope, content_hash,
};

pub use handle::{ActiveEngine, EngineHandle};

/// 批量删除时每次读取的记录数
const DELETE_BATCH: usize = 500;

/// 去重时检查的近邻数量
const DEDUP_CANDIDATES: usize = 5;

/// 写入请求
#[derive(Debug, Clone, Default)]
pub struct AddRequest {
    pub messages: Vec<Message>,
    pub scope: Scope,
    pub metadata: Metadata,
    /// `false` 时不调用语言模型，逐条保存消息原文
    pub infer: bool,
}

/// 检索请求
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    pub scope: Scope,
    pub filters: Metadata,
    pub limit: usize,
    pub threshold: Option<f32>,
}

/// 记忆更新，至少包含一项
#[derive(Debug, Clone, Default)]
pub struct MemoryUpdate {
    pub text: Option<String>,
    pub metadata: Option<Metadata>,
}

pub struct MemoryEngine {
    vector_store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LanguageModel>,
    history: HistoryStore,
}

impl MemoryEngine {
    pub fn new(
        vector_store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
        history: HistoryStore,
    ) -> Self {
        Self {
            vector_store,
            embedder,
            llm,
            history,
        }
    }

    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn history_store(&self) -> &HistoryStore {
        &self.history
    }

    /// Provider names, in `vector_store / llm / embedder` order.
    pub fn providers(&self) -> (&'static str, &'static str, &'static str) {
        (
            self.vector_store.name(),
            self.llm.name(),
            self.embedder.name(),
        )
    }

    /// 抽取事实并写入。已存在于同一作用域的相同内容被跳过。
    #[instrument(skip(self, request), fields(messages = request.messages.len()))]
    pub async fn add(&self, request: AddRequest) -> Result<Vec<MemoryEvent>> {
        require_scope(&request.scope)?;
        if request.messages.is_empty() {
            return Err(AppError::Validation("messages must not be empty".into()));
        }

        let facts = if request.infer {
            self.llm.extract_facts(&request.messages).await?
        } else {
            request
                .messages
                .iter()
                .filter(|m| m.role != Role::System)
                .map(|m| m.content.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect()
        };
        debug!("{} candidate facts", facts.len());

        let mut seen = HashSet::new();
        let facts: Vec<String> = facts
            .into_iter()
            .filter(|fact| seen.insert(content_hash(fact)))
            .collect();
        if facts.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = facts.iter().map(String::as_str).collect();
        let vectors = self.embedder.encode_batch(&texts).await?;
        if vectors.len() != facts.len() {
            return Err(AppError::Embedding(format!(
                "embedder returned {} vectors for {} facts",
                vectors.len(),
                facts.len()
            )));
        }

        let scope_filters = scope_filters(&request.scope, &Metadata::new());
        let mut events = Vec::with_capacity(facts.len());

        for (fact, vector) in facts.into_iter().zip(vectors) {
            let hash = content_hash(&fact);
            let duplicate = self
                .vector_store
                .search(&vector, &scope_filters, DEDUP_CANDIDATES)
                .await?
                .iter()
                .any(|hit| hit.payload.hash == hash);
            if duplicate {
                debug!("skipping known fact {}", hash);
                continue;
            }

            let id = Uuid::new_v4().to_string();
            let payload =
                MemoryPayload::new(&fact, request.scope.clone(), request.metadata.clone());
            self.vector_store.insert(&id, &vector, &payload).await?;
            self.history
                .append(HistoryEntry {
                    memory_id: &id,
                    old_memory: None,
                    new_memory: Some(&fact),
                    event: EventKind::Add,
                    created_at: payload.created_at,
                    updated_at: None,
                    is_deleted: false,
                })
                .await?;

            events.push(MemoryEvent {
                id,
                memory: fact,
                event: EventKind::Add,
                previous_memory: None,
            });
        }

        info!("Stored {} new memories", events.len());
        Ok(events)
    }

    pub async fn get(&self, id: &str) -> Result<MemoryItem> {
        let payload = self
            .vector_store
            .get(id)
            .await?
            .ok_or_else(|| not_found(id))?;
        Ok(MemoryItem::from_payload(id, payload, None))
    }

    pub async fn get_all(
        &self,
        scope: &Scope,
        filters: &Metadata,
        limit: usize,
    ) -> Result<Vec<MemoryItem>> {
        require_scope(scope)?;
        let rows = self
            .vector_store
            .list(&scope_filters(scope, filters), limit)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(id, payload)| MemoryItem::from_payload(&id, payload, None))
            .collect())
    }

    #[instrument(skip(self, request), fields(limit = request.limit))]
    pub async fn search(&self, request: SearchRequest) -> Result<Vec<MemoryItem>> {
        require_scope(&request.scope)?;
        let query = request.query.trim();
        if query.is_empty() {
            return Err(AppError::Validation("query must not be empty".into()));
        }

        let vector = self.embedder.encode(query).await?;
        let hits = self
            .vector_store
            .search(
                &vector,
                &scope_filters(&request.scope, &request.filters),
                request.limit,
            )
            .await?;

        Ok(hits
            .into_iter()
            .filter(|hit| request.threshold.is_none_or(|t| hit.score >= t))
            .map(|hit| MemoryItem::from_payload(&hit.id, hit.payload, Some(hit.score)))
            .collect())
    }

    pub async fn update(&self, id: &str, update: MemoryUpdate) -> Result<MemoryItem> {
        let text = update
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        if text.is_none() && update.metadata.is_none() {
            return Err(AppError::Validation(
                "update requires text or metadata".into(),
            ));
        }

        let existing = self
            .vector_store
            .get(id)
            .await?
            .ok_or_else(|| not_found(id))?;

        let now = Utc::now();
        let mut payload = existing.clone();
        payload.updated_at = Some(now);
        if let Some(metadata) = update.metadata {
            payload.metadata.extend(metadata);
        }

        let vector = match text {
            Some(text) => {
                payload.data = text.to_string();
                payload.hash = content_hash(text);
                Some(self.embedder.encode(text).await?)
            }
            None => None,
        };

        self.vector_store
            .update(id, vector.as_deref(), &payload)
            .await?;
        self.history
            .append(HistoryEntry {
                memory_id: id,
                old_memory: Some(&existing.data),
                new_memory: Some(&payload.data),
                event: EventKind::Update,
                created_at: now,
                updated_at: Some(now),
                is_deleted: false,
            })
            .await?;

        Ok(MemoryItem::from_payload(id, payload, None))
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let existing = self
            .vector_store
            .get(id)
            .await?
            .ok_or_else(|| not_found(id))?;
        self.remove(id, &existing.data).await?;
        Ok(())
    }

    /// 删除作用域内全部记忆，返回删除数量
    pub async fn delete_all(&self, scope: &Scope) -> Result<usize> {
        require_scope(scope)?;
        let filters = scope_filters(scope, &Metadata::new());
        let mut deleted = 0;

        loop {
            let batch = self.vector_store.list(&filters, DELETE_BATCH).await?;
            if batch.is_empty() {
                break;
            }
            let before = deleted;
            for (id, payload) in batch {
                if self.remove(&id, &payload.data).await? {
                    deleted += 1;
                }
            }
            if deleted == before {
                return Err(AppError::VectorStore(
                    "bulk delete made no progress".into(),
                ));
            }
        }

        info!("Deleted {} memories", deleted);
        Ok(deleted)
    }

    pub async fn reset(&self) -> Result<()> {
        self.vector_store.reset().await?;
        self.history.reset().await?;
        info!("Memory store reset");
        Ok(())
    }

    pub async fn history(&self, id: &str) -> Result<Vec<HistoryRecord>> {
        self.history.list(id).await
    }

    async fn remove(&self, id: &str, text: &str) -> Result<bool> {
        let removed = self.vector_store.delete(id).await?;
        if removed {
            let now = Utc::now();
            self.history
                .append(HistoryEntry {
                    memory_id: id,
                    old_memory: Some(text),
                    new_memory: None,
                    event: EventKind::Delete,
                    created_at: now,
                    updated_at: Some(now),
                    is_deleted: true,
                })
                .await?;
        }
        Ok(removed)
    }
}

fn require_scope(scope: &Scope) -> Result<()> {
    if scope.is_empty() {
        return Err(AppError::Validation(
            "One of the filters: user_id, agent_id or run_id is required".into(),
        ));
    }
    Ok(())
}

/// Scope identifiers take precedence over same-named keys in `filters`.
fn scope_filters(scope: &Scope, filters: &Metadata) -> Metadata {
    let mut combined = filters.clone();
    for (key, value) in scope.pairs() {
        combined.insert(key.to_string(), value.into());
    }
    combined
}

fn not_found(id: &str) -> AppError {
    AppError::NotFound(format!("Memory {} not found", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::config::EngineConfig;
    use serde_json::json;

    async fn engine() -> MemoryEngine {
        factory::build_engine(&EngineConfig::local(":memory:"))
            .await
            .unwrap()
    }

    fn add_request(user: &str, texts: &[&str]) -> AddRequest {
        AddRequest {
            messages: texts.iter().map(|t| Message::user(*t)).collect(),
            scope: Scope::user(user),
            metadata: Metadata::new(),
            infer: true,
        }
    }

    /// 只返回第一条向量的嵌入器
    struct TruncatingEmbedder;

    #[async_trait::async_trait]
    impl Embedder for TruncatingEmbedder {
        fn name(&self) -> &'static str {
            "truncating"
        }

        async fn encode(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        async fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().take(1).map(|_| vec![1.0, 0.0]).collect())
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    #[tokio::test]
    async fn test_add_fails_when_embedder_drops_vectors() {
        let engine = MemoryEngine::new(
            Arc::new(crate::index::MemoryVectorStore::new(2)),
            Arc::new(TruncatingEmbedder),
            Arc::new(crate::llm::PassthroughLanguageModel),
            HistoryStore::open(":memory:").await.unwrap(),
        );

        let err = engine
            .add(add_request("alice", &["Likes tea", "Lives in Oslo"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Embedding(_)));
        assert!(
            engine
                .get_all(&Scope::user("alice"), &Metadata::new(), 10)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_add_then_search() {
        let engine = engine().await;
        let events = engine
            .add(add_request("alice", &["My name is John"]))
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, EventKind::Add);

        let results = engine
            .search(SearchRequest {
                query: "what is my name".into(),
                scope: Scope::user("alice"),
                limit: 5,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].memory, "My name is John");
        assert!(results[0].score.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_facts_are_skipped() {
        let engine = engine().await;
        engine
            .add(add_request("alice", &["Likes tea"]))
            .await
            .unwrap();
        let events = engine
            .add(add_request("alice", &["Likes tea", "Likes tea", "Lives in Oslo"]))
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].memory, "Lives in Oslo");

        // same text under another user is a separate memory
        let other = engine
            .add(add_request("bob", &["Likes tea"]))
            .await
            .unwrap();
        assert_eq!(other.len(), 1);
    }

    #[tokio::test]
    async fn test_scope_is_required() {
        let engine = engine().await;
        let mut request = add_request("alice", &["x"]);
        request.scope = Scope::default();
        assert!(matches!(
            engine.add(request).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            engine
                .get_all(&Scope::default(), &Metadata::new(), 10)
                .await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            engine.delete_all(&Scope::default()).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_update_merges_metadata_and_records_history() {
        let engine = engine().await;
        let mut request = add_request("alice", &["Likes tea"]);
        request.metadata.insert("source".into(), json!("chat"));
        let id = engine.add(request).await.unwrap().remove(0).id;

        let mut metadata = Metadata::new();
        metadata.insert("topic".into(), json!("drinks"));
        let item = engine
            .update(
                &id,
                MemoryUpdate {
                    text: Some("Likes coffee".into()),
                    metadata: Some(metadata),
                },
            )
            .await
            .unwrap();
        assert_eq!(item.memory, "Likes coffee");
        assert_eq!(item.metadata["source"], json!("chat"));
        assert_eq!(item.metadata["topic"], json!("drinks"));
        assert!(item.updated_at.is_some());

        let history = engine.history(&id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].event, EventKind::Update);
        assert_eq!(history[1].old_memory.as_deref(), Some("Likes tea"));
        assert_eq!(history[1].new_memory.as_deref(), Some("Likes coffee"));
    }

    #[tokio::test]
    async fn test_update_requires_a_field_and_known_id() {
        let engine = engine().await;
        assert!(matches!(
            engine.update("missing", MemoryUpdate::default()).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            engine
                .update(
                    "missing",
                    MemoryUpdate {
                        text: Some("x".into()),
                        metadata: None
                    }
                )
                .await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_keeps_history() {
        let engine = engine().await;
        let id = engine
            .add(add_request("alice", &["Likes tea"]))
            .await
            .unwrap()
            .remove(0)
            .id;

        engine.delete(&id).await.unwrap();
        assert!(matches!(engine.get(&id).await, Err(AppError::NotFound(_))));
        assert!(matches!(engine.delete(&id).await, Err(AppError::NotFound(_))));

        let history = engine.history(&id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[1].is_deleted);
        assert_eq!(history[1].event, EventKind::Delete);
    }

    #[tokio::test]
    async fn test_delete_all_is_scoped() {
        let engine = engine().await;
        engine
            .add(add_request("alice", &["a1", "a2", "a3"]))
            .await
            .unwrap();
        engine.add(add_request("bob", &["b1"])).await.unwrap();

        assert_eq!(engine.delete_all(&Scope::user("alice")).await.unwrap(), 3);
        assert!(
            engine
                .get_all(&Scope::user("alice"), &Metadata::new(), 100)
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(
            engine
                .get_all(&Scope::user("bob"), &Metadata::new(), 100)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_infer_false_stores_messages_verbatim() {
        let engine = engine().await;
        let events = engine
            .add(AddRequest {
                messages: vec![Message::user("hello"), Message::assistant("Hi there")],
                scope: Scope::user("alice"),
                metadata: Metadata::new(),
                infer: false,
            })
            .await
            .unwrap();
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_reset_clears_memories_and_history() {
        let engine = engine().await;
        let id = engine
            .add(add_request("alice", &["Likes tea"]))
            .await
            .unwrap()
            .remove(0)
            .id;
        engine.reset().await.unwrap();
        assert!(
            engine
                .get_all(&Scope::user("alice"), &Metadata::new(), 100)
                .await
                .unwrap()
                .is_empty()
        );
        assert!(engine.history(&id).await.unwrap().is_empty());
    }
}
