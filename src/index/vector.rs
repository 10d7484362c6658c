//! 向量存储服务

use async_trait::async_trait;

use crate::engine::types::{MemoryPayload, Metadata, ScoredPayload};
use crate::error::{AppError, Result};

/// A vector collection holding one record per memory.
///
/// `filters` always carries the scope identifiers merged with caller filters; every key
/// must match exactly (see [`MemoryPayload::matches`]).
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn name(&self) -> &'static str;
    async fn insert(&self, id: &str, vector: &[f32], payload: &MemoryPayload) -> Result<()>;
    async fn search(
        &self,
        query: &[f32],
        filters: &Metadata,
        limit: usize,
    ) -> Result<Vec<ScoredPayload>>;
    async fn get(&self, id: &str) -> Result<Option<MemoryPayload>>;
    async fn update(&self, id: &str, vector: Option<&[f32]>, payload: &MemoryPayload)
    -> Result<()>;
    async fn delete(&self, id: &str) -> Result<bool>;
    async fn list(&self, filters: &Metadata, limit: usize) -> Result<Vec<(String, MemoryPayload)>>;
    async fn reset(&self) -> Result<()>;
}

/// 进程内向量存储，进程退出后数据丢失
pub struct MemoryVectorStore {
    vectors: dashmap::DashMap<String, (Vec<f32>, MemoryPayload)>,
    dimension: usize,
}

impl MemoryVectorStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            vectors: dashmap::DashMap::new(),
            dimension,
        }
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(AppError::VectorStore(format!(
                "vector dimension mismatch: expected {}, got {}",
                self.dimension,
                vector.len()
            )));
        }
        Ok(())
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot_product / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn insert(&self, id: &str, vector: &[f32], payload: &MemoryPayload) -> Result<()> {
        self.check_dimension(vector)?;
        self.vectors
            .insert(id.to_string(), (vector.to_vec(), payload.clone()));
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        filters: &Metadata,
        limit: usize,
    ) -> Result<Vec<ScoredPayload>> {
        self.check_dimension(query)?;

        let mut results: Vec<_> = self
            .vectors
            .iter()
            .filter(|entry| entry.value().1.matches(filters))
            .map(|entry| {
                let (id, (vector, payload)) = entry.pair();
                ScoredPayload {
                    id: id.clone(),
                    score: Self::cosine_similarity(query, vector),
                    payload: payload.clone(),
                }
            })
            .collect();

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(limit);

        Ok(results)
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryPayload>> {
        Ok(self.vectors.get(id).map(|entry| entry.value().1.clone()))
    }

    async fn update(
        &self,
        id: &str,
        vector: Option<&[f32]>,
        payload: &MemoryPayload,
    ) -> Result<()> {
        if let Some(vector) = vector {
            self.check_dimension(vector)?;
        }

        let mut entry = self
            .vectors
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("Memory not found: {}", id)))?;
        if let Some(vector) = vector {
            entry.0 = vector.to_vec();
        }
        entry.1 = payload.clone();
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.vectors.remove(id).is_some())
    }

    async fn list(&self, filters: &Metadata, limit: usize) -> Result<Vec<(String, MemoryPayload)>> {
        let mut results: Vec<_> = self
            .vectors
            .iter()
            .filter(|entry| entry.value().1.matches(filters))
            .map(|entry| (entry.key().clone(), entry.value().1.clone()))
            .collect();

        results.sort_by(|a, b| a.1.created_at.cmp(&b.1.created_at).then(a.0.cmp(&b.0)));
        results.truncate(limit);
        Ok(results)
    }

    async fn reset(&self) -> Result<()> {
        self.vectors.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::Scope;
    use serde_json::json;

    fn payload(text: &str, user: &str) -> MemoryPayload {
        MemoryPayload::new(text, Scope::user(user), Metadata::new())
    }

    fn user_filter(user: &str) -> Metadata {
        let mut filters = Metadata::new();
        filters.insert("user_id".into(), json!(user));
        filters
    }

    #[tokio::test]
    async fn test_add_and_search_within_scope() {
        let store = MemoryVectorStore::new(3);
        store
            .insert("a", &[1.0, 0.0, 0.0], &payload("alpha", "u1"))
            .await
            .unwrap();
        store
            .insert("b", &[0.0, 1.0, 0.0], &payload("beta", "u1"))
            .await
            .unwrap();
        store
            .insert("c", &[1.0, 0.0, 0.0], &payload("gamma", "u2"))
            .await
            .unwrap();

        let results = store
            .search(&[1.0, 0.1, 0.0], &user_filter("u1"), 10)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_an_error() {
        let store = MemoryVectorStore::new(3);
        let err = store
            .insert("a", &[1.0], &payload("alpha", "u1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::VectorStore(_)));
    }

    #[tokio::test]
    async fn test_update_delete_and_reset() {
        let store = MemoryVectorStore::new(2);
        store.insert("a", &[1.0, 0.0], &payload("old", "u1")).await.unwrap();

        store
            .update("a", Some(&[0.0, 1.0][..]), &payload("new", "u1"))
            .await
            .unwrap();
        assert_eq!(store.get("a").await.unwrap().unwrap().data, "new");

        assert!(matches!(
            store.update("missing", None, &payload("x", "u1")).await,
            Err(AppError::NotFound(_))
        ));

        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());

        store.insert("b", &[1.0, 0.0], &payload("b", "u1")).await.unwrap();
        store.reset().await.unwrap();
        assert!(store.list(&Metadata::new(), 10).await.unwrap().is_empty());
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];

        assert_eq!(MemoryVectorStore::cosine_similarity(&a, &b), 1.0);
        assert_eq!(MemoryVectorStore::cosine_similarity(&a, &c), 0.0);
    }
}
