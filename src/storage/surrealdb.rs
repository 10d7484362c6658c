//! SurrealDB 向量存储

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use surrealdb::{
    Surreal,
    engine::any::{Any, connect},
    opt::auth::Root,
};
use tracing::{debug, info};

use crate::config::config::ProviderConfig;
use crate::engine::types::{MemoryPayload, Metadata, ScoredPayload};
use crate::error::{AppError, Result};
use crate::index::VectorStore;

/// 字段名与表名只允许标识符字符，它们会被拼接进查询
static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

const SCOPE_FIELDS: [&str; 3] = ["user_id", "agent_id", "run_id"];

/// SurrealDB 连接参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SurrealSettings {
    /// 完整连接地址，优先于 host/port，例如 `ws://db:8000` 或 `mem://`
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub namespace: String,
    #[serde(alias = "dbname")]
    pub database: String,
    #[serde(alias = "username")]
    pub user: String,
    pub password: String,
    pub collection_name: String,
}

impl Default for SurrealSettings {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".into(),
            port: 8000,
            namespace: "memgate".into(),
            database: "memgate".into(),
            user: "root".into(),
            password: "root".into(),
            collection_name: "memories".into(),
        }
    }
}

impl SurrealSettings {
    pub fn from_provider(config: &ProviderConfig) -> Result<Self> {
        let settings: Self = serde_json::from_value(Value::Object(config.config.clone()))
            .map_err(|e| AppError::Config(format!("vector_store config: {}", e)))?;
        if !IDENTIFIER.is_match(&settings.collection_name) {
            return Err(AppError::Config(format!(
                "invalid collection name: {}",
                settings.collection_name
            )));
        }
        Ok(settings)
    }

    pub fn endpoint(&self) -> String {
        self.url
            .clone()
            .unwrap_or_else(|| format!("ws://{}:{}", self.host, self.port))
    }
}

#[derive(Debug, Deserialize)]
struct Row {
    memory_id: String,
    payload_json: String,
    #[serde(default)]
    score: Option<f32>,
}

impl Row {
    fn payload(&self) -> Result<MemoryPayload> {
        serde_json::from_str(&self.payload_json)
            .map_err(|e| AppError::VectorStore(format!("corrupt record {}: {}", self.memory_id, e)))
    }
}

/// SurrealDB 向量存储，相似度计算在数据库内完成
pub struct SurrealVectorStore {
    db: Surreal<Any>,
    table: String,
    dimension: usize,
}

impl SurrealVectorStore {
    /// 连接、认证并选择命名空间和数据库
    pub async fn connect(settings: SurrealSettings, dimension: usize) -> Result<Self> {
        let endpoint = settings.endpoint();
        let db: Surreal<Any> = connect(&endpoint)
            .await
            .map_err(|e| AppError::Connection(format!("{}: {}", endpoint, e)))?;

        if !settings.user.is_empty() {
            db.signin(Root {
                username: &settings.user,
                password: &settings.password,
            })
            .await
            .map_err(|e| AppError::Connection(format!("signin to {} failed: {}", endpoint, e)))?;
        }

        db.use_ns(&settings.namespace)
            .use_db(&settings.database)
            .await?;

        info!(
            "Connected to SurrealDB at {} ({}/{}, table {})",
            endpoint, settings.namespace, settings.database, settings.collection_name
        );

        Ok(Self {
            db,
            table: settings.collection_name,
            dimension,
        })
    }

    /// Builds the `WHERE` clause; returns the clause and the bindings it references.
    fn where_clause(filters: &Metadata) -> Result<(String, Vec<(String, Value)>)> {
        let mut conditions = Vec::with_capacity(filters.len());
        let mut bindings = Vec::with_capacity(filters.len());

        for (i, (key, value)) in filters.iter().enumerate() {
            if !IDENTIFIER.is_match(key) {
                return Err(AppError::Validation(format!("invalid filter key: {}", key)));
            }
            let field = if SCOPE_FIELDS.contains(&key.as_str()) {
                key.clone()
            } else {
                format!("metadata.{}", key)
            };
            let param = format!("f{}", i);
            conditions.push(format!("{} = ${}", field, param));
            bindings.push((param, value.clone()));
        }

        if conditions.is_empty() {
            Ok((String::new(), bindings))
        } else {
            Ok((format!(" WHERE {}", conditions.join(" AND ")), bindings))
        }
    }

    fn record(&self, id: &str, vector: &[f32], payload: &MemoryPayload) -> Result<Value> {
        let mut content = serde_json::to_value(payload)?;
        content["memory_id"] = Value::String(id.to_string());
        content["embedding"] = serde_json::to_value(vector)?;
        content["payload_json"] = Value::String(serde_json::to_string(payload)?);
        Ok(content)
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

    async fn fetch_rows(&self, sql: String, bindings: Vec<(String, Value)>) -> Result<Vec<Row>> {
        debug!("Executing query: {}", sql);
        let mut query = self.db.query(sql).bind(("table", self.table.clone()));
        for binding in bindings {
            query = query.bind(binding);
        }
        let mut response = query.await?;
        let rows: Vec<Row> = response.take(0)?;
        Ok(rows)
    }
}

#[async_trait]
impl VectorStore for SurrealVectorStore {
    fn name(&self) -> &'static str {
        "surrealdb"
    }

    async fn insert(&self, id: &str, vector: &[f32], payload: &MemoryPayload) -> Result<()> {
        self.check_dimension(vector)?;
        let content = self.record(id, vector, payload)?;
        self.db
            .query("CREATE type::thing($table, $id) CONTENT $content RETURN NONE")
            .bind(("table", self.table.clone()))
            .bind(("id", id.to_string()))
            .bind(("content", content))
            .await?
            .check()?;
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        filters: &Metadata,
        limit: usize,
    ) -> Result<Vec<ScoredPayload>> {
        self.check_dimension(query)?;
        let (clause, mut bindings) = Self::where_clause(filters)?;
        bindings.push(("query".into(), serde_json::to_value(query)?));
        bindings.push(("limit".into(), Value::from(limit)));

        let sql = format!(
            "SELECT memory_id, payload_json, vector::similarity::cosine(embedding, $query) AS score \
             FROM type::table($table){} ORDER BY score DESC LIMIT $limit",
            clause
        );

        self.fetch_rows(sql, bindings)
            .await?
            .into_iter()
            .map(|row| -> Result<ScoredPayload> {
                Ok(ScoredPayload {
                    payload: row.payload()?,
                    score: row.score.unwrap_or(0.0),
                    id: row.memory_id,
                })
            })
            .collect()
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryPayload>> {
        let rows = self
            .fetch_rows(
                "SELECT memory_id, payload_json FROM type::thing($table, $id)".into(),
                vec![("id".into(), Value::String(id.to_string()))],
            )
            .await?;
        rows.first().map(Row::payload).transpose()
    }

    async fn update(
        &self,
        id: &str,
        vector: Option<&[f32]>,
        payload: &MemoryPayload,
    ) -> Result<()> {
        if self.get(id).await?.is_none() {
            return Err(AppError::NotFound(format!("Memory not found: {}", id)));
        }

        let mut content = serde_json::to_value(payload)?;
        content["payload_json"] = Value::String(serde_json::to_string(payload)?);
        if let Some(vector) = vector {
            self.check_dimension(vector)?;
            content["embedding"] = serde_json::to_value(vector)?;
        }

        self.db
            .query("UPDATE type::thing($table, $id) MERGE $content RETURN NONE")
            .bind(("table", self.table.clone()))
            .bind(("id", id.to_string()))
            .bind(("content", content))
            .await?
            .check()?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        if self.get(id).await?.is_none() {
            return Ok(false);
        }
        self.db
            .query("DELETE type::thing($table, $id)")
            .bind(("table", self.table.clone()))
            .bind(("id", id.to_string()))
            .await?
            .check()?;
        Ok(true)
    }

    async fn list(&self, filters: &Metadata, limit: usize) -> Result<Vec<(String, MemoryPayload)>> {
        let (clause, mut bindings) = Self::where_clause(filters)?;
        bindings.push(("limit".into(), Value::from(limit)));
        let sql = format!(
            "SELECT memory_id, payload_json, created_at FROM type::table($table){} \
             ORDER BY created_at ASC LIMIT $limit",
            clause
        );

        self.fetch_rows(sql, bindings)
            .await?
            .into_iter()
            .map(|row| -> Result<(String, MemoryPayload)> {
                Ok((row.memory_id.clone(), row.payload()?))
            })
            .collect()
    }

    async fn reset(&self) -> Result<()> {
        self.db
            .query("DELETE type::table($table)")
            .bind(("table", self.table.clone()))
            .await?
            .check()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::Scope;
    use serde_json::json;

    async fn store() -> SurrealVectorStore {
        let settings = SurrealSettings {
            url: Some("mem://".into()),
            user: String::new(),
            ..Default::default()
        };
        SurrealVectorStore::connect(settings, 3).await.unwrap()
    }

    #[test]
    fn test_where_clause_maps_metadata_fields() {
        let mut filters = Metadata::new();
        filters.insert("user_id".into(), json!("u1"));
        filters.insert("topic".into(), json!("food"));

        let (clause, bindings) = SurrealVectorStore::where_clause(&filters).unwrap();
        assert!(clause.contains("user_id = $f"));
        assert!(clause.contains("metadata.topic = $f"));
        assert_eq!(bindings.len(), 2);
    }

    #[test]
    fn test_where_clause_rejects_injection() {
        let mut filters = Metadata::new();
        filters.insert("a = 1 OR true; --".into(), json!(1));
        assert!(matches!(
            SurrealVectorStore::where_clause(&filters),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_settings_defaults_and_aliases() {
        let config = ProviderConfig::new("surrealdb")
            .with("dbname", "mem")
            .with("port", 9000);
        let settings = SurrealSettings::from_provider(&config).unwrap();
        assert_eq!(settings.database, "mem");
        assert_eq!(settings.endpoint(), "ws://localhost:9000");

        let bad = ProviderConfig::new("surrealdb").with("collection_name", "drop table");
        assert!(SurrealSettings::from_provider(&bad).is_err());
    }

    #[tokio::test]
    async fn test_embedded_roundtrip() {
        let store = store().await;
        let payload = MemoryPayload::new("Name is John", Scope::user("u1"), Metadata::new());
        store.insert("m1", &[1.0, 0.0, 0.0], &payload).await.unwrap();
        store
            .insert(
                "m2",
                &[0.0, 1.0, 0.0],
                &MemoryPayload::new("Likes tea", Scope::user("u2"), Metadata::new()),
            )
            .await
            .unwrap();

        let mut filters = Metadata::new();
        filters.insert("user_id".into(), json!("u1"));

        let hits = store.search(&[0.9, 0.1, 0.0], &filters, 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "m1");
        assert_eq!(hits[0].payload.data, "Name is John");

        assert_eq!(store.list(&filters, 10).await.unwrap().len(), 1);
        assert!(store.delete("m1").await.unwrap());
        assert!(store.get("m1").await.unwrap().is_none());

        store.reset().await.unwrap();
        assert!(store.list(&Metadata::new(), 10).await.unwrap().is_empty());
    }
}
