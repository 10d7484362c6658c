//! 嵌入模型服务

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::config::ProviderConfig;
use crate::error::{AppError, Result};

#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &'static str;
    async fn encode(&self, text: &str) -> Result<Vec<f32>>;
    async fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;
    fn dimension(&self) -> usize;
}

/// Provider-agnostic embedder settings read from `embedder.config`.
#[derive(Debug, Clone, Deserialize)]
struct EmbedderSettings {
    model: Option<String>,
    api_key: Option<String>,
    #[serde(alias = "openai_base_url", alias = "ollama_base_url")]
    base_url: Option<String>,
    embedding_dims: Option<usize>,
    timeout_secs: Option<u64>,
}

impl EmbedderSettings {
    fn from_provider(config: &ProviderConfig) -> Result<Self> {
        serde_json::from_value(serde_json::Value::Object(config.config.clone()))
            .map_err(|e| AppError::Config(format!("embedder config: {}", e)))
    }

    fn client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs.unwrap_or(60)))
            .build()
            .map_err(|e| AppError::Config(format!("embedder http client: {}", e)))
    }
}

/// 基于特征哈希的本地嵌入，无需外部服务
///
/// Lowercased alphanumeric tokens are hashed into `dimension` signed buckets and the
/// result is L2-normalised, so texts sharing words get a positive cosine similarity.
pub struct SimpleEmbedder {
    dimension: usize,
}

impl SimpleEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn bucket(token: &str) -> u64 {
        // FNV-1a
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in token.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x100000001b3);
        }
        hash
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase);

        for token in tokens {
            let hash = Self::bucket(&token);
            let index = (hash % self.dimension as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for SimpleEmbedder {
    fn name(&self) -> &'static str {
        "simple"
    }

    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed(text))
    }

    async fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// OpenAI `/embeddings` 客户端
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Deserialize)]
struct OpenAiEmbedding {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub const DEFAULT_MODEL: &'static str = "text-embedding-3-small";
    pub const DEFAULT_DIMENSION: usize = 1536;

    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let settings = EmbedderSettings::from_provider(config)?;
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                AppError::Config("embedder provider `openai` requires an api_key".into())
            })?;

        Ok(Self {
            client: settings.client()?,
            api_key,
            model: settings
                .model
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_MODEL.to_string()),
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
            dimensions: settings.embedding_dims,
        })
    }

    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        if let Some(dimensions) = self.dimensions {
            body["dimensions"] = dimensions.into();
        }

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Embedding(format!("OpenAI request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Embedding(format!(
                "OpenAI embedding failed ({}): {}",
                status, error_text
            )));
        }

        let mut parsed: OpenAiEmbedResponse = response
            .json()
            .await
            .map_err(|e| AppError::Embedding(format!("invalid OpenAI response: {}", e)))?;
        parsed.data.sort_by_key(|d| d.index);

        if parsed.data.len() != texts.len() {
            return Err(AppError::Embedding(format!(
                "OpenAI returned {} embeddings for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Embedding("OpenAI returned no embedding".into()))
    }

    async fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.embed(texts).await
    }

    fn dimension(&self) -> usize {
        self.dimensions.unwrap_or(Self::DEFAULT_DIMENSION)
    }
}

/// Ollama Embedding 模型客户端
pub struct OllamaEmbedder {
    client: reqwest::Client,
    model_name: String,
    base_url: String,
    dimension: usize,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedder {
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let settings = EmbedderSettings::from_provider(config)?;
        Ok(Self {
            client: settings.client()?,
            model_name: settings
                .model
                .clone()
                .unwrap_or_else(|| "nomic-embed-text".to_string()),
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string())
                .trim_end_matches('/')
                .to_string(),
            dimension: settings.embedding_dims.unwrap_or(768),
        })
    }

    async fn embed(&self, texts: Vec<&str>) -> Result<Vec<Vec<f32>>> {
        let expected = texts.len();
        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&serde_json::json!({
                "model": self.model_name,
                "input": texts,
                "truncate": true
            }))
            .send()
            .await
            .map_err(|e| AppError::Embedding(format!("Ollama request failed: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Embedding(format!(
                "Ollama embedding failed: {}",
                error_text
            )));
        }

        let embed_response: OllamaEmbedResponse = response
            .json()
            .await
            .map_err(|e| AppError::Embedding(format!("invalid Ollama response: {}", e)))?;

        if embed_response.embeddings.len() != expected {
            return Err(AppError::Embedding(format!(
                "Ollama returned {} embeddings for {} inputs",
                embed_response.embeddings.len(),
                expected
            )));
        }
        Ok(embed_response.embeddings)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(vec![text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Embedding("Ollama returned no embedding".into()))
    }

    async fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        // Ollama 支持批量输入，但为了稳定性，分批处理
        let batch_size = 32;
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(batch_size) {
            let embeddings = self.embed(chunk.to_vec()).await?;
            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

pub fn create_embedder(config: &ProviderConfig) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiEmbedder::from_config(config)?)),
        "ollama" => Ok(Box::new(OllamaEmbedder::from_config(config)?)),
        "simple" => {
            let settings = EmbedderSettings::from_provider(config)?;
            Ok(Box::new(SimpleEmbedder::new(
                settings.embedding_dims.unwrap_or(256),
            )))
        }
        other => Err(AppError::Config(format!("unknown embedder provider: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_simple_embedder_shape() {
        let model: Box<dyn Embedder> = Box::new(SimpleEmbedder::new(128));

        let result = model.encode("hello world").await.unwrap();
        assert_eq!(result.len(), 128);
        assert_eq!(model.dimension(), 128);

        let norm: f32 = result.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_simple_embedder_relatedness() {
        let model = SimpleEmbedder::new(256);
        let name = model.encode("My name is John").await.unwrap();
        let question = model.encode("what is my name").await.unwrap();
        let pizza = model.encode("Loves pepperoni pizza").await.unwrap();

        assert!(cosine(&name, &question) > cosine(&pizza, &question));
    }

    #[tokio::test]
    async fn test_simple_embedder_empty_text() {
        let model = SimpleEmbedder::new(16);
        let v = model.encode("   ").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn test_openai_embedder_orders_by_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"index": 1, "embedding": [0.0, 1.0]},
                    {"index": 0, "embedding": [1.0, 0.0]}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = ProviderConfig::new("openai")
            .with("api_key", "sk-test")
            .with("base_url", server.uri())
            .with("embedding_dims", 2);
        let embedder = create_embedder(&config).unwrap();

        let vectors = embedder.encode_batch(&["a", "b"]).await.unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert_eq!(embedder.dimension(), 2);
    }

    #[tokio::test]
    async fn test_openai_embedder_surfaces_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .mount(&server)
            .await;

        let config = ProviderConfig::new("openai")
            .with("api_key", "sk-bad")
            .with("base_url", server.uri());
        let embedder = create_embedder(&config).unwrap();

        match embedder.encode("hi").await {
            Err(AppError::Embedding(msg)) => assert!(msg.contains("invalid key")),
            other => panic!("unexpected result: {:?}", other.map(|v| v.len())),
        }
    }

    #[tokio::test]
    async fn test_ollama_embedder() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embeddings": [[0.5, 0.5, 0.0]]
            })))
            .mount(&server)
            .await;

        let config = ProviderConfig::new("ollama")
            .with("base_url", server.uri())
            .with("embedding_dims", 3);
        let embedder = create_embedder(&config).unwrap();

        assert_eq!(embedder.encode("x").await.unwrap(), vec![0.5, 0.5, 0.0]);
        assert_eq!(embedder.name(), "ollama");
    }

    #[tokio::test]
    async fn test_ollama_embedder_rejects_short_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embeddings": [[1.0, 0.0]]
            })))
            .mount(&server)
            .await;

        let config = ProviderConfig::new("ollama")
            .with("base_url", server.uri())
            .with("embedding_dims", 2);
        let embedder = create_embedder(&config).unwrap();

        match embedder.encode_batch(&["Likes tea", "Lives in Oslo"]).await {
            Err(AppError::Embedding(msg)) => assert!(msg.contains("1 embeddings for 2 inputs")),
            other => panic!("unexpected result: {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn test_unknown_provider() {
        let result = create_embedder(&ProviderConfig::new("word2vec"));
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
