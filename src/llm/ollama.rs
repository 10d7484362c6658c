use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{LanguageModel, LlmSettings, fact_extraction_prompt, parse_facts, render_conversation};
use crate::config::config::ProviderConfig;
use crate::engine::types::Message;
use crate::error::{AppError, Result};

/// Ollama `/api/chat` client running in JSON mode.
pub struct OllamaLanguageModel {
    client: reqwest::Client,
    model: String,
    base_url: String,
    temperature: Option<f64>,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: String,
}

impl OllamaLanguageModel {
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let settings = LlmSettings::from_provider(config)?;
        Ok(Self {
            client: settings.client()?,
            model: settings.model.clone().unwrap_or_else(|| "llama3.1".to_string()),
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string())
                .trim_end_matches('/')
                .to_string(),
            temperature: settings.temperature,
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaLanguageModel {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn extract_facts(&self, messages: &[Message]) -> Result<Vec<String>> {
        let mut body = json!({
            "model": self.model,
            "stream": false,
            "format": "json",
            "messages": [
                {"role": "system", "content": fact_extraction_prompt()},
                {"role": "user", "content": format!("Input:\n{}", render_conversation(messages))},
            ],
        });
        if let Some(temperature) = self.temperature {
            body["options"] = json!({"temperature": temperature});
        }

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Ollama request failed: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Llm(format!("Ollama chat failed: {}", error_text)));
        }

        let chat: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("invalid Ollama response: {}", e)))?;

        parse_facts(&chat.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_extract_facts_via_chat() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"model": "llama3.1", "format": "json"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": {"role": "assistant", "content": "{\"facts\": [\"Lives in Oslo\"]}"},
                "done": true
            })))
            .mount(&server)
            .await;

        let config = ProviderConfig::new("ollama").with("base_url", server.uri());
        let llm = OllamaLanguageModel::from_config(&config).unwrap();
        let facts = llm
            .extract_facts(&[Message::user("I live in Oslo")])
            .await
            .unwrap();
        assert_eq!(facts, vec!["Lives in Oslo".to_string()]);
    }

    #[tokio::test]
    async fn test_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
            .mount(&server)
            .await;

        let config = ProviderConfig::new("ollama").with("base_url", server.uri());
        let llm = OllamaLanguageModel::from_config(&config).unwrap();
        let err = llm.extract_facts(&[Message::user("x")]).await.unwrap_err();
        assert!(err.to_string().contains("model not found"));
    }
}
