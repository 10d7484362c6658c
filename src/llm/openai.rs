use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use super::{LanguageModel, LlmSettings, fact_extraction_prompt, parse_facts, render_conversation};
use crate::config::config::ProviderConfig;
use crate::engine::types::Message;
use crate::error::{AppError, Result};

/// OpenAI-compatible `/chat/completions` client.
pub struct OpenAiLanguageModel {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    top_p: Option<f64>,
}

impl OpenAiLanguageModel {
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let settings = LlmSettings::from_provider(config)?;
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| AppError::Config("llm provider `openai` requires an api_key".into()))?;

        Ok(Self {
            client: settings.client()?,
            api_key,
            model: settings
                .model
                .clone()
                .unwrap_or_else(|| "gpt-4.1-mini".to_string()),
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            top_p: settings.top_p,
        })
    }

    fn request_body(&self, messages: &[Message]) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": fact_extraction_prompt()},
                {"role": "user", "content": format!("Input:\n{}", render_conversation(messages))},
            ],
            "response_format": {"type": "json_object"},
        });
        if let Some(temperature) = self.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(top_p) = self.top_p {
            body["top_p"] = json!(top_p);
        }
        body
    }
}

fn extract_error(value: &Value) -> Option<String> {
    value
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl LanguageModel for OpenAiLanguageModel {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn extract_facts(&self, messages: &[Message]) -> Result<Vec<String>> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(messages))
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("OpenAI request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AppError::Llm(format!("failed to read OpenAI response: {}", e)))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|value| extract_error(&value))
                .unwrap_or_else(|| format!("{}: {}", status, text.trim()));
            return Err(AppError::Llm(detail));
        }

        let value: Value = serde_json::from_str(&text)
            .map_err(|e| AppError::Llm(format!("invalid OpenAI response: {}", e)))?;

        let content = value
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::Llm("OpenAI returned no completion content".into()))?;
        debug!("fact extraction response: {}", content);

        parse_facts(content)
    }
}
