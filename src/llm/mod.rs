//! 语言模型 provider
//!
//! The engine only asks a language model for one thing: the list of standalone facts
//! contained in a conversation.

pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;

use crate::config::config::ProviderConfig;
use crate::engine::types::{Message, Role};
use crate::error::{AppError, Result};

pub use ollama::OllamaLanguageModel;
pub use openai::OpenAiLanguageModel;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &'static str;
    async fn extract_facts(&self, messages: &[Message]) -> Result<Vec<String>>;
}

/// Settings shared by the HTTP-backed providers, read from `llm.config`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct LlmSettings {
    pub model: Option<String>,
    pub api_key: Option<String>,
    #[serde(alias = "openai_base_url", alias = "ollama_base_url")]
    pub base_url: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
    pub timeout_secs: Option<u64>,
}

impl LlmSettings {
    pub(crate) fn from_provider(config: &ProviderConfig) -> Result<Self> {
        serde_json::from_value(serde_json::Value::Object(config.config.clone()))
            .map_err(|e| AppError::Config(format!("llm config: {}", e)))
    }

    pub(crate) fn client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs.unwrap_or(60)))
            .build()
            .map_err(|e| AppError::Config(format!("llm http client: {}", e)))
    }
}

pub(crate) fn fact_extraction_prompt() -> String {
    format!(
        "You are a personal information organizer. Extract the distinct facts, preferences, \
plans and personal details stated in the conversation. Each fact must be a short, \
self-contained sentence written in the same language as the input. Ignore greetings, \
small talk and anything said only by the assistant unless the user confirms it.\n\n\
Return a JSON object of the form {{\"facts\": [\"...\", \"...\"]}}. \
Return {{\"facts\": []}} when nothing is worth remembering.\n\n\
Today's date is {}.",
        Utc::now().format("%Y-%m-%d")
    )
}

/// Renders messages as `role: content` lines for the user turn of the prompt.
pub(crate) fn render_conversation(messages: &[Message]) -> String {
    messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => "system",
            };
            format!("{}: {}", role, m.content.trim())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Deserialize)]
struct FactsEnvelope {
    #[serde(default)]
    facts: Vec<String>,
}

/// Parses `{"facts": [...]}`, tolerating a fenced code block around it.
pub(crate) fn parse_facts(content: &str) -> Result<Vec<String>> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let envelope: FactsEnvelope = serde_json::from_str(body)
        .map_err(|e| AppError::Llm(format!("model did not return facts JSON: {}", e)))?;

    Ok(envelope
        .facts
        .into_iter()
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect())
}

/// Offline provider: every user message becomes one fact, verbatim.
pub struct PassthroughLanguageModel;

#[async_trait]
impl LanguageModel for PassthroughLanguageModel {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    async fn extract_facts(&self, messages: &[Message]) -> Result<Vec<String>> {
        Ok(messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect())
    }
}

pub fn create_language_model(config: &ProviderConfig) -> Result<Box<dyn LanguageModel>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiLanguageModel::from_config(config)?)),
        "ollama" => Ok(Box::new(OllamaLanguageModel::from_config(config)?)),
        "passthrough" => Ok(Box::new(PassthroughLanguageModel)),
        other => Err(AppError::Config(format!("unknown llm provider: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(r#"{"facts": ["Name is John", "Likes tea"]}"#, 2)]
    #[case("```json\n{\"facts\": [\"Name is John\"]}\n```", 1)]
    #[case(r#"{"facts": []}"#, 0)]
    #[case(r#"{"facts": ["  ", "x"]}"#, 1)]
    #[case(r#"{}"#, 0)]
    fn test_parse_facts(#[case] content: &str, #[case] expected: usize) {
        assert_eq!(parse_facts(content).unwrap().len(), expected);
    }

    #[test]
    fn test_parse_facts_rejects_prose() {
        assert!(matches!(
            parse_facts("Sure! Here are the facts."),
            Err(AppError::Llm(_))
        ));
    }

    #[test]
    fn test_render_conversation_skips_system() {
        let messages = vec![
            Message {
                role: Role::System,
                content: "be nice".into(),
            },
            Message::user("My name is John"),
            Message::assistant("Got it"),
        ];
        assert_eq!(
            render_conversation(&messages),
            "user: My name is John\nassistant: Got it"
        );
    }

    #[tokio::test]
    async fn test_passthrough_keeps_user_messages() {
        let llm = create_language_model(&ProviderConfig::new("passthrough")).unwrap();
        let facts = llm
            .extract_facts(&[Message::user("My name is John"), Message::assistant("Got it")])
            .await
            .unwrap();
        assert_eq!(facts, vec!["My name is John".to_string()]);
    }

    #[test]
    fn test_unknown_provider() {
        assert!(matches!(
            create_language_model(&ProviderConfig::new("gpt4all")),
            Err(AppError::Config(_))
        ));
    }
}
