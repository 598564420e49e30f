//! OpenAI-compatible chat-completions client.
//!
//! Used by the model-judged relevance grader and the model-based TOC tier.
//! Any endpoint that speaks `POST {url}/chat/completions` works; the key is
//! read from `OPENAI_API_KEY` when set.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::config::LlmConfig;
use crate::http;

/// Minimal chat interface so callers can be tested with a stub.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Single-turn completion: system prompt plus one user message.
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

pub struct ChatClient {
    model: String,
    endpoint: String,
    api_key: Option<String>,
    max_retries: u32,
    client: reqwest::Client,
}

impl ChatClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        if !config.is_enabled() {
            bail!("llm provider is disabled");
        }
        Ok(Self {
            model: config.model.clone(),
            endpoint: format!("{}/chat/completions", config.url.trim_end_matches('/')),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl ChatModel for ChatClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });
        let json = http::post_json_with_retry(
            &self.client,
            &self.endpoint,
            self.api_key.as_deref(),
            &body,
            self.max_retries,
            "LLM",
        )
        .await?;
        parse_chat_response(&json)
    }
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|c| c.trim().to_string())
        .ok_or_else(|| anyhow!("Invalid chat response: missing choices[0].message.content"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_response() {
        let json = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "  yes \n"}}]
        });
        assert_eq!(parse_chat_response(&json).unwrap(), "yes");
        assert!(parse_chat_response(&serde_json::json!({"choices": []})).is_err());
    }

    #[test]
    fn test_disabled_config_rejected() {
        assert!(ChatClient::new(&LlmConfig::default()).is_err());
    }
}
