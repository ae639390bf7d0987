//! OpenAI chat-completions backend (`llm_provider = openai`).
//!
//! Calls `{base_url}/chat/completions` and reads the answer plus the
//! `usage` block.  The base URL defaults to api.openai.com but any
//! OpenAI-compatible server works.

use async_trait::async_trait;
use serde::Deserialize;

use crate::history::TokenUsage;
use crate::llm::client::{build_messages, ChatMessage, Completion, LlmClient};
use crate::provider::ProviderError;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

// ---------------------------------------------------------------------------
// OpenAiClient
// ---------------------------------------------------------------------------

pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiClient {
    /// A missing API key is an [`ProviderError::Auth`] at build time so the
    /// orchestrator can report it once instead of on every question.
    pub fn new(client: reqwest::Client, api_key: &str, model: &str) -> Result<Self, ProviderError> {
        if api_key.is_empty() {
            return Err(ProviderError::Auth(
                "openai_api_key is required for llm_provider = openai".into(),
            ));
        }
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(
        &self,
        prompt: &str,
        history: &[ChatMessage],
    ) -> Result<Completion, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": build_messages(prompt, history),
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &body));
        }

        let parsed: ChatResponse = response.json().await?;
        parse_completion(parsed, &self.model)
    }

    fn name(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn parse_completion(parsed: ChatResponse, requested_model: &str) -> Result<Completion, ProviderError> {
    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|t| t.trim().to_string())
        .unwrap_or_default();
    if text.is_empty() {
        return Err(ProviderError::InvalidInput("model returned an empty answer".into()));
    }

    let usage = parsed
        .usage
        .map(|u| TokenUsage {
            prompt: Some(u.prompt_tokens),
            completion: Some(u.completion_tokens),
            total: u.total_tokens,
        })
        .unwrap_or_default();

    Ok(Completion {
        text,
        usage,
        model: parsed.model.unwrap_or_else(|| requested_model.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<Completion, ProviderError> {
        parse_completion(serde_json::from_str(json).unwrap(), "gpt-4o-mini")
    }

    #[test]
    fn reads_text_and_usage() {
        let c = parse(
            r#"{"model":"gpt-4o-mini-2024-07-18",
                "choices":[{"message":{"role":"assistant","content":" Paris. "}}],
                "usage":{"prompt_tokens":12,"completion_tokens":3,"total_tokens":15}}"#,
        )
        .unwrap();
        assert_eq!(c.text, "Paris.");
        assert_eq!(c.usage.total, 15);
        assert_eq!(c.usage.prompt, Some(12));
        assert_eq!(c.model, "gpt-4o-mini-2024-07-18");
    }

    #[test]
    fn missing_usage_counts_zero_tokens() {
        let c = parse(r#"{"choices":[{"message":{"content":"ok"}}]}"#).unwrap();
        assert_eq!(c.usage, TokenUsage::default());
        assert_eq!(c.model, "gpt-4o-mini");
    }

    #[test]
    fn empty_answer_is_invalid_input() {
        let err = parse(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidInput(_)));
    }

    #[test]
    fn missing_key_is_auth() {
        assert!(matches!(
            OpenAiClient::new(reqwest::Client::new(), "", "gpt-4o-mini"),
            Err(ProviderError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_server_is_network() {
        let c = OpenAiClient::new(reqwest::Client::new(), "sk-test", "gpt-4o-mini")
            .unwrap()
            .with_base_url("http://127.0.0.1:9/v1");
        let err = c.complete("hi", &[]).await.unwrap_err();
        assert!(matches!(err, ProviderError::Network(_)), "got {err:?}");
    }
}
