//! Ollama backend (`llm_provider = ollama`) and model management.
//!
//! Besides [`LlmClient::complete`] (`POST /api/chat`), the client exposes
//! what the monitoring surface needs to manage the local daemon: an
//! availability probe, the installed model list, streamed pulls, deletes and
//! model details.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::history::TokenUsage;
use crate::llm::client::{build_messages, ChatMessage, Completion, LlmClient};
use crate::provider::ProviderError;

/// Timeout for the availability probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    #[serde(default)]
    name: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    modified_at: String,
    #[serde(default)]
    details: TagDetails,
}

#[derive(Deserialize, Default)]
struct TagDetails {
    #[serde(default)]
    family: String,
    #[serde(default)]
    parameter_size: String,
}

/// An installed model as shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledModel {
    pub name: String,
    pub size: u64,
    pub size_human: String,
    pub modified_at: String,
    pub family: String,
    pub parameter_size: String,
}

impl From<TagEntry> for InstalledModel {
    fn from(t: TagEntry) -> Self {
        Self {
            size_human: format_size(t.size),
            name: t.name,
            size: t.size,
            modified_at: t.modified_at,
            family: t.details.family,
            parameter_size: t.details.parameter_size,
        }
    }
}

/// One line of `POST /api/pull` progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullProgress {
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PullProgress {
    /// Download progress for the current layer, when the daemon reports it.
    pub fn percent(&self) -> Option<f32> {
        match (self.completed, self.total) {
            (Some(done), Some(total)) if total > 0 => Some(done as f32 / total as f32 * 100.0),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// OllamaClient
// ---------------------------------------------------------------------------

pub struct OllamaClient {
    client: reqwest::Client,
    host: String,
    model: String,
    timeout: Duration,
}

impl OllamaClient {
    /// `timeout` bounds every call except pulls, which can take minutes.
    pub fn new(client: reqwest::Client, host: &str, model: &str, timeout: Duration) -> Self {
        Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            model: model.to_string(),
            timeout,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// `true` when the daemon answers `/api/tags`.
    pub async fn is_available(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.host))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .is_ok_and(|r| r.status().is_success())
    }

    pub async fn list_models(&self) -> Result<Vec<InstalledModel>, ProviderError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.host))
            .timeout(self.timeout)
            .send()
            .await?;
        let response = check_status(response).await?;
        let tags: TagsResponse = response.json().await?;
        Ok(tags.models.into_iter().map(InstalledModel::from).collect())
    }

    /// Pull `name`, reporting each progress line to `on_progress`.
    ///
    /// A progress line carrying an `error` field ends the pull with
    /// [`ProviderError::InvalidInput`].
    pub async fn pull<F>(&self, name: &str, mut on_progress: F) -> Result<(), ProviderError>
    where
        F: FnMut(&PullProgress) + Send,
    {
        let mut response = self
            .client
            .post(format!("{}/api/pull", self.host))
            .json(&serde_json::json!({ "name": name, "stream": true }))
            .send()
            .await?;
        response = check_status(response).await?;

        let mut lines = LineBuffer::default();
        while let Some(chunk) = response.chunk().await? {
            for line in lines.push(&chunk) {
                handle_pull_line(&line, &mut on_progress)?;
            }
        }
        if let Some(line) = lines.finish() {
            handle_pull_line(&line, &mut on_progress)?;
        }

        log::info!("ollama: pulled {name}");
        Ok(())
    }

    pub async fn delete_model(&self, name: &str) -> Result<(), ProviderError> {
        let response = self
            .client
            .delete(format!("{}/api/delete", self.host))
            .json(&serde_json::json!({ "name": name }))
            .timeout(self.timeout)
            .send()
            .await?;
        check_status(response).await?;
        log::info!("ollama: deleted {name}");
        Ok(())
    }

    /// Raw `/api/show` document for `name`.
    pub async fn model_info(&self, name: &str) -> Result<serde_json::Value, ProviderError> {
        let response = self
            .client
            .post(format!("{}/api/show", self.host))
            .json(&serde_json::json!({ "name": name }))
            .timeout(self.timeout)
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(
        &self,
        prompt: &str,
        history: &[ChatMessage],
    ) -> Result<Completion, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": build_messages(prompt, history),
            "stream": false,
        });

        let response = self
            .client
            .post(format!("{}/api/chat", self.host))
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await?;
        let response = check_status(response).await?;
        let parsed: ChatResponse = response.json().await?;
        parse_completion(parsed, &self.model)
    }

    fn name(&self) -> &'static str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::from_status(status, &body))
}

fn parse_completion(parsed: ChatResponse, requested_model: &str) -> Result<Completion, ProviderError> {
    let text = parsed
        .message
        .map(|m| m.content.trim().to_string())
        .unwrap_or_default();
    if text.is_empty() {
        return Err(ProviderError::InvalidInput("model returned an empty answer".into()));
    }

    let prompt = parsed.prompt_eval_count.unwrap_or(0);
    let completion = parsed.eval_count.unwrap_or(0);
    Ok(Completion {
        text,
        usage: TokenUsage {
            prompt: Some(prompt),
            completion: Some(completion),
            total: prompt + completion,
        },
        model: parsed.model.unwrap_or_else(|| requested_model.to_string()),
    })
}

fn handle_pull_line<F: FnMut(&PullProgress)>(line: &str, on_progress: &mut F) -> Result<(), ProviderError> {
    let Ok(progress) = serde_json::from_str::<PullProgress>(line) else {
        log::debug!("ollama: skipping unparseable pull line");
        return Ok(());
    };
    on_progress(&progress);
    match progress.error {
        Some(error) => Err(ProviderError::InvalidInput(error)),
        None => Ok(()),
    }
}

/// Splits a byte stream into newline-terminated lines.
#[derive(Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line).trim().to_string();
            if !text.is_empty() {
                lines.push(text);
            }
        }
        lines
    }

    fn finish(self) -> Option<String> {
        let text = String::from_utf8_lossy(&self.pending).trim().to_string();
        (!text.is_empty()).then_some(text)
    }
}

/// `1536` → `"1.5KB"`, matching how the daemon's sizes are usually shown.
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0B".into();
    }
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{size:.1}{unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1}TB")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
