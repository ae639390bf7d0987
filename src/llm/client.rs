//! Core [`LlmClient`] trait and shared chat types.
//!
//! Both backends speak a chat-messages protocol: a fixed system prompt,
//! the recent conversation (see [`ConversationContext`]), then the new user
//! turn.
//!
//! [`ConversationContext`]: crate::llm::ConversationContext

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::history::TokenUsage;
use crate::provider::ProviderError;

/// Instruction sent as the first message of every request.
pub const SYSTEM_PROMPT: &str =
    "You are a helpful voice assistant. Keep responses brief and conversational.";

// ---------------------------------------------------------------------------
// Chat types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A successful completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
    /// Model name as reported by the backend.
    pub model: String,
}

/// System prompt + history + the new prompt, in wire order.
pub fn build_messages(prompt: &str, history: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(SYSTEM_PROMPT));
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage::user(prompt));
    messages
}

// ---------------------------------------------------------------------------
// LlmClient trait
// ---------------------------------------------------------------------------

/// Language-model backend.
///
/// Implementors must be `Send + Sync` so a provider set can hold an
/// `Arc<dyn LlmClient>`.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Answer `prompt`, given earlier turns of the same conversation.
    ///
    /// An empty answer is reported as [`ProviderError::InvalidInput`].
    async fn complete(
        &self,
        prompt: &str,
        history: &[ChatMessage],
    ) -> Result<Completion, ProviderError>;

    fn name(&self) -> &'static str;

    /// Configured model identifier.
    fn model(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_system_history_user() {
        let history = vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")];
        let msgs = build_messages("how are you", &history);
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0].role, Role::System);
        assert_eq!(msgs[1].content, "hi");
        assert_eq!(msgs[3], ChatMessage::user("how are you"));
    }

    #[test]
    fn roles_serialise_lowercase() {
        let v = serde_json::to_value(ChatMessage::assistant("x")).unwrap();
        assert_eq!(v["role"], "assistant");
    }
}
