//! Language-model backends.
//!
//! This module provides:
//! * [`LlmClient`]: async trait implemented by both backends.
//! * [`OpenAiClient`]: cloud chat-completions backend.
//! * [`OllamaClient`]: local-daemon backend plus model management.
//! * [`ConversationContext`]: rolling window of recent exchanges.
//! * [`RECOMMENDED_OLLAMA_MODELS`] / [`OPENAI_MODELS`]: curated catalogs.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use voice_assistant::llm::{ConversationContext, LlmClient, OpenAiClient};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = OpenAiClient::new(reqwest::Client::new(), "sk-...", "gpt-4o-mini").unwrap();
//!     let mut ctx = ConversationContext::new();
//!
//!     let question = "how far is the moon";
//!     let answer = client.complete(question, &ctx.history()).await.unwrap();
//!     ctx.push_exchange(question, &answer.text);
//!     println!("{} ({} tokens)", answer.text, answer.usage.total);
//! }
//! ```

pub mod catalog;
pub mod client;
pub mod context;
pub mod ollama;
pub mod openai;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use catalog::{CatalogModel, OPENAI_MODELS, RECOMMENDED_OLLAMA_MODELS};
pub use client::{build_messages, ChatMessage, Completion, LlmClient, Role, SYSTEM_PROMPT};
pub use context::ConversationContext;
pub use ollama::{format_size, InstalledModel, OllamaClient, PullProgress};
pub use openai::OpenAiClient;
