//! Voice assistant orchestration engine.
//!
//! Listens for a wake phrase, records and transcribes the command, answers
//! it with a built-in handler or a language model, speaks the reply and
//! records every exchange for the monitoring surface.

pub mod audio;
pub mod config;
pub mod history;
pub mod llm;
pub mod monitor;
pub mod pipeline;
pub mod provider;
pub mod router;
pub mod stt;
pub mod tts;
pub mod wake;
