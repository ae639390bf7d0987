//! Conversation pipeline for the voice assistant.
//!
//! This module wires wake detection, recording, transcription, routing, the
//! language model and speech into one cycle and exposes the shared status
//! the monitoring surface reads.
//!
//! # Architecture
//!
//! ```text
//! ConfigStore (ArcSwap snapshot + generation watch)
//!        │ snapshot at the top of each cycle
//!        ▼
//! Orchestrator::run()  ← async tokio task
//!        │
//!        ├─ ProviderFactory::build  (spawn_blocking, on snapshot change)
//!        ├─ WakeDetector::listen ───────────────────────────▶ Listening
//!        ├─ record_blocking + Transcriber ──────────────────▶ Recording / Transcribing
//!        ├─ CommandRouter ─▶ built-in reply | LlmClient ────▶ Routing / Executing / QueryingLlm
//!        ├─ Speaker chain ──────────────────────────────────▶ Speaking
//!        └─ HistoryStore::append (one entry per spoken reply)
//!
//! SharedStatus (Arc<Mutex<AssistantStatus>>) ←─── read by the monitor
//! ```

pub mod providers;
pub mod runner;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use providers::{DefaultProviders, ProviderFactory, ProviderSet};
pub use runner::{ExitReason, Orchestrator, UrlOpener, APOLOGY, GREETING, SHUTDOWN_GRACE, WAKE_ACK};
pub use state::{new_shared_status, AssistantState, AssistantStatus, SharedStatus};
