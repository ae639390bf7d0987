//! Speech-to-text providers.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────────────────┐
//!                 │   Transcriber (trait)    │
//!                 └─────┬──────────────┬─────┘
//!      whisper_mode=local│              │whisper_mode=api
//!                 ┌─────▼──────┐  ┌────▼───────┐
//!                 │LocalWhisper│  │ ApiWhisper │── multipart WAV ──► /audio/transcriptions
//!                 └─────┬──────┘  └────────────┘
//!                       │ spawn_blocking
//!                 ┌─────▼───────┐   ┌────────────┐
//!                 │WhisperEngine│◄──│ ModelPaths │ (whisper_model_size)
//!                 └─────────────┘   └────────────┘
//! ```

pub mod api;
pub mod engine;
pub mod model;
pub mod transcribe;

pub use api::ApiWhisper;
pub use engine::{LocalWhisper, SttError, Transcriber, WhisperEngine};
pub use model::{find_model, ModelInfo, ModelPaths, WHISPER_MODELS};
pub use transcribe::{SamplingStrategy, Segment, TranscribeParams, TranscriptionResult};
