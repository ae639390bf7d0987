//! Transcriber trait and the on-device Whisper implementation.
//!
//! # Overview
//!
//! [`Transcriber`] is what the orchestrator and the wake fallback call.  It
//! is async and object-safe so a provider set can hold an
//! `Arc<dyn Transcriber>` chosen by `whisper_mode`.
//!
//! [`WhisperEngine`] wraps a `whisper_rs::WhisperContext` and runs
//! synchronously; [`LocalWhisper`] adapts it to [`Transcriber`] by moving
//! each inference onto the blocking pool.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use whisper_rs::{FullParams, WhisperContext, WhisperContextParameters};

use crate::audio::{PcmBuffer, TARGET_SAMPLE_RATE};
use crate::provider::ProviderError;
use crate::stt::transcribe::{SamplingStrategy, Segment, TranscribeParams, TranscriptionResult};

// ---------------------------------------------------------------------------
// SttError
// ---------------------------------------------------------------------------

/// Errors raised by the local Whisper engine.
#[derive(Debug, Clone, Error)]
pub enum SttError {
    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("whisper context initialisation failed: {0}")]
    ContextInit(String),

    #[error("transcription error: {0}")]
    Transcription(String),

    /// Shorter than [`MIN_AUDIO_SAMPLES`].
    #[error("audio too short: minimum 0.5 s (8 000 samples at 16 kHz)")]
    AudioTooShort,

    /// Longer than [`MAX_AUDIO_SAMPLES`].
    #[error("audio too long: maximum 60 s (960 000 samples at 16 kHz)")]
    AudioTooLong,
}

impl From<SttError> for ProviderError {
    fn from(e: SttError) -> Self {
        match e {
            SttError::ModelNotFound(_) | SttError::ContextInit(_) => {
                ProviderError::Unavailable(e.to_string())
            }
            SttError::AudioTooShort | SttError::AudioTooLong | SttError::Transcription(_) => {
                ProviderError::InvalidInput(e.to_string())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Transcriber trait
// ---------------------------------------------------------------------------

/// Speech-to-text provider.
///
/// `audio` is mono PCM; implementations resample if they need a specific
/// rate.  The returned text is trimmed and may be empty.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &PcmBuffer) -> Result<String, ProviderError>;

    /// Short label for log lines.
    fn name(&self) -> &'static str;
}

const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn Transcriber>) {}
};

// ---------------------------------------------------------------------------
// Audio length constants (16 kHz mono f32)
// ---------------------------------------------------------------------------

/// 0.5 s at 16 kHz.
pub const MIN_AUDIO_SAMPLES: usize = 8_000;
/// 60 s at 16 kHz.
pub const MAX_AUDIO_SAMPLES: usize = 960_000;

// ---------------------------------------------------------------------------
// WhisperEngine
// ---------------------------------------------------------------------------

/// whisper.cpp model loaded into memory.
///
/// A fresh `WhisperState` is created per call, so one engine can serve
/// concurrent callers without locking.
pub struct WhisperEngine {
    ctx: WhisperContext,
    params: TranscribeParams,
}

impl std::fmt::Debug for WhisperEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperEngine")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

// SAFETY: WhisperContext is Send+Sync as declared by whisper-rs; the model
// weights are read-only after loading.
unsafe impl Send for WhisperEngine {}
unsafe impl Sync for WhisperEngine {}

impl WhisperEngine {
    /// Load a GGML model file.
    pub fn load(model_path: impl AsRef<Path>, params: TranscribeParams) -> Result<Self, SttError> {
        let path = model_path.as_ref();

        if !path.exists() {
            return Err(SttError::ModelNotFound(path.display().to_string()));
        }

        let path_str = path.to_str().ok_or_else(|| {
            SttError::ModelNotFound(format!(
                "model path contains non-UTF-8 characters: {}",
                path.display()
            ))
        })?;

        let ctx = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
            .map_err(|e| SttError::ContextInit(e.to_string()))?;

        log::info!("stt: loaded whisper model {}", path.display());
        Ok(Self { ctx, params })
    }

    pub fn params(&self) -> &TranscribeParams {
        &self.params
    }

    /// Run inference on 16 kHz mono samples and return per-segment detail.
    pub fn transcribe_full(&self, audio: &[f32]) -> Result<TranscriptionResult, SttError> {
        if audio.len() < MIN_AUDIO_SAMPLES {
            return Err(SttError::AudioTooShort);
        }
        if audio.len() > MAX_AUDIO_SAMPLES {
            return Err(SttError::AudioTooLong);
        }

        use whisper_rs::SamplingStrategy as WS;
        let ws = match self.params.strategy {
            SamplingStrategy::Greedy { best_of } => WS::Greedy { best_of },
            SamplingStrategy::BeamSearch {
                beam_size,
                patience,
            } => WS::BeamSearch {
                beam_size,
                patience,
            },
        };

        let mut fp = FullParams::new(ws);
        let lang = (self.params.language != "auto").then_some(self.params.language.as_str());
        fp.set_language(lang);
        fp.set_n_threads(self.params.n_threads);
        fp.set_single_segment(true);
        if self.params.suppress_progress {
            fp.set_print_progress(false);
            fp.set_print_realtime(false);
        }

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| SttError::ContextInit(e.to_string()))?;

        let wall_start = std::time::Instant::now();
        state
            .full(fp, audio)
            .map_err(|e| SttError::Transcription(e.to_string()))?;

        let n_segments = state
            .full_n_segments()
            .map_err(|e| SttError::Transcription(e.to_string()))?;

        let mut text = String::new();
        let mut segments = Vec::with_capacity(n_segments.max(0) as usize);
        for i in 0..n_segments {
            let seg_text = state
                .full_get_segment_text(i)
                .map_err(|e| SttError::Transcription(format!("segment {i}: {e}")))?;
            // Centiseconds.
            let t0 = state.full_get_segment_t0(i).unwrap_or(0).max(0) as u64 * 10;
            let t1 = state.full_get_segment_t1(i).unwrap_or(0).max(0) as u64 * 10;

            text.push_str(&seg_text);
            segments.push(Segment {
                text: seg_text,
                start_ms: t0,
                end_ms: t1,
            });
        }

        Ok(TranscriptionResult {
            text: text.trim().to_string(),
            segments,
            duration_ms: wall_start.elapsed().as_millis(),
        })
    }
}

// ---------------------------------------------------------------------------
// LocalWhisper
// ---------------------------------------------------------------------------

/// [`Transcriber`] over a shared [`WhisperEngine`].
#[derive(Debug, Clone)]
pub struct LocalWhisper {
    engine: Arc<WhisperEngine>,
}

impl LocalWhisper {
    pub fn new(engine: Arc<WhisperEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Transcriber for LocalWhisper {
    async fn transcribe(&self, audio: &PcmBuffer) -> Result<String, ProviderError> {
        let samples = if audio.sample_rate == TARGET_SAMPLE_RATE {
            audio.samples.clone()
        } else {
            audio.resampled(TARGET_SAMPLE_RATE).samples
        };

        let engine = Arc::clone(&self.engine);
        let result = tokio::task::spawn_blocking(move || engine.transcribe_full(&samples))
            .await
            .map_err(|e| ProviderError::Unavailable(format!("whisper task failed: {e}")))??;

        log::debug!(
            "stt: local whisper {} ms → {:?}",
            result.duration_ms,
            result.text
        );
        Ok(result.text)
    }

    fn name(&self) -> &'static str {
        "whisper-local"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
