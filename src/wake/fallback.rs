//! Transcription-based wake detection.
//!
//! ```text
//!   ┌──────────── loop until phrase or cancel ─────────────┐
//!   │ record wake window ─► MuteTracker ─► muted? ─ yes ──►│ (skip)
//!   │                                       │ no           │
//!   │                             Transcriber (timeout)    │
//!   │                                       │              │
//!   │                     contains_phrase? ─┴─ no ────────►│
//!   └───────────────────────────────────────┬──────────────┘
//!                                           ▼ yes
//!                           WakeEvent { trailing: extract_trailing() }
//! ```
//!
//! Transient transcription failures (network blips, a window the model
//! rejects) are logged and listening continues.  Credential and
//! availability failures end the listen so the orchestrator can react.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::audio::{is_digital_silence, record_blocking, AudioSource, MuteTracker};
use crate::provider::ProviderError;
use crate::stt::Transcriber;
use crate::wake::{contains_phrase, extract_trailing, WakeDetector, WakeError, WakeEvent};

pub struct TranscriptionWake {
    source: Arc<dyn AudioSource>,
    transcriber: Arc<dyn Transcriber>,
    mute: Mutex<MuteTracker>,
    device: String,
    window: Duration,
    timeout: Duration,
}

impl TranscriptionWake {
    pub fn new(
        source: Arc<dyn AudioSource>,
        transcriber: Arc<dyn Transcriber>,
        muted: Arc<AtomicBool>,
        device: &str,
        window: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            source,
            transcriber,
            mute: Mutex::new(MuteTracker::new(muted)),
            device: device.to_string(),
            window,
            timeout,
        }
    }

    /// Update the mute tracker; `true` when the window should be skipped.
    fn skip_window(&self, window: &crate::audio::PcmBuffer) -> bool {
        let muted = self
            .mute
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .observe(window);
        muted || is_digital_silence(window)
    }
}

#[async_trait]
impl WakeDetector for TranscriptionWake {
    async fn listen(&self, phrase: &str, cancel: &CancellationToken) -> Result<WakeEvent, WakeError> {
        log::debug!("wake: listening for `{phrase}` in {:.1}s windows", self.window.as_secs_f32());

        loop {
            let window = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(WakeError::Cancelled),
                w = record_blocking(Arc::clone(&self.source), &self.device, self.window) => w?,
            };

            if self.skip_window(&window) {
                continue;
            }

            let text = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(WakeError::Cancelled),
                r = tokio::time::timeout(self.timeout, self.transcriber.transcribe(&window)) => match r {
                    Ok(Ok(text)) => text,
                    Ok(Err(e @ (ProviderError::Network(_) | ProviderError::InvalidInput(_)))) => {
                        log::debug!("wake: window transcription failed ({}): {e}", e.kind());
                        continue;
                    }
                    Ok(Err(e)) => return Err(e.into()),
                    Err(_) => {
                        log::warn!("wake: transcription timed out after {:?}", self.timeout);
                        continue;
                    }
                },
            };

            if contains_phrase(&text, phrase) {
                log::info!("wake: heard `{phrase}` in \"{text}\"");
                return Ok(WakeEvent::now(extract_trailing(&text, phrase)));
            }
        }
    }

    fn name(&self) -> &'static str {
        "transcription"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
