//! Text-to-speech output.
//!
//! ```text
//!                    ┌──────────────────────┐
//!   Orchestrator ───►│ FallbackSpeaker      │  tries each in tts_chain() order
//!                    └──┬────────┬────────┬─┘
//!                       │        │        │
//!              ┌────────▼──┐ ┌───▼─────┐ ┌▼─────────┐
//!              │NetworkTts │ │ Espeak  │ │ SpdSay   │
//!              │ MP3 → cpal│ │WAV→cpal │ │ spd-say  │
//!              └───────────┘ └─────────┘ └──────────┘
//! ```
//!
//! Every backend reports failures as a [`ProviderError`]; playback problems
//! on the output device become [`ProviderError::Unavailable`] so the chain
//! moves on to the next synthesiser.

pub mod espeak;
pub mod fallback;
pub mod network;
pub mod spd;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::audio::{DeviceError, PcmBuffer};
use crate::config::{Settings, TtsProvider};
use crate::provider::ProviderError;

pub use espeak::EspeakSpeaker;
pub use fallback::FallbackSpeaker;
pub use network::NetworkSpeaker;
pub use spd::SpdSpeaker;

// ---------------------------------------------------------------------------
// Speaker trait
// ---------------------------------------------------------------------------

/// Speaks text aloud and returns once playback has finished.
#[async_trait]
pub trait Speaker: Send + Sync {
    async fn speak(&self, text: &str) -> Result<(), ProviderError>;

    fn name(&self) -> &'static str;
}

// Compile-time guard: the orchestrator stores `Arc<dyn Speaker>`.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn Speaker>) {}
};

/// Build one speaker per entry of [`Settings::tts_chain`], wrapped in a
/// [`FallbackSpeaker`].  Each attempt is bounded by the provider timeout.
pub fn build_chain(settings: &Settings, client: &reqwest::Client) -> FallbackSpeaker {
    let speakers = settings
        .tts_chain()
        .into_iter()
        .map(|provider| build_speaker(provider, settings, client))
        .collect();
    FallbackSpeaker::new(speakers).with_attempt_timeout(settings.provider_timeout())
}

/// Rough playback length of `text`, about fifteen characters a second.
pub fn speech_time(text: &str) -> Duration {
    Duration::from_millis(text.chars().count() as u64 * 1000 / 15)
}

/// Time for the whole chain to speak `text` when every speaker but the last
/// uses up its attempt.
pub fn chain_budget(settings: &Settings, text: &str) -> Duration {
    let attempts = settings.tts_chain().len().max(1) as u32;
    (settings.provider_timeout() + speech_time(text)) * attempts
}

pub fn build_speaker(
    provider: TtsProvider,
    settings: &Settings,
    client: &reqwest::Client,
) -> Arc<dyn Speaker> {
    match provider {
        TtsProvider::Gtts => Arc::new(NetworkSpeaker::new(
            client.clone(),
            &settings.tts_language,
            &settings.audio_output_device,
            settings.provider_timeout(),
        )),
        TtsProvider::Espeak => Arc::new(EspeakSpeaker::new(
            &settings.tts_language,
            settings.tts_speed,
            &settings.audio_output_device,
        )),
        TtsProvider::Spd => Arc::new(SpdSpeaker::new(&settings.tts_language, settings.tts_speed)),
    }
}

/// Play decoded speech on `device` without blocking the runtime.
pub(crate) async fn play_blocking(pcm: PcmBuffer, device: String) -> Result<(), ProviderError> {
    tokio::task::spawn_blocking(move || crate::audio::play(&pcm, &device))
        .await
        .map_err(|e| ProviderError::Unavailable(format!("playback task failed: {e}")))?
        .map_err(device_failure)
}

pub(crate) fn device_failure(e: DeviceError) -> ProviderError {
    ProviderError::Unavailable(format!("output device: {e}"))
}

/// Map a failure to start a synthesiser process.  A missing binary means the
/// backend is not installed.
pub(crate) fn spawn_failure(program: &str, e: std::io::Error) -> ProviderError {
    if e.kind() == std::io::ErrorKind::NotFound {
        ProviderError::Unavailable(format!("{program} is not installed"))
    } else {
        ProviderError::Unavailable(format!("{program}: {e}"))
    }
}
