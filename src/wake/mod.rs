//! Wake phrase detection.
//!
//! Two detectors implement [`WakeDetector`]:
//!
//! * [`KeywordSpotter`] runs an external keyword-spotting process that needs
//!   an activation credential (`picovoice_access_key`).
//! * [`TranscriptionWake`] transcribes short rolling windows and looks for
//!   the phrase in the text.
//!
//! [`build_detector`] picks the spotter whenever a credential is configured.
//! Every `listen` is cancellable through a [`CancellationToken`]; the
//! orchestrator cancels on reload and on shutdown.

pub mod fallback;
pub mod spotter;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::audio::{AudioSource, DeviceError};
use crate::config::Settings;
use crate::provider::ProviderError;
use crate::stt::Transcriber;

pub use fallback::TranscriptionWake;
pub use spotter::KeywordSpotter;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Emitted when the wake phrase was heard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeEvent {
    pub at: DateTime<Utc>,
    /// Command spoken in the same breath as the phrase ("jetson what time
    /// is it"), when the detector can see it.
    pub trailing: Option<String>,
}

impl WakeEvent {
    pub fn now(trailing: Option<String>) -> Self {
        Self {
            at: Utc::now(),
            trailing,
        }
    }
}

#[derive(Debug, Error)]
pub enum WakeError {
    #[error("listen cancelled")]
    Cancelled,

    #[error("audio device error: {0}")]
    Device(#[from] DeviceError),

    #[error("wake provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("keyword spotter: {0}")]
    Spawn(String),
}

impl WakeError {
    /// Errors that will not clear up by listening again; the orchestrator
    /// parks in IDLE until the configuration changes.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(
            self,
            WakeError::Provider(ProviderError::Auth(_) | ProviderError::Unavailable(_))
                | WakeError::Spawn(_)
        )
    }
}

// ---------------------------------------------------------------------------
// WakeDetector trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait WakeDetector: Send + Sync {
    /// Wait until `phrase` is heard or `cancel` fires.
    async fn listen(&self, phrase: &str, cancel: &CancellationToken) -> Result<WakeEvent, WakeError>;

    fn name(&self) -> &'static str;
}

const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn WakeDetector>) {}
};

/// Keyword spotter when a credential is present, transcription otherwise.
pub fn build_detector(
    settings: &Settings,
    source: Arc<dyn AudioSource>,
    transcriber: Arc<dyn Transcriber>,
    muted: Arc<AtomicBool>,
) -> Arc<dyn WakeDetector> {
    if settings.picovoice_access_key.is_empty() {
        Arc::new(TranscriptionWake::new(
            source,
            transcriber,
            muted,
            &settings.audio_input_device,
            settings.wake_window(),
            settings.provider_timeout(),
        ))
    } else {
        Arc::new(KeywordSpotter::new(
            &settings.keyword_spotter_command,
            &settings.picovoice_access_key,
            &settings.audio_input_device,
        ))
    }
}

// ---------------------------------------------------------------------------
// Phrase matching
// ---------------------------------------------------------------------------

/// Case-insensitive substring match.
pub fn contains_phrase(transcript: &str, phrase: &str) -> bool {
    let phrase = phrase.trim().to_lowercase();
    !phrase.is_empty() && transcript.to_lowercase().contains(&phrase)
}

/// Text following the first occurrence of `phrase`, with leading
/// punctuation stripped.  Anything of two characters or fewer is noise
/// ("jetson." → `None`).
pub fn extract_trailing(transcript: &str, phrase: &str) -> Option<String> {
    let lower = transcript.to_lowercase();
    let phrase = phrase.trim().to_lowercase();
    if phrase.is_empty() {
        return None;
    }
    let idx = lower.find(&phrase)?;
    let trailing = lower[idx + phrase.len()..]
        .trim_start_matches(['.', ',', '!', '?', ' '])
        .trim_end();
    (trailing.chars().count() > 2).then(|| trailing.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phrase_match_ignores_case() {
        assert!(contains_phrase("Hey JETSON, are you there", "jetson"));
        assert!(!contains_phrase("jet son", "jetson"));
        assert!(!contains_phrase("anything", "  "));
    }

    #[test]
    fn trailing_command_is_extracted() {
        assert_eq!(
            extract_trailing("Jetson, what time is it?", "jetson").as_deref(),
            Some("what time is it?")
        );
    }

    #[test]
    fn short_trailing_is_ignored() {
        assert_eq!(extract_trailing("Jetson.", "jetson"), None);
        assert_eq!(extract_trailing("jetson ok", "jetson"), None);
        assert_eq!(extract_trailing("jetson yes", "jetson").as_deref(), Some("yes"));
    }

    #[test]
    fn no_phrase_no_trailing() {
        assert_eq!(extract_trailing("what time is it", "jetson"), None);
    }

    #[test]
    fn unrecoverable_classification() {
        assert!(WakeError::Provider(ProviderError::Auth("x".into())).is_unrecoverable());
        assert!(WakeError::Spawn("exited".into()).is_unrecoverable());
        assert!(!WakeError::Provider(ProviderError::Network("x".into())).is_unrecoverable());
        assert!(!WakeError::Device(DeviceError::Timeout).is_unrecoverable());
        assert!(!WakeError::Cancelled.is_unrecoverable());
    }
}
