//! Provider construction from a settings snapshot.
//!
//! The orchestrator never builds providers itself: it asks a
//! [`ProviderFactory`] for a [`ProviderSet`] whenever the snapshot it is
//! working from changes.  [`DefaultProviders`] is the real factory; tests
//! plug in fakes.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::audio::AudioSource;
use crate::config::{LlmProvider, Settings, WhisperMode};
use crate::llm::{ChatMessage, Completion, LlmClient, OllamaClient, OpenAiClient};
use crate::provider::ProviderError;
use crate::stt::{
    find_model, ApiWhisper, LocalWhisper, ModelPaths, TranscribeParams, Transcriber, WhisperEngine,
};
use crate::tts::{build_chain, Speaker};
use crate::wake::{build_detector, WakeDetector};

// ---------------------------------------------------------------------------
// ProviderSet
// ---------------------------------------------------------------------------

/// Everything one conversation cycle talks to, built from one snapshot.
#[derive(Clone)]
pub struct ProviderSet {
    pub wake: Arc<dyn WakeDetector>,
    pub source: Arc<dyn AudioSource>,
    pub transcriber: Arc<dyn Transcriber>,
    pub llm: Arc<dyn LlmClient>,
    pub speaker: Arc<dyn Speaker>,
}

/// Builds a [`ProviderSet`] for a snapshot.
///
/// `build` may block (loading a Whisper model); the orchestrator calls it
/// on the blocking pool.  An error parks the assistant in IDLE until the
/// configuration changes.
pub trait ProviderFactory: Send + Sync {
    fn build(&self, settings: &Settings) -> Result<ProviderSet, ProviderError>;
}

// ---------------------------------------------------------------------------
// DefaultProviders
// ---------------------------------------------------------------------------

pub struct DefaultProviders {
    client: reqwest::Client,
    source: Arc<dyn AudioSource>,
    model_paths: ModelPaths,
    muted: Arc<AtomicBool>,
    /// Last loaded Whisper model, keyed by (size, language).
    whisper: Mutex<Option<((String, String), Arc<WhisperEngine>)>>,
}

impl DefaultProviders {
    pub fn new(
        client: reqwest::Client,
        source: Arc<dyn AudioSource>,
        model_paths: ModelPaths,
        muted: Arc<AtomicBool>,
    ) -> Self {
        Self {
            client,
            source,
            model_paths,
            muted,
            whisper: Mutex::new(None),
        }
    }

    fn transcriber(&self, settings: &Settings) -> Result<Arc<dyn Transcriber>, ProviderError> {
        match settings.whisper_mode {
            WhisperMode::Api => Ok(Arc::new(ApiWhisper::new(
                self.client.clone(),
                &settings.openai_api_key,
                &settings.whisper_language,
            )?)),
            WhisperMode::Local => Ok(Arc::new(LocalWhisper::new(self.whisper_engine(settings)?))),
        }
    }

    fn whisper_engine(&self, settings: &Settings) -> Result<Arc<WhisperEngine>, ProviderError> {
        let key = (
            settings.whisper_model_size.clone(),
            settings.whisper_language.clone(),
        );
        if let Some((cached, engine)) = self.whisper.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            if *cached == key {
                return Ok(Arc::clone(engine));
            }
        }

        let info = find_model(&settings.whisper_model_size).ok_or_else(|| {
            ProviderError::InvalidInput(format!(
                "unknown whisper model size `{}`",
                settings.whisper_model_size
            ))
        })?;
        let path = self.model_paths.model_path(info);
        log::info!("pipeline: loading whisper model {}", path.display());
        let engine = Arc::new(WhisperEngine::load(
            &path,
            TranscribeParams::for_language(&settings.whisper_language),
        )?);
        *self.whisper.lock().unwrap_or_else(|e| e.into_inner()) = Some((key, Arc::clone(&engine)));
        Ok(engine)
    }

    fn llm(&self, settings: &Settings) -> Arc<dyn LlmClient> {
        let built: Result<Arc<dyn LlmClient>, ProviderError> = match settings.llm_provider {
            LlmProvider::OpenAi => OpenAiClient::new(
                self.client.clone(),
                &settings.openai_api_key,
                &settings.llm_model,
            )
            .map(|c| Arc::new(c) as Arc<dyn LlmClient>),
            LlmProvider::Ollama => Ok(Arc::new(OllamaClient::new(
                self.client.clone(),
                &settings.ollama_host,
                &settings.llm_model,
                settings.provider_timeout(),
            ))),
        };
        built.unwrap_or_else(|e| {
            log::warn!("pipeline: language model not usable ({e}); questions will get an apology");
            Arc::new(UnconfiguredLlm {
                error: e,
                model: settings.llm_model.clone(),
            })
        })
    }
}

impl ProviderFactory for DefaultProviders {
    fn build(&self, settings: &Settings) -> Result<ProviderSet, ProviderError> {
        let transcriber = self.transcriber(settings)?;
        let wake = build_detector(
            settings,
            Arc::clone(&self.source),
            Arc::clone(&transcriber),
            Arc::clone(&self.muted),
        );
        let speaker: Arc<dyn Speaker> = Arc::new(build_chain(settings, &self.client));

        log::info!(
            "pipeline: providers ready (wake={}, stt={}, llm={:?}, tts={:?})",
            wake.name(),
            transcriber.name(),
            settings.llm_provider,
            settings.tts_chain()
        );

        Ok(ProviderSet {
            wake,
            source: Arc::clone(&self.source),
            transcriber,
            llm: self.llm(settings),
            speaker,
        })
    }
}

/// Stands in for an LLM backend that could not be built (missing key).
/// Built-in intents keep working; questions get the apology.
struct UnconfiguredLlm {
    error: ProviderError,
    model: String,
}

#[async_trait]
impl LlmClient for UnconfiguredLlm {
    async fn complete(
        &self,
        _prompt: &str,
        _history: &[ChatMessage],
    ) -> Result<Completion, ProviderError> {
        Err(self.error.clone())
    }

    fn name(&self) -> &'static str {
        "unconfigured"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::CpalSource;
    use crate::config::SettingsPatch;

    fn factory(dir: &std::path::Path) -> DefaultProviders {
        DefaultProviders::new(
            reqwest::Client::new(),
            Arc::new(CpalSource::new()),
            ModelPaths::new(dir),
            Arc::new(AtomicBool::new(false)),
        )
    }

    #[test]
    fn missing_local_model_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = factory(dir.path()).build(&Settings::default()).err().unwrap();
        assert!(matches!(err, ProviderError::Unavailable(_)), "got {err:?}");
    }

    #[test]
    fn api_whisper_without_key_is_auth() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::default().apply(&SettingsPatch {
            whisper_mode: Some(WhisperMode::Api),
            ..Default::default()
        });
        let err = factory(dir.path()).build(&settings).err().unwrap();
        assert!(matches!(err, ProviderError::Auth(_)));
    }

    #[tokio::test]
    async fn ollama_needs_no_key_and_keyless_openai_fails_per_question() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::default().apply(&SettingsPatch {
            whisper_mode: Some(WhisperMode::Api),
            openai_api_key: Some("sk-test".into()),
            llm_provider: Some(LlmProvider::Ollama),
            ..Default::default()
        });
        let set = factory(dir.path()).build(&settings).unwrap();
        assert_eq!(set.llm.name(), "ollama");
        assert_eq!(set.transcriber.name(), "whisper-api");
        assert_eq!(set.wake.name(), "transcription");

        let unconfigured = factory(dir.path()).llm(&Settings::default());
        assert_eq!(unconfigured.name(), "unconfigured");
        assert!(matches!(
            unconfigured.complete("hi", &[]).await,
            Err(ProviderError::Auth(_))
        ));
    }

    #[test]
    fn access_key_selects_keyword_spotter() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::default().apply(&SettingsPatch {
            whisper_mode: Some(WhisperMode::Api),
            openai_api_key: Some("sk-test".into()),
            picovoice_access_key: Some("pv-key".into()),
            ..Default::default()
        });
        let set = factory(dir.path()).build(&settings).unwrap();
        assert_eq!(set.wake.name(), "keyword-spotter");
    }
}
