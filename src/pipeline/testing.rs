//! Scripted providers and a harness for orchestrator tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::audio::{AudioSource, DeviceError, PcmBuffer};
use crate::config::{ConfigStore, Settings, SettingsPatch, TtsProvider};
use crate::history::{HistoryStore, TokenUsage};
use crate::llm::{ChatMessage, Completion, LlmClient};
use crate::provider::ProviderError;
use crate::stt::Transcriber;
use crate::tts::{FallbackSpeaker, Speaker};
use crate::wake::{WakeDetector, WakeError, WakeEvent};

use super::providers::{ProviderFactory, ProviderSet};
use super::runner::Orchestrator;
use super::state::{new_shared_status, SharedStatus};

type SpeakerLog = Arc<Mutex<Vec<(String, String)>>>;

// ---------------------------------------------------------------------------
// Wake
// ---------------------------------------------------------------------------

/// Pops scripted results; with nothing scripted it listens until cancelled.
#[derive(Default)]
pub struct FakeWake {
    script: Mutex<VecDeque<Result<WakeEvent, WakeError>>>,
    phrases: Mutex<Vec<String>>,
}

impl FakeWake {
    pub fn push_wake(&self, trailing: Option<&str>) {
        self.script
            .lock()
            .unwrap()
            .push_back(Ok(WakeEvent::now(trailing.map(str::to_string))));
    }

    pub fn push_error(&self, error: WakeError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    /// Phrases passed to `listen`, in call order.
    pub fn phrases(&self) -> Vec<String> {
        self.phrases.lock().unwrap().clone()
    }
}

#[async_trait]
impl WakeDetector for FakeWake {
    async fn listen(&self, phrase: &str, cancel: &CancellationToken) -> Result<WakeEvent, WakeError> {
        self.phrases.lock().unwrap().push(phrase.to_string());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => {
                cancel.cancelled().await;
                Err(WakeError::Cancelled)
            }
        }
    }

    fn name(&self) -> &'static str {
        "fake-wake"
    }
}

// ---------------------------------------------------------------------------
// Audio and transcription
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct ScriptedSource {
    fail_next: AtomicBool,
}

impl ScriptedSource {
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl AudioSource for ScriptedSource {
    fn record(&self, device: &str, _duration: Duration) -> Result<PcmBuffer, DeviceError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(DeviceError::DeviceNotFound(device.to_string()));
        }
        Ok(PcmBuffer::new(vec![0.1; 1_600], 16_000))
    }
}

type Hook = Box<dyn FnOnce() + Send>;

/// Pops scripted transcripts; an empty script yields empty text.
#[derive(Default)]
pub struct ScriptedTranscriber {
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    calls: AtomicUsize,
    hook: Mutex<Option<Hook>>,
}

impl ScriptedTranscriber {
    pub fn push(&self, result: Result<String, ProviderError>) {
        self.script.lock().unwrap().push_back(result);
    }

    /// Run `f` once, on the next call.
    pub fn on_call(&self, f: impl FnOnce() + Send + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(f));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, _audio: &PcmBuffer) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let hook = self.hook.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

// ---------------------------------------------------------------------------
// LLM
// ---------------------------------------------------------------------------

pub const LLM_ANSWER: &str = "Because of Rayleigh scattering.";

/// Answers every question the same way and records the history it saw.
#[derive(Default)]
pub struct CountingLlm {
    failure: Mutex<Option<ProviderError>>,
    history_lengths: Mutex<Vec<usize>>,
}

impl CountingLlm {
    pub fn fail_with(&self, error: ProviderError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    pub fn calls(&self) -> usize {
        self.history_lengths.lock().unwrap().len()
    }

    pub fn history_lengths(&self) -> Vec<usize> {
        self.history_lengths.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for CountingLlm {
    async fn complete(
        &self,
        _prompt: &str,
        history: &[ChatMessage],
    ) -> Result<Completion, ProviderError> {
        self.history_lengths.lock().unwrap().push(history.len());
        if let Some(e) = self.failure.lock().unwrap().clone() {
            return Err(e);
        }
        Ok(Completion {
            text: LLM_ANSWER.into(),
            usage: TokenUsage {
                prompt: Some(8),
                completion: Some(4),
                total: 12,
            },
            model: "fake-model".into(),
        })
    }

    fn name(&self) -> &'static str {
        "counting"
    }

    fn model(&self) -> &str {
        "fake-model"
    }
}

// ---------------------------------------------------------------------------
// Speakers
// ---------------------------------------------------------------------------

/// Logs what it says under the provider's label.
struct TaggedSpeaker {
    name: &'static str,
    fails: bool,
    delay: Option<Duration>,
    log: SpeakerLog,
}

#[async_trait]
impl Speaker for TaggedSpeaker {
    async fn speak(&self, text: &str) -> Result<(), ProviderError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fails {
            return Err(ProviderError::Unavailable(format!("{} is broken", self.name)));
        }
        self.log
            .lock()
            .unwrap()
            .push((self.name.to_string(), text.to_string()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Hands out the shared fakes, with a fresh speaker chain per snapshot.
pub struct FakeFactory {
    wake: Arc<FakeWake>,
    source: Arc<ScriptedSource>,
    transcriber: Arc<ScriptedTranscriber>,
    llm: Arc<CountingLlm>,
    log: SpeakerLog,
    failing_speakers: Mutex<Vec<TtsProvider>>,
    hanging_speakers: Mutex<Vec<TtsProvider>>,
    speaker_delay: Mutex<Option<Duration>>,
    build_error: Mutex<Option<ProviderError>>,
    builds: AtomicUsize,
}

impl FakeFactory {
    pub fn fail_speaker(&self, provider: TtsProvider) {
        self.failing_speakers.lock().unwrap().push(provider);
    }

    /// `provider` never finishes speaking.
    pub fn hang_speaker(&self, provider: TtsProvider) {
        self.hanging_speakers.lock().unwrap().push(provider);
    }

    pub fn slow_speakers(&self, delay: Duration) {
        *self.speaker_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_builds(&self, error: ProviderError) {
        *self.build_error.lock().unwrap() = Some(error);
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl ProviderFactory for FakeFactory {
    fn build(&self, settings: &Settings) -> Result<ProviderSet, ProviderError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.build_error.lock().unwrap().clone() {
            return Err(e);
        }

        let failing = self.failing_speakers.lock().unwrap().clone();
        let hanging = self.hanging_speakers.lock().unwrap().clone();
        let delay = *self.speaker_delay.lock().unwrap();
        let chain = settings
            .tts_chain()
            .into_iter()
            .map(|p| {
                Arc::new(TaggedSpeaker {
                    name: p.label(),
                    fails: failing.contains(&p),
                    delay: if hanging.contains(&p) {
                        Some(Duration::from_secs(3600))
                    } else {
                        delay
                    },
                    log: Arc::clone(&self.log),
                }) as Arc<dyn Speaker>
            })
            .collect();

        Ok(ProviderSet {
            wake: self.wake.clone(),
            source: self.source.clone(),
            transcriber: self.transcriber.clone(),
            llm: self.llm.clone(),
            speaker: Arc::new(
                FallbackSpeaker::new(chain).with_attempt_timeout(settings.provider_timeout()),
            ),
        })
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// A config store and history log in a temp dir plus the fakes above.
pub struct Harness {
    pub config: Arc<ConfigStore>,
    pub history: Arc<HistoryStore>,
    pub status: SharedStatus,
    pub shutdown: CancellationToken,
    pub wake: Arc<FakeWake>,
    pub source: Arc<ScriptedSource>,
    pub transcriber: Arc<ScriptedTranscriber>,
    pub llm: Arc<CountingLlm>,
    pub factory: Arc<FakeFactory>,
    log: SpeakerLog,
    opened: Arc<Mutex<Vec<String>>>,
    _dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(
            ConfigStore::open_with_env(dir.path().join("settings.toml"), SettingsPatch::default())
                .unwrap(),
        );
        let history = Arc::new(HistoryStore::open(dir.path().join("history.json")).unwrap());

        let wake = Arc::new(FakeWake::default());
        let source = Arc::new(ScriptedSource::default());
        let transcriber = Arc::new(ScriptedTranscriber::default());
        let llm = Arc::new(CountingLlm::default());
        let log: SpeakerLog = Arc::default();
        let factory = Arc::new(FakeFactory {
            wake: wake.clone(),
            source: source.clone(),
            transcriber: transcriber.clone(),
            llm: llm.clone(),
            log: Arc::clone(&log),
            failing_speakers: Mutex::default(),
            hanging_speakers: Mutex::default(),
            speaker_delay: Mutex::default(),
            build_error: Mutex::default(),
            builds: AtomicUsize::new(0),
        });

        Self {
            config,
            history,
            status: new_shared_status(),
            shutdown: CancellationToken::new(),
            wake,
            source,
            transcriber,
            llm,
            factory,
            log,
            opened: Arc::default(),
            _dir: dir,
        }
    }

    pub fn orchestrator(&self) -> Orchestrator {
        let opened = Arc::clone(&self.opened);
        Orchestrator::new(
            Arc::clone(&self.config),
            Arc::clone(&self.history),
            self.factory.clone(),
            Arc::clone(&self.status),
            self.shutdown.clone(),
        )
        .with_url_opener(Arc::new(move |url: &str| {
            opened.lock().unwrap().push(url.to_string());
        }))
    }

    /// (speaker, text) for every successful utterance.
    pub fn speaker_log(&self) -> Vec<(String, String)> {
        self.log.lock().unwrap().clone()
    }

    /// Everything spoken, whichever speaker said it.
    pub fn spoken(&self) -> Vec<String> {
        self.speaker_log().into_iter().map(|(_, text)| text).collect()
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}
