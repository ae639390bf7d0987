//! Orchestrator: drives the wake → record → transcribe → route → respond loop.
//!
//! [`Orchestrator`] owns the conversation cycle.  It reads the
//! [`ConfigStore`] at the top of every cycle, writes one [`HistoryEntry`] per
//! cycle that reaches SPEAKING, and publishes its phase through
//! [`SharedStatus`].
//!
//! # Cycle
//!
//! ```text
//! top of cycle: snapshot = config.current()
//!   └─▶ providers stale? ─▶ factory.build (blocking pool)   [Idle on failure]
//!   └─▶ listen(snapshot.wake_word)                           [Listening]
//!         ├─ config changed ─▶ restart cycle with the new snapshot
//!         └─ WakeEvent                                       [WakeDetected]
//!               ├─ trailing command ─▶ use it
//!               └─ "Yes?" ─▶ record window                   [Recording]
//!                            └─▶ transcriber (timeout)       [Transcribing]
//!   └─▶ CommandRouter(snapshot.intent_order)                 [Routing]
//!         ├─ built-in ─▶ reply                               [Executing]
//!         └─ llm.complete (timeout) or apology               [QueryingLlm]
//!   └─▶ speaker chain (timeout)                              [Speaking]
//!   └─▶ history.append(entry)
//! ```
//!
//! Device and provider failures never leave a cycle: they are logged and the
//! cycle either aborts back to LISTENING (no entry) or substitutes the
//! apology.  Every await on a provider races the shutdown token.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::audio::record_blocking;
use crate::config::{ConfigStore, Settings};
use crate::history::{HistoryEntry, HistoryStore, TokenUsage};
use crate::llm::ConversationContext;
use crate::provider::ProviderError;
use crate::router::{builtins, CommandRouter, Route};
use crate::tts;
use crate::wake::{WakeError, WakeEvent};

use super::providers::{ProviderFactory, ProviderSet};
use super::state::{AssistantState, SharedStatus};

/// Spoken when the language model cannot answer.
pub const APOLOGY: &str = "Sorry, I had trouble reaching the language model. Please try again.";

/// Spoken once, when the assistant first starts listening.
pub const GREETING: &str = "Hello! I'm your voice assistant. How can I help you today?";

/// Spoken after a bare wake phrase, before recording the command.
pub const WAKE_ACK: &str = "Yes?";

/// How long in-flight work gets after a shutdown request.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Pause after a recoverable listen failure (device unplugged, quota).
const LISTEN_BACKOFF: Duration = Duration::from_secs(1);

/// How often an IDLE assistant retries on its own.
const IDLE_RETRY: Duration = Duration::from_secs(60);

/// Opens search result pages.
pub type UrlOpener = Arc<dyn Fn(&str) + Send + Sync>;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why [`Orchestrator::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The user said goodbye.
    Farewell,
    /// The shutdown token was cancelled.
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CycleOutcome {
    Continue,
    Exit(ExitReason),
}

/// Result of racing a provider call against the timeout and shutdown.
enum Guarded<T> {
    Done(Result<T, ProviderError>),
    TimedOut,
    Cancelled,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives the conversation cycle until farewell or shutdown.
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use voice_assistant::config::ConfigStore;
/// # use voice_assistant::history::HistoryStore;
/// # use voice_assistant::pipeline::{new_shared_status, Orchestrator, ProviderFactory};
/// # async fn example(factory: Arc<dyn ProviderFactory>) -> anyhow::Result<()> {
/// let config = Arc::new(ConfigStore::open("settings.toml")?);
/// let history = Arc::new(HistoryStore::open("history.json")?);
/// let shutdown = tokio_util::sync::CancellationToken::new();
///
/// let orchestrator = Orchestrator::new(config, history.clone(), factory, new_shared_status(), shutdown);
/// orchestrator.run().await;
/// history.flush();
/// # Ok(())
/// # }
/// ```
pub struct Orchestrator {
    config: Arc<ConfigStore>,
    history: Arc<HistoryStore>,
    factory: Arc<dyn ProviderFactory>,
    status: SharedStatus,
    shutdown: CancellationToken,
    config_rx: watch::Receiver<u64>,
    context: ConversationContext,
    /// Providers and the snapshot they were built from.
    providers: Option<(Arc<Settings>, ProviderSet)>,
    /// Wake phrase of the last snapshot a cycle started with.
    last_wake_word: Option<String>,
    greeted: bool,
    url_opener: UrlOpener,
}

impl Orchestrator {
    pub fn new(
        config: Arc<ConfigStore>,
        history: Arc<HistoryStore>,
        factory: Arc<dyn ProviderFactory>,
        status: SharedStatus,
        shutdown: CancellationToken,
    ) -> Self {
        let config_rx = config.subscribe();
        Self {
            config,
            history,
            factory,
            status,
            shutdown,
            config_rx,
            context: ConversationContext::new(),
            providers: None,
            last_wake_word: None,
            greeted: false,
            url_opener: Arc::new(builtins::open_in_browser),
        }
    }

    /// Replace how search pages are opened.
    pub fn with_url_opener(mut self, opener: UrlOpener) -> Self {
        self.url_opener = opener;
        self
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Run cycles until the user says goodbye or `shutdown` is cancelled.
    pub async fn run(mut self) -> ExitReason {
        log::info!("pipeline: orchestrator started");
        let reason = loop {
            match self.run_cycle().await {
                CycleOutcome::Continue => {}
                CycleOutcome::Exit(reason) => break reason,
            }
        };
        self.set_state(AssistantState::Stopped);
        log::info!("pipeline: orchestrator stopped ({reason:?})");
        reason
    }

    /// One pass from the top of the cycle back to LISTENING.
    pub(crate) async fn run_cycle(&mut self) -> CycleOutcome {
        if self.shutdown.is_cancelled() {
            return CycleOutcome::Exit(ExitReason::Shutdown);
        }

        // ── 1. Snapshot for this cycle ───────────────────────────────────
        self.config_rx.borrow_and_update();
        let settings = self.config.current();

        let providers = match self.ensure_providers(&settings).await {
            Some(p) => p,
            None => return self.wait_in_idle().await,
        };

        if let Some(outcome) = self.announce(&settings, &providers).await {
            return outcome;
        }

        // ── 2. Listen ────────────────────────────────────────────────────
        self.set_state(AssistantState::Listening);
        let listen_cancel = self.shutdown.child_token();
        let event = tokio::select! {
            r = providers.wake.listen(&settings.wake_word, &listen_cancel) => r,
            changed = self.config_rx.changed() => {
                listen_cancel.cancel();
                if changed.is_ok() {
                    log::info!("pipeline: settings changed while listening, restarting cycle");
                    return CycleOutcome::Continue;
                }
                // The store is gone; nothing will ever change again.
                self.shutdown.cancelled().await;
                return CycleOutcome::Exit(ExitReason::Shutdown);
            }
        };

        let event = match event {
            Ok(event) => event,
            Err(WakeError::Cancelled) => return self.after_cancel(),
            Err(e) if e.is_unrecoverable() => {
                log::error!("pipeline: wake detector {} failed: {e}", providers.wake.name());
                self.providers = None;
                self.set_idle(format!("wake detection failed: {e}"));
                return self.wait_in_idle().await;
            }
            Err(e) => {
                log::warn!("pipeline: listen failed: {e}, retrying");
                return self.pause(LISTEN_BACKOFF).await;
            }
        };

        // ── 3. From here on the snapshot is fixed for the cycle ──────────
        self.run_command(&settings, &providers, event).await
    }

    /// WAKE_DETECTED through SPEAKING for one command.
    async fn run_command(
        &mut self,
        settings: &Settings,
        providers: &ProviderSet,
        event: WakeEvent,
    ) -> CycleOutcome {
        self.set_state(AssistantState::WakeDetected);
        log::debug!("pipeline: wake at {}", event.at);

        let query = match event.trailing {
            Some(text) => {
                log::info!("pipeline: command spoken with the wake phrase: {text:?}");
                text
            }
            None => match self.capture_command(settings, providers).await {
                Ok(Some(text)) => text,
                Ok(None) => return CycleOutcome::Continue,
                Err(outcome) => return outcome,
            },
        };

        // ── Routing ──────────────────────────────────────────────────────
        self.set_state(AssistantState::Routing);
        let started = Instant::now();
        let router = CommandRouter::from_settings(settings);

        let (response, entry_for, exit) = match router.route(&query) {
            Route::BuiltIn(reply) => {
                self.set_state(AssistantState::Executing);
                log::info!("pipeline: built-in intent `{}`", reply.intent.label());
                if let Some(url) = &reply.open_url {
                    (self.url_opener)(url);
                }
                (reply.response, None, reply.exit)
            }
            Route::Llm => {
                self.set_state(AssistantState::QueryingLlm);
                let history = self.context.history();
                let llm = Arc::clone(&providers.llm);
                let call = llm.complete(&query, &history);
                match self.guard(settings.provider_timeout(), call).await {
                    Guarded::Done(Ok(completion)) => {
                        self.context.push_exchange(&query, &completion.text);
                        let model = Some(completion.model.clone());
                        (completion.text, Some((completion.usage, model)), false)
                    }
                    Guarded::Done(Err(e)) => {
                        log::warn!("pipeline: {} failed ({}): {e}", llm.name(), e.kind());
                        (APOLOGY.to_string(), Some((TokenUsage::default(), Some(llm.model().to_string()))), false)
                    }
                    Guarded::TimedOut => {
                        log::warn!("pipeline: {} timed out", llm.name());
                        (APOLOGY.to_string(), Some((TokenUsage::default(), Some(llm.model().to_string()))), false)
                    }
                    Guarded::Cancelled => return CycleOutcome::Exit(ExitReason::Shutdown),
                }
            }
        };

        // ── Speaking ─────────────────────────────────────────────────────
        self.set_state(AssistantState::Speaking);
        let spoken = self.speak(settings, providers, &response).await;

        let latency_ms = started.elapsed().as_millis() as u64;
        let entry = match entry_for {
            None => HistoryEntry::built_in(query.clone(), &response, latency_ms),
            Some((usage, model)) => HistoryEntry::llm(query.clone(), &response, usage, model, latency_ms),
        };
        self.commit(entry);

        if !spoken {
            return CycleOutcome::Exit(ExitReason::Shutdown);
        }
        if exit {
            log::info!("pipeline: farewell received, shutting down");
            return CycleOutcome::Exit(ExitReason::Farewell);
        }
        CycleOutcome::Continue
    }

    /// RECORDING and TRANSCRIBING.  `Ok(None)` aborts the cycle quietly.
    async fn capture_command(
        &mut self,
        settings: &Settings,
        providers: &ProviderSet,
    ) -> Result<Option<String>, CycleOutcome> {
        if !self.speak(settings, providers, WAKE_ACK).await {
            return Err(CycleOutcome::Exit(ExitReason::Shutdown));
        }

        self.set_state(AssistantState::Recording);
        let record = record_blocking(
            Arc::clone(&providers.source),
            &settings.audio_input_device,
            settings.record_window(),
        );
        let audio = tokio::select! {
            _ = self.shutdown.cancelled() => return Err(CycleOutcome::Exit(ExitReason::Shutdown)),
            r = record => match r {
                Ok(audio) => audio,
                Err(e) => {
                    log::warn!("pipeline: recording failed: {e}");
                    return Ok(None);
                }
            },
        };

        self.set_state(AssistantState::Transcribing);
        let transcriber = Arc::clone(&providers.transcriber);
        let text = match self
            .guard(settings.provider_timeout(), transcriber.transcribe(&audio))
            .await
        {
            Guarded::Done(Ok(text)) => text,
            Guarded::Done(Err(e)) => {
                log::warn!("pipeline: {} failed ({}): {e}", transcriber.name(), e.kind());
                return Ok(None);
            }
            Guarded::TimedOut => {
                log::warn!("pipeline: {} timed out", transcriber.name());
                return Ok(None);
            }
            Guarded::Cancelled => return Err(CycleOutcome::Exit(ExitReason::Shutdown)),
        };

        let text = text.trim();
        if text.is_empty() {
            log::debug!("pipeline: empty transcript, back to listening");
            return Ok(None);
        }
        log::info!("pipeline: heard {text:?}");
        Ok(Some(text.to_string()))
    }

    // -----------------------------------------------------------------------
    // Providers
    // -----------------------------------------------------------------------

    /// Providers for `settings`, rebuilding them if the snapshot changed.
    async fn ensure_providers(&mut self, settings: &Arc<Settings>) -> Option<ProviderSet> {
        if let Some((built_from, set)) = &self.providers {
            if **built_from == **settings {
                return Some(set.clone());
            }
        }

        let factory = Arc::clone(&self.factory);
        let snapshot = Arc::clone(settings);
        let built = tokio::task::spawn_blocking(move || factory.build(&snapshot))
            .await
            .unwrap_or_else(|e| Err(ProviderError::Unavailable(format!("provider build task failed: {e}"))));

        match built {
            Ok(set) => {
                self.providers = Some((Arc::clone(settings), set.clone()));
                Some(set)
            }
            Err(e) => {
                log::error!("pipeline: cannot build providers ({}): {e}", e.kind());
                self.providers = None;
                self.set_idle(format!("providers unavailable: {e}"));
                None
            }
        }
    }

    /// Startup greeting and wake phrase change announcement.
    async fn announce(&mut self, settings: &Settings, providers: &ProviderSet) -> Option<CycleOutcome> {
        let previous = self.last_wake_word.replace(settings.wake_word.clone());

        let message = if !self.greeted {
            self.greeted = true;
            Some(GREETING.to_string())
        } else if previous.is_some_and(|p| p != settings.wake_word) {
            Some(format!("Wake word changed to {}", settings.wake_word))
        } else {
            None
        };

        let message = message?;
        if self.speak(settings, providers, &message).await {
            None
        } else {
            Some(CycleOutcome::Exit(ExitReason::Shutdown))
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Race `call` against `timeout` and shutdown.
    async fn guard<T>(
        &self,
        timeout: Duration,
        call: impl Future<Output = Result<T, ProviderError>>,
    ) -> Guarded<T> {
        tokio::select! {
            _ = self.shutdown.cancelled() => Guarded::Cancelled,
            r = tokio::time::timeout(timeout, call) => match r {
                Ok(r) => Guarded::Done(r),
                Err(_) => Guarded::TimedOut,
            },
        }
    }

    /// Speak through the chain.  Failures are logged and absorbed.  Returns
    /// `false` only when shutdown interrupted the speech.
    async fn speak(&self, settings: &Settings, providers: &ProviderSet, text: &str) -> bool {
        let speaker = Arc::clone(&providers.speaker);
        // Each speaker has its own limit; this one only stops a stuck chain.
        let budget = tts::chain_budget(settings, text);
        match self.guard(budget, speaker.speak(text)).await {
            Guarded::Done(Ok(())) => true,
            Guarded::Done(Err(e)) => {
                log::warn!("pipeline: could not speak ({}): {e}", e.kind());
                true
            }
            Guarded::TimedOut => {
                log::warn!("pipeline: speaking timed out");
                true
            }
            Guarded::Cancelled => false,
        }
    }

    fn commit(&self, entry: HistoryEntry) {
        {
            let mut st = self.status.lock().unwrap_or_else(|e| e.into_inner());
            st.last_query = Some(entry.query.clone());
            st.last_response = Some(entry.response.clone());
            st.cycles += 1;
        }
        self.history.append(entry);
    }

    fn after_cancel(&self) -> CycleOutcome {
        if self.shutdown.is_cancelled() {
            CycleOutcome::Exit(ExitReason::Shutdown)
        } else {
            CycleOutcome::Continue
        }
    }

    async fn pause(&self, delay: Duration) -> CycleOutcome {
        tokio::select! {
            _ = self.shutdown.cancelled() => CycleOutcome::Exit(ExitReason::Shutdown),
            _ = tokio::time::sleep(delay) => CycleOutcome::Continue,
        }
    }

    /// Stay in IDLE until the settings change, the retry interval passes or
    /// shutdown.
    async fn wait_in_idle(&mut self) -> CycleOutcome {
        tokio::select! {
            _ = self.shutdown.cancelled() => CycleOutcome::Exit(ExitReason::Shutdown),
            changed = self.config_rx.changed() => {
                if changed.is_ok() {
                    log::info!("pipeline: settings changed, leaving idle");
                    CycleOutcome::Continue
                } else {
                    self.shutdown.cancelled().await;
                    CycleOutcome::Exit(ExitReason::Shutdown)
                }
            }
            _ = tokio::time::sleep(IDLE_RETRY) => CycleOutcome::Continue,
        }
    }

    fn set_state(&self, state: AssistantState) {
        let mut st = self.status.lock().unwrap_or_else(|e| e.into_inner());
        st.state = state;
        if state != AssistantState::Idle {
            st.idle_reason = None;
        }
    }

    fn set_idle(&self, reason: String) {
        let mut st = self.status.lock().unwrap_or_else(|e| e.into_inner());
        st.state = AssistantState::Idle;
        st.idle_reason = Some(reason);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
