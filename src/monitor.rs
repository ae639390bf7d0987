//! Facade for the external monitoring surface.
//!
//! The monitoring process (a small web dashboard) never touches the stores
//! directly: it goes through [`MonitorApi`], which reads snapshots, writes
//! settings through [`ConfigStore::update`] and proxies the local model
//! daemon.  Credentials never leave this module unredacted.
//!
//! [`StatusPublisher`] mirrors [`MonitorApi::status`] into a JSON file so a
//! dashboard in another process can show state and mute without a socket.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::audio::{list_devices, AudioDevices};
use crate::config::{ConfigError, ConfigStore, LlmProvider, SettingsPatch, REDACTED};
use crate::history::{HistoryEntry, HistoryStore, QueryAggregate, StatsSample};
use crate::llm::{CatalogModel, InstalledModel, OllamaClient, PullProgress, OPENAI_MODELS, RECOMMENDED_OLLAMA_MODELS};
use crate::pipeline::{AssistantStatus, SharedStatus};
use crate::provider::ProviderError;

const SECRET_FIELDS: [&str; 2] = ["openai_api_key", "picovoice_access_key"];

// ---------------------------------------------------------------------------
// Error / status types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Everything the dashboard header shows.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    #[serde(flatten)]
    pub assistant: AssistantStatus,
    /// Hardware-mute flag from the capture path.
    pub muted: bool,
    pub wake_word: String,
    /// Bumped on every published settings change.
    pub settings_generation: u64,
}

// ---------------------------------------------------------------------------
// MonitorApi
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct MonitorApi {
    config: Arc<ConfigStore>,
    history: Arc<HistoryStore>,
    status: SharedStatus,
    muted: Arc<AtomicBool>,
    client: reqwest::Client,
}

impl MonitorApi {
    pub fn new(
        config: Arc<ConfigStore>,
        history: Arc<HistoryStore>,
        status: SharedStatus,
        muted: Arc<AtomicBool>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            config,
            history,
            status,
            muted,
            client,
        }
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    /// Current snapshot with credentials blanked.
    pub fn settings(&self) -> Value {
        self.config.current().redacted_json()
    }

    /// Apply a partial settings document and return the new redacted view.
    ///
    /// Secret fields still holding the redaction placeholder are ignored, so
    /// posting back what [`settings`](Self::settings) returned keeps the
    /// stored credentials.  Nothing is applied if any field is invalid.
    pub fn patch_settings(&self, document: &Map<String, Value>) -> Result<Value, MonitorError> {
        let mut document = document.clone();
        for key in SECRET_FIELDS {
            if document.get(key).and_then(Value::as_str) == Some(REDACTED) {
                document.remove(key);
            }
        }

        let patch = SettingsPatch::from_json_map(&document)?;
        let updated = self.config.update(&patch)?;
        log::info!("monitor: settings updated ({} field(s))", document.len());
        Ok(updated.redacted_json())
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    /// Query entries, newest first.
    pub fn history(&self, limit: usize, offset: usize) -> Vec<HistoryEntry> {
        self.history.queries(limit, offset)
    }

    /// Resource samples, newest first.
    pub fn stats(&self, limit: usize, offset: usize) -> Vec<StatsSample> {
        self.history.stats(limit, offset)
    }

    pub fn aggregate(&self) -> QueryAggregate {
        self.history.aggregate()
    }

    /// Drop every query entry.  Stats samples are kept.
    pub fn clear_history(&self) {
        self.history.clear_queries();
        log::info!("monitor: query history cleared");
    }

    // -----------------------------------------------------------------------
    // Status and devices
    // -----------------------------------------------------------------------

    pub fn status(&self) -> MonitorStatus {
        let assistant = self.status.lock().unwrap_or_else(|e| e.into_inner()).clone();
        MonitorStatus {
            assistant,
            muted: self.muted.load(Ordering::Relaxed),
            wake_word: self.config.current().wake_word.clone(),
            settings_generation: self.config.generation(),
        }
    }

    /// Blocks while the audio host enumerates devices.
    pub fn devices(&self) -> AudioDevices {
        list_devices()
    }

    pub fn recommended_models(&self) -> &'static [CatalogModel] {
        RECOMMENDED_OLLAMA_MODELS
    }

    pub fn cloud_models(&self) -> &'static [CatalogModel] {
        OPENAI_MODELS
    }

    // -----------------------------------------------------------------------
    // Local model daemon
    // -----------------------------------------------------------------------

    /// Client for the configured daemon.  Only valid while the assistant is
    /// set to use it.
    fn ollama(&self) -> Result<OllamaClient, ProviderError> {
        let settings = self.config.current();
        if settings.llm_provider != LlmProvider::Ollama {
            return Err(ProviderError::InvalidInput(
                "model management needs llm_provider = ollama".into(),
            ));
        }
        Ok(OllamaClient::new(
            self.client.clone(),
            &settings.ollama_host,
            &settings.llm_model,
            settings.provider_timeout(),
        ))
    }

    pub async fn ollama_available(&self) -> bool {
        match self.ollama() {
            Ok(client) => client.is_available().await,
            Err(_) => false,
        }
    }

    pub async fn installed_models(&self) -> Result<Vec<InstalledModel>, ProviderError> {
        self.ollama()?.list_models().await
    }

    pub async fn pull_model<F>(&self, name: &str, on_progress: F) -> Result<(), ProviderError>
    where
        F: FnMut(&PullProgress) + Send,
    {
        self.ollama()?.pull(name, on_progress).await
    }

    pub async fn delete_model(&self, name: &str) -> Result<(), ProviderError> {
        self.ollama()?.delete_model(name).await
    }

    pub async fn model_info(&self, name: &str) -> Result<Value, ProviderError> {
        self.ollama()?.model_info(name).await
    }
}

// ---------------------------------------------------------------------------
// StatusPublisher
// ---------------------------------------------------------------------------

/// How often the status file is checked for changes.
pub const STATUS_INTERVAL: Duration = Duration::from_millis(500);

/// Background task that rewrites the status file whenever the status changes.
pub struct StatusPublisher;

impl StatusPublisher {
    /// Poll `api.status()` every `interval` and write it to `path` when it
    /// differs from the last write.  One last write happens on cancel so the
    /// file ends on the final state.
    pub fn spawn(
        api: MonitorApi,
        path: PathBuf,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            log::info!("monitor: publishing status to {}", path.display());
            let mut last = String::new();
            loop {
                let stopping = tokio::select! {
                    _ = cancel.cancelled() => true,
                    _ = tokio::time::sleep(interval) => false,
                };

                match serde_json::to_string_pretty(&api.status()) {
                    Ok(body) if body != last => match write_atomic(&path, &body).await {
                        Ok(()) => last = body,
                        Err(e) => log::warn!("monitor: writing {}: {e}", path.display()),
                    },
                    Ok(_) => {}
                    Err(e) => log::warn!("monitor: serialising status: {e}"),
                }

                if stopping {
                    break;
                }
            }
            log::info!("monitor: status publisher stopped");
        })
    }
}

/// Write through a sibling temp file so readers never see a partial document.
async fn write_atomic(path: &Path, body: &str) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, path).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::TokenUsage;
    use crate::pipeline::{new_shared_status, AssistantState};
    use serde_json::json;
    use tempfile::TempDir;

    fn api() -> (TempDir, MonitorApi) {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigStore::open_with_env(
            dir.path().join("settings.toml"),
            SettingsPatch {
                openai_api_key: Some("sk-secret".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let history = HistoryStore::open(dir.path().join("history.json")).unwrap();
        let api = MonitorApi::new(
            Arc::new(config),
            Arc::new(history),
            new_shared_status(),
            Arc::new(AtomicBool::new(false)),
            reqwest::Client::new(),
        );
        (dir, api)
    }

    fn object(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn settings_view_hides_credentials() {
        let (_dir, api) = api();
        let view = api.settings();
        assert_eq!(view["openai_api_key"], REDACTED);
        assert_eq!(view["picovoice_access_key"], "");
        assert_eq!(view["wake_word"], "jetson");
    }

    #[test]
    fn posting_the_view_back_keeps_the_key() {
        let (_dir, api) = api();
        let mut doc = object(api.settings());
        doc.insert("wake_word".into(), json!("Computer"));
        api.patch_settings(&doc).unwrap();

        let current = api.config.current();
        assert_eq!(current.wake_word, "computer");
        assert_eq!(current.openai_api_key, "sk-secret");
    }

    #[test]
    fn invalid_patch_changes_nothing() {
        let (_dir, api) = api();
        let before = api.config.generation();
        let err = api
            .patch_settings(&object(json!({ "wake_word": "hal", "tts_speed": 0 })))
            .unwrap_err();
        assert!(matches!(err, MonitorError::Config(ConfigError::Invalid { .. })));
        assert_eq!(api.config.current().wake_word, "jetson");
        assert_eq!(api.config.generation(), before);
    }

    #[test]
    fn status_reports_state_and_mute() {
        let (_dir, api) = api();
        api.status.lock().unwrap().state = AssistantState::Speaking;
        api.muted.store(true, Ordering::Relaxed);

        let st = api.status();
        assert_eq!(st.assistant.state, AssistantState::Speaking);
        assert!(st.muted);
        let v = serde_json::to_value(&st).unwrap();
        assert_eq!(v["state"], "speaking");
        assert_eq!(v["wake_word"], "jetson");
    }

    #[test]
    fn clear_history_empties_queries() {
        let (_dir, api) = api();
        api.history.append(HistoryEntry::built_in("hi", "Hello!", 3));
        api.history.append(HistoryEntry::llm(
            "why",
            "because",
            TokenUsage::default(),
            None,
            10,
        ));
        assert_eq!(api.history(10, 0).len(), 2);
        assert_eq!(api.aggregate().total_queries, 2);

        api.clear_history();
        assert!(api.history(10, 0).is_empty());
    }

    #[tokio::test]
    async fn model_management_requires_ollama() {
        let (_dir, api) = api();
        let err = api.installed_models().await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidInput(_)));
        assert!(!api.ollama_available().await);
        assert!(!api.recommended_models().is_empty());
        assert!(!api.cloud_models().is_empty());
    }

    #[tokio::test]
    async fn publisher_writes_state_and_mute() {
        let (dir, api) = api();
        let path = dir.path().join("status.json");
        let cancel = CancellationToken::new();
        let task = StatusPublisher::spawn(
            api.clone(),
            path.clone(),
            Duration::from_millis(20),
            cancel.clone(),
        );

        api.status.lock().unwrap().state = AssistantState::Speaking;
        api.muted.store(true, Ordering::Relaxed);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        let published = loop {
            if let Ok(text) = tokio::fs::read_to_string(&path).await {
                let v: Value = serde_json::from_str(&text).unwrap();
                if v["muted"] == true && v["state"] == "speaking" {
                    break v;
                }
            }
            assert!(tokio::time::Instant::now() < deadline, "status file never updated");
            tokio::time::sleep(Duration::from_millis(20)).await;
        };
        assert_eq!(published["wake_word"], "jetson");

        api.status.lock().unwrap().state = AssistantState::Stopped;
        cancel.cancel();
        task.await.unwrap();
        let v: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["state"], "stopped");
        assert!(!dir.path().join("status.json.tmp").exists());
    }
}
