//! Layered settings store with atomic snapshot publication.
//!
//! ```text
//!  defaults ──┐
//!  env layer ─┼─► merge ─► validate ─► ArcSwap<Settings> ─► readers (load_full)
//!  override ──┘                              │
//!                                            └─► watch::Sender<u64> (generation)
//! ```
//!
//! Readers never block: `current()` is a lock-free pointer load.  Writers
//! (`update`, `reload`) serialise on a mutex around the override layer, so
//! two concurrent PATCHes can never interleave half of each other's fields.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use tokio::sync::watch;

use super::settings::{Settings, SettingsPatch};
use super::ConfigError;

// ---------------------------------------------------------------------------
// ConfigStore
// ---------------------------------------------------------------------------

/// Owner of the current [`Settings`] snapshot.
pub struct ConfigStore {
    settings_file: PathBuf,
    env_layer: SettingsPatch,
    /// The persisted override layer.  Also serves as the writer lock.
    override_layer: Mutex<SettingsPatch>,
    current: ArcSwap<Settings>,
    generation: watch::Sender<u64>,
}

impl ConfigStore {
    /// Open the store using the process environment as the env layer.
    ///
    /// A missing override file is treated as empty.  An override file that
    /// exists but cannot be parsed or produces invalid settings is fatal:
    /// there is no previous snapshot to fall back to at startup.
    pub fn open(settings_file: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let env_layer = SettingsPatch::from_process_env()
            .map_err(|e| ConfigError::Corrupt(format!("environment: {e}")))?;
        Self::open_with_env(settings_file, env_layer)
    }

    /// Open the store with an explicit env layer.
    pub fn open_with_env(
        settings_file: impl AsRef<Path>,
        env_layer: SettingsPatch,
    ) -> Result<Self, ConfigError> {
        let settings_file = settings_file.as_ref().to_path_buf();

        let override_layer = read_override(&settings_file)
            .map_err(|e| ConfigError::Corrupt(format!("{}: {e}", settings_file.display())))?;
        let settings = build(&env_layer, &override_layer)
            .map_err(|e| ConfigError::Corrupt(e.to_string()))?;

        log::info!(
            "config: loaded (wake_word={:?}, llm={:?}/{}, tts={})",
            settings.wake_word,
            settings.llm_provider,
            settings.llm_model,
            settings.tts_provider.label()
        );

        let (generation, _) = watch::channel(0);

        Ok(Self {
            settings_file,
            env_layer,
            override_layer: Mutex::new(override_layer),
            current: ArcSwap::from_pointee(settings),
            generation,
        })
    }

    /// The current snapshot.  Never blocks on writers.
    pub fn current(&self) -> Arc<Settings> {
        self.current.load_full()
    }

    /// Receiver that changes whenever a new snapshot is published.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    /// Number of snapshots published since open.
    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    /// Path of the override document.
    pub fn settings_file(&self) -> &Path {
        &self.settings_file
    }

    /// Merge `patch` into the override layer, validate, persist and publish.
    ///
    /// On any error the override layer, the file and the current snapshot
    /// are all left as they were.  Applying a patch that changes nothing
    /// does not publish and does not bump the generation.
    pub fn update(&self, patch: &SettingsPatch) -> Result<Arc<Settings>, ConfigError> {
        let mut override_layer = self
            .override_layer
            .lock()
            .map_err(|_| ConfigError::Corrupt("override lock poisoned".into()))?;

        let candidate_layer = override_layer.merge(patch);
        let candidate = build(&self.env_layer, &candidate_layer)?;

        if candidate_layer != *override_layer {
            write_override(&self.settings_file, &candidate_layer)?;
            *override_layer = candidate_layer;
        }

        Ok(self.publish(candidate))
    }

    /// Re-read the override document and publish the result.
    ///
    /// A missing file means "no overrides".  If the file cannot be parsed
    /// or validated the previous snapshot stays in force and the error is
    /// returned for logging.
    pub fn reload(&self) -> Result<Arc<Settings>, ConfigError> {
        let mut override_layer = self
            .override_layer
            .lock()
            .map_err(|_| ConfigError::Corrupt("override lock poisoned".into()))?;

        let result = read_override(&self.settings_file)
            .and_then(|layer| build(&self.env_layer, &layer).map(|s| (layer, s)));

        match result {
            Ok((layer, settings)) => {
                *override_layer = layer;
                Ok(self.publish(settings))
            }
            Err(e) => {
                log::warn!("config: reload rejected, keeping previous settings: {e}");
                Err(e)
            }
        }
    }

    /// Store `settings` if it differs from the current snapshot.
    ///
    /// Callers hold the override lock, so publication order matches the
    /// order writes were accepted.
    fn publish(&self, settings: Settings) -> Arc<Settings> {
        let previous = self.current.load_full();
        if *previous == settings {
            return previous;
        }

        let next = Arc::new(settings);
        self.current.store(Arc::clone(&next));
        self.generation.send_modify(|g| *g += 1);
        log::info!("config: published generation {}", self.generation());
        next
    }
}

fn build(env_layer: &SettingsPatch, override_layer: &SettingsPatch) -> Result<Settings, ConfigError> {
    let settings = Settings::default().apply(&env_layer.merge(override_layer));
    settings.validate()?;
    Ok(settings)
}

fn read_override(path: &Path) -> Result<SettingsPatch, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => SettingsPatch::from_toml_str(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SettingsPatch::default()),
        Err(e) => Err(ConfigError::Io(e)),
    }
}

/// Write-then-rename so a crash never leaves a half-written override file.
fn write_override(path: &Path, layer: &SettingsPatch) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = layer.to_toml_string()?;
    let tmp = path.with_extension("toml.tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
