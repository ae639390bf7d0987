//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (override settings, history log, reload signal):
//!   macOS:   ~/Library/Application Support/voice-assistant/
//!   Linux:   ~/.config/voice-assistant/
//!
//! Data dir (models):
//!   macOS:   ~/Library/Application Support/voice-assistant/
//!   Linux:   ~/.local/share/voice-assistant/
//!
//! Setting `VOICE_ASSISTANT_HOME` collapses both into one directory, which
//! is how appliance installs keep everything under `/opt/...`.

use std::path::{Path, PathBuf};

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`, `history.json`, `status.json` and
    /// `.reload_signal`.
    pub config_dir: PathBuf,
    /// Full path to the override layer, `settings.toml`.
    pub settings_file: PathBuf,
    /// Full path to the query/stats log, `history.json`.
    pub history_file: PathBuf,
    /// Touching this file asks a running assistant to reload its settings.
    pub reload_signal_file: PathBuf,
    /// Latest assistant state and mute flag, rewritten as they change.
    pub status_file: PathBuf,
    /// Directory for downloaded GGML model files.
    pub models_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "voice-assistant";
    const HOME_VAR: &'static str = "VOICE_ASSISTANT_HOME";

    /// Resolves all paths, honouring `VOICE_ASSISTANT_HOME` when set.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        if let Some(home) = std::env::var_os(Self::HOME_VAR).filter(|v| !v.is_empty()) {
            return Self::rooted_at(home);
        }

        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        Self::from_dirs(config_dir, data_dir.join("models"))
    }

    /// Everything under a single root: `<root>/config` and `<root>/models`.
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self::from_dirs(root.join("config"), root.join("models"))
    }

    fn from_dirs(config_dir: PathBuf, models_dir: PathBuf) -> Self {
        Self {
            settings_file: config_dir.join("settings.toml"),
            history_file: config_dir.join("history.json"),
            reload_signal_file: config_dir.join(".reload_signal"),
            status_file: config_dir.join("status.json"),
            config_dir,
            models_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_non_empty() {
        let paths = AppPaths::new();
        assert!(paths.config_dir.to_str().is_some_and(|s| !s.is_empty()));
        assert!(paths.models_dir.to_str().is_some_and(|s| !s.is_empty()));
        assert!(paths
            .settings_file
            .file_name()
            .is_some_and(|n| n == "settings.toml"));
        assert!(paths
            .history_file
            .file_name()
            .is_some_and(|n| n == "history.json"));
    }

    #[test]
    fn rooted_layout_keeps_files_inside_root() {
        let paths = AppPaths::rooted_at("/opt/assistant");
        assert_eq!(paths.config_dir, PathBuf::from("/opt/assistant/config"));
        assert_eq!(paths.models_dir, PathBuf::from("/opt/assistant/models"));
        assert!(paths.reload_signal_file.starts_with(&paths.config_dir));
        assert_eq!(paths.status_file, paths.config_dir.join("status.json"));
    }
}
