//! Configuration module for the voice assistant.
//!
//! Provides [`Settings`] (the immutable snapshot every cycle runs against),
//! [`SettingsPatch`] (a partial field set used for every layer), the
//! [`ConfigStore`] that merges the layers and publishes snapshots, the
//! [`ConfigWatcher`] that turns file changes into reloads, and [`AppPaths`]
//! for the on-disk layout.
//!
//! Layer precedence, highest first, applied per field:
//!
//! ```text
//! settings.toml (override)  >  process environment  >  built-in defaults
//! ```

pub mod paths;
pub mod settings;
pub mod store;
pub mod watch;

use thiserror::Error;

pub use paths::AppPaths;
pub use settings::{LlmProvider, Settings, SettingsPatch, TtsProvider, WhisperMode, REDACTED};
pub use store::ConfigStore;
pub use watch::ConfigWatcher;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors raised while loading, validating or persisting settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field value failed validation.  The previous snapshot stays active.
    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: String, reason: String },

    /// The override document could not be read or written.
    #[error("settings I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The override document is not valid TOML.
    #[error("settings file is not valid TOML: {0}")]
    Parse(String),

    /// No valid snapshot could be produced at all.
    #[error("no valid settings snapshot: {0}")]
    Corrupt(String),
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
