//! Settings snapshot, partial layers, defaults and validation.
//!
//! [`Settings`] is always fully formed.  Every configuration source (the
//! override file, the environment, a PATCH from the monitoring surface) is
//! expressed as a [`SettingsPatch`], a struct of `Option`s, and applied
//! field by field on top of [`Settings::default`].

use std::str::FromStr;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ConfigError;
use crate::router::IntentKind;

// ---------------------------------------------------------------------------
// Provider enums
// ---------------------------------------------------------------------------

/// Where speech-to-text runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhisperMode {
    /// On-device whisper.cpp model.
    Local,
    /// Remote transcription API.
    Api,
}

/// Which LLM backend answers free-form questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LlmProvider {
    /// OpenAI-compatible cloud API.
    #[serde(rename = "openai", alias = "cloud")]
    OpenAi,
    /// Ollama daemon on the local network.
    #[serde(rename = "ollama", alias = "local-daemon", alias = "local")]
    Ollama,
}

/// Speech synthesis backends, in the order they are usually tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TtsProvider {
    /// Google Translate TTS over HTTP (needs network).
    #[serde(rename = "gtts", alias = "networked")]
    Gtts,
    /// `espeak` / `espeak-ng` command line synthesiser.
    #[serde(rename = "espeak", alias = "offline-a")]
    Espeak,
    /// speech-dispatcher via `spd-say`.
    #[serde(rename = "spd", alias = "offline-b", alias = "pyttsx3")]
    Spd,
}

impl TtsProvider {
    pub fn label(&self) -> &'static str {
        match self {
            TtsProvider::Gtts => "gtts",
            TtsProvider::Espeak => "espeak",
            TtsProvider::Spd => "spd",
        }
    }
}

macro_rules! impl_from_str_via_serde {
    ($($ty:ty),*) => {$(
        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                serde_json::from_value(Value::String(s.trim().to_lowercase()))
                    .map_err(|e| e.to_string())
            }
        }
    )*};
}

impl_from_str_via_serde!(WhisperMode, LlmProvider, TtsProvider);

/// Placeholder shown instead of a non-empty credential.
pub const REDACTED: &str = "********";

/// Whisper model sizes accepted by `whisper_model_size`.
pub const WHISPER_MODEL_SIZES: &[&str] = &["tiny", "base", "small", "medium", "large"];

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// One complete, validated configuration snapshot.
///
/// Snapshots are never mutated after publication; a change produces a new
/// `Settings` value that replaces the old one wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Trigger phrase, stored trimmed and lowercase.
    pub wake_word: String,
    pub whisper_mode: WhisperMode,
    /// One of [`WHISPER_MODEL_SIZES`].
    pub whisper_model_size: String,
    /// ISO-639 code or `"auto"`.
    pub whisper_language: String,
    pub llm_provider: LlmProvider,
    pub llm_model: String,
    /// Base URL of the local Ollama daemon.
    pub ollama_host: String,
    pub audio_input_device: String,
    pub audio_output_device: String,
    /// Fixed command-recording window.
    pub audio_record_seconds: f32,
    /// Length of each rolling window the transcription wake detector listens to.
    pub wake_window_seconds: f32,
    /// Preferred synthesiser; tried first.
    pub tts_provider: TtsProvider,
    /// Order the remaining synthesisers are tried in when the preferred one fails.
    pub tts_fallback_order: Vec<TtsProvider>,
    pub tts_language: String,
    /// Speech rate in words per minute.
    pub tts_speed: u32,
    /// Built-in intent priority; first match wins.
    pub intent_order: Vec<IntentKind>,
    pub openai_api_key: String,
    /// Activation credential for the keyword spotter.  Empty selects the
    /// transcription fallback.
    pub picovoice_access_key: String,
    /// Command template for the keyword spotter process.
    /// `{access_key}`, `{phrase}` and `{device}` are substituted.
    pub keyword_spotter_command: String,
    /// Upper bound on every network provider call.
    pub provider_timeout_seconds: u64,
    /// Stats sampler period.
    pub stats_interval_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            wake_word: "jetson".into(),
            whisper_mode: WhisperMode::Local,
            whisper_model_size: "small".into(),
            whisper_language: "en".into(),
            llm_provider: LlmProvider::OpenAi,
            llm_model: "gpt-4o-mini".into(),
            ollama_host: "http://localhost:11434".into(),
            audio_input_device: "default".into(),
            audio_output_device: "default".into(),
            audio_record_seconds: 4.0,
            wake_window_seconds: 3.0,
            tts_provider: TtsProvider::Gtts,
            tts_fallback_order: vec![TtsProvider::Gtts, TtsProvider::Espeak, TtsProvider::Spd],
            tts_language: "en".into(),
            tts_speed: 150,
            intent_order: IntentKind::DEFAULT_ORDER.to_vec(),
            openai_api_key: String::new(),
            picovoice_access_key: String::new(),
            keyword_spotter_command:
                "porcupine_demo_mic --access_key {access_key} --keywords {phrase}".into(),
            provider_timeout_seconds: 30,
            stats_interval_seconds: 60,
        }
    }
}

impl Settings {
    /// Return a copy of `self` with every field present in `patch` replaced.
    ///
    /// String fields are normalised (trimmed; the wake word is lowercased)
    /// so equal inputs always produce equal snapshots.
    pub fn apply(&self, patch: &SettingsPatch) -> Settings {
        let mut s = self.clone();

        if let Some(v) = &patch.wake_word {
            s.wake_word = v.trim().to_lowercase();
        }
        if let Some(v) = patch.whisper_mode {
            s.whisper_mode = v;
        }
        if let Some(v) = &patch.whisper_model_size {
            s.whisper_model_size = v.trim().to_lowercase();
        }
        if let Some(v) = &patch.whisper_language {
            s.whisper_language = v.trim().to_lowercase();
        }
        if let Some(v) = patch.llm_provider {
            s.llm_provider = v;
        }
        if let Some(v) = &patch.llm_model {
            s.llm_model = v.trim().to_string();
        }
        if let Some(v) = &patch.ollama_host {
            s.ollama_host = v.trim().trim_end_matches('/').to_string();
        }
        if let Some(v) = &patch.audio_input_device {
            s.audio_input_device = v.trim().to_string();
        }
        if let Some(v) = &patch.audio_output_device {
            s.audio_output_device = v.trim().to_string();
        }
        if let Some(v) = patch.audio_record_seconds {
            s.audio_record_seconds = v;
        }
        if let Some(v) = patch.wake_window_seconds {
            s.wake_window_seconds = v;
        }
        if let Some(v) = patch.tts_provider {
            s.tts_provider = v;
        }
        if let Some(v) = &patch.tts_fallback_order {
            s.tts_fallback_order = v.clone();
        }
        if let Some(v) = &patch.tts_language {
            s.tts_language = v.trim().to_string();
        }
        if let Some(v) = patch.tts_speed {
            s.tts_speed = v;
        }
        if let Some(v) = &patch.intent_order {
            s.intent_order = v.clone();
        }
        if let Some(v) = &patch.openai_api_key {
            s.openai_api_key = v.trim().to_string();
        }
        if let Some(v) = &patch.picovoice_access_key {
            s.picovoice_access_key = v.trim().to_string();
        }
        if let Some(v) = &patch.keyword_spotter_command {
            s.keyword_spotter_command = v.trim().to_string();
        }
        if let Some(v) = patch.provider_timeout_seconds {
            s.provider_timeout_seconds = v;
        }
        if let Some(v) = patch.stats_interval_seconds {
            s.stats_interval_seconds = v;
        }

        s
    }

    /// Check every field; the first violation is returned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wake_word.is_empty() {
            return Err(ConfigError::invalid("wake_word", "must not be empty"));
        }
        if !WHISPER_MODEL_SIZES.contains(&self.whisper_model_size.as_str()) {
            return Err(ConfigError::invalid(
                "whisper_model_size",
                format!(
                    "unknown size `{}` (expected one of {})",
                    self.whisper_model_size,
                    WHISPER_MODEL_SIZES.join(", ")
                ),
            ));
        }
        let lang = self.whisper_language.as_str();
        let lang_ok = lang == "auto"
            || ((2..=3).contains(&lang.len()) && lang.chars().all(|c| c.is_ascii_lowercase()));
        if !lang_ok {
            return Err(ConfigError::invalid(
                "whisper_language",
                format!("`{lang}` is not a language code"),
            ));
        }
        if self.llm_model.is_empty() {
            return Err(ConfigError::invalid("llm_model", "must not be empty"));
        }
        if !(self.ollama_host.starts_with("http://") || self.ollama_host.starts_with("https://")) {
            return Err(ConfigError::invalid(
                "ollama_host",
                "must be an http:// or https:// URL",
            ));
        }
        if self.audio_input_device.is_empty() {
            return Err(ConfigError::invalid("audio_input_device", "must not be empty"));
        }
        if self.audio_output_device.is_empty() {
            return Err(ConfigError::invalid("audio_output_device", "must not be empty"));
        }
        check_seconds("audio_record_seconds", self.audio_record_seconds, 30.0)?;
        check_seconds("wake_window_seconds", self.wake_window_seconds, 10.0)?;
        check_unique_non_empty("tts_fallback_order", &self.tts_fallback_order)?;
        if self.tts_language.is_empty() {
            return Err(ConfigError::invalid("tts_language", "must not be empty"));
        }
        if self.tts_speed == 0 || self.tts_speed > 500 {
            return Err(ConfigError::invalid(
                "tts_speed",
                format!("{} words/minute is outside 1..=500", self.tts_speed),
            ));
        }
        check_unique_non_empty("intent_order", &self.intent_order)?;
        if self.keyword_spotter_command.is_empty() {
            return Err(ConfigError::invalid("keyword_spotter_command", "must not be empty"));
        }
        if self.provider_timeout_seconds == 0 {
            return Err(ConfigError::invalid("provider_timeout_seconds", "must be > 0"));
        }
        if self.stats_interval_seconds == 0 {
            return Err(ConfigError::invalid("stats_interval_seconds", "must be > 0"));
        }
        Ok(())
    }

    pub fn record_window(&self) -> Duration {
        Duration::from_secs_f32(self.audio_record_seconds)
    }

    pub fn wake_window(&self) -> Duration {
        Duration::from_secs_f32(self.wake_window_seconds)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_seconds)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_seconds)
    }

    /// The speaker chain for this snapshot: the preferred provider first,
    /// then the rest of `tts_fallback_order` without duplicates.
    pub fn tts_chain(&self) -> Vec<TtsProvider> {
        let mut chain = vec![self.tts_provider];
        for p in &self.tts_fallback_order {
            if !chain.contains(p) {
                chain.push(*p);
            }
        }
        chain
    }

    /// JSON view for the monitoring surface with credentials blanked.
    pub fn redacted_json(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            for key in ["openai_api_key", "picovoice_access_key"] {
                if let Some(Value::String(secret)) = map.get_mut(key) {
                    if !secret.is_empty() {
                        *secret = REDACTED.into();
                    }
                }
            }
        }
        value
    }
}

fn check_seconds(field: &str, value: f32, max: f32) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::invalid(field, format!("{value} must be > 0")));
    }
    if value > max {
        return Err(ConfigError::invalid(field, format!("{value} exceeds {max} s")));
    }
    Ok(())
}

fn check_unique_non_empty<T: PartialEq + std::fmt::Debug>(
    field: &str,
    items: &[T],
) -> Result<(), ConfigError> {
    if items.is_empty() {
        return Err(ConfigError::invalid(field, "must list at least one entry"));
    }
    for (i, item) in items.iter().enumerate() {
        if items[..i].contains(item) {
            return Err(ConfigError::invalid(field, format!("{item:?} listed twice")));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// SettingsPatch
// ---------------------------------------------------------------------------

/// A partial set of settings fields.
///
/// Used for the override file, the environment layer and PATCH requests.
/// Absent fields (`None`) leave the lower layer's value in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wake_word: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whisper_mode: Option<WhisperMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whisper_model_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whisper_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_provider: Option<LlmProvider>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ollama_host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_input_device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_output_device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_record_seconds: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wake_window_seconds: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts_provider: Option<TtsProvider>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts_fallback_order: Option<Vec<TtsProvider>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts_speed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent_order: Option<Vec<IntentKind>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picovoice_access_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_spotter_command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_timeout_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats_interval_seconds: Option<u64>,
}

/// Environment variable → settings field.
const ENV_FIELDS: &[(&str, &str)] = &[
    ("WAKE_WORD", "wake_word"),
    ("WHISPER_MODE", "whisper_mode"),
    ("WHISPER_MODEL_SIZE", "whisper_model_size"),
    ("WHISPER_LANGUAGE", "whisper_language"),
    ("LLM_PROVIDER", "llm_provider"),
    ("LLM_MODEL", "llm_model"),
    ("OLLAMA_HOST", "ollama_host"),
    ("AUDIO_INPUT_DEVICE", "audio_input_device"),
    ("AUDIO_OUTPUT_DEVICE", "audio_output_device"),
    ("AUDIO_RECORD_SECONDS", "audio_record_seconds"),
    ("TTS_PROVIDER", "tts_provider"),
    ("TTS_LANGUAGE", "tts_language"),
    ("TTS_SPEED", "tts_speed"),
    ("OPENAI_API_KEY", "openai_api_key"),
    ("PICOVOICE_ACCESS_KEY", "picovoice_access_key"),
];

const NUMERIC_FIELDS: &[&str] = &[
    "audio_record_seconds",
    "wake_window_seconds",
    "tts_speed",
    "provider_timeout_seconds",
    "stats_interval_seconds",
];

const ENUM_FIELDS: &[&str] = &["whisper_mode", "llm_provider", "tts_provider"];

impl SettingsPatch {
    /// `true` when no field is set.
    pub fn is_empty(&self) -> bool {
        *self == SettingsPatch::default()
    }

    /// Overlay `other` on top of `self`; fields set in `other` win.
    pub fn merge(&self, other: &SettingsPatch) -> SettingsPatch {
        SettingsPatch {
            wake_word: other.wake_word.clone().or_else(|| self.wake_word.clone()),
            whisper_mode: other.whisper_mode.or(self.whisper_mode),
            whisper_model_size: other
                .whisper_model_size
                .clone()
                .or_else(|| self.whisper_model_size.clone()),
            whisper_language: other
                .whisper_language
                .clone()
                .or_else(|| self.whisper_language.clone()),
            llm_provider: other.llm_provider.or(self.llm_provider),
            llm_model: other.llm_model.clone().or_else(|| self.llm_model.clone()),
            ollama_host: other.ollama_host.clone().or_else(|| self.ollama_host.clone()),
            audio_input_device: other
                .audio_input_device
                .clone()
                .or_else(|| self.audio_input_device.clone()),
            audio_output_device: other
                .audio_output_device
                .clone()
                .or_else(|| self.audio_output_device.clone()),
            audio_record_seconds: other.audio_record_seconds.or(self.audio_record_seconds),
            wake_window_seconds: other.wake_window_seconds.or(self.wake_window_seconds),
            tts_provider: other.tts_provider.or(self.tts_provider),
            tts_fallback_order: other
                .tts_fallback_order
                .clone()
                .or_else(|| self.tts_fallback_order.clone()),
            tts_language: other.tts_language.clone().or_else(|| self.tts_language.clone()),
            tts_speed: other.tts_speed.or(self.tts_speed),
            intent_order: other.intent_order.clone().or_else(|| self.intent_order.clone()),
            openai_api_key: other
                .openai_api_key
                .clone()
                .or_else(|| self.openai_api_key.clone()),
            picovoice_access_key: other
                .picovoice_access_key
                .clone()
                .or_else(|| self.picovoice_access_key.clone()),
            keyword_spotter_command: other
                .keyword_spotter_command
                .clone()
                .or_else(|| self.keyword_spotter_command.clone()),
            provider_timeout_seconds: other
                .provider_timeout_seconds
                .or(self.provider_timeout_seconds),
            stats_interval_seconds: other.stats_interval_seconds.or(self.stats_interval_seconds),
        }
    }

    /// Build a patch from a JSON object, reporting the offending field on
    /// any type or name error.
    ///
    /// `null` values are ignored, matching how hand-edited documents often
    /// blank a field to mean "use the default".
    pub fn from_json_map(map: &Map<String, Value>) -> Result<SettingsPatch, ConfigError> {
        let mut patch = SettingsPatch::default();

        for (key, value) in map {
            if value.is_null() {
                continue;
            }
            let value = normalise_value(key, value);
            match key.as_str() {
                "wake_word" => patch.wake_word = Some(field(key, value)?),
                "whisper_mode" => patch.whisper_mode = Some(field(key, value)?),
                "whisper_model_size" => patch.whisper_model_size = Some(field(key, value)?),
                "whisper_language" => patch.whisper_language = Some(field(key, value)?),
                "llm_provider" => patch.llm_provider = Some(field(key, value)?),
                "llm_model" => patch.llm_model = Some(field(key, value)?),
                "ollama_host" => patch.ollama_host = Some(field(key, value)?),
                "audio_input_device" => patch.audio_input_device = Some(field(key, value)?),
                "audio_output_device" => patch.audio_output_device = Some(field(key, value)?),
                "audio_record_seconds" => patch.audio_record_seconds = Some(field(key, value)?),
                "wake_window_seconds" => patch.wake_window_seconds = Some(field(key, value)?),
                "tts_provider" => patch.tts_provider = Some(field(key, value)?),
                "tts_fallback_order" => patch.tts_fallback_order = Some(field(key, value)?),
                "tts_language" => patch.tts_language = Some(field(key, value)?),
                "tts_speed" => patch.tts_speed = Some(field(key, value)?),
                "intent_order" => patch.intent_order = Some(field(key, value)?),
                "openai_api_key" => patch.openai_api_key = Some(field(key, value)?),
                "picovoice_access_key" => patch.picovoice_access_key = Some(field(key, value)?),
                "keyword_spotter_command" => {
                    patch.keyword_spotter_command = Some(field(key, value)?)
                }
                "provider_timeout_seconds" => {
                    patch.provider_timeout_seconds = Some(field(key, value)?)
                }
                "stats_interval_seconds" => {
                    patch.stats_interval_seconds = Some(field(key, value)?)
                }
                other => return Err(ConfigError::invalid(other, "unknown setting")),
            }
        }

        Ok(patch)
    }

    /// Parse a TOML override document.
    pub fn from_toml_str(content: &str) -> Result<SettingsPatch, ConfigError> {
        let table: toml::Table =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let value = serde_json::to_value(table).map_err(|e| ConfigError::Parse(e.to_string()))?;
        match value {
            Value::Object(map) => Self::from_json_map(&map),
            _ => Err(ConfigError::Parse("top level must be a table".into())),
        }
    }

    /// Render this patch as a TOML document, omitting unset fields.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Build the environment layer from `(name, value)` pairs.
    ///
    /// Unknown variables are ignored; empty values count as unset.
    pub fn from_env_vars<I, K, V>(vars: I) -> Result<SettingsPatch, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut map = Map::new();

        for (name, raw) in vars {
            let raw = raw.as_ref().trim();
            if raw.is_empty() {
                continue;
            }
            let Some((_, key)) = ENV_FIELDS.iter().find(|(var, _)| *var == name.as_ref()) else {
                continue;
            };
            let value = if NUMERIC_FIELDS.contains(key) {
                let n: f64 = raw.parse().map_err(|_| {
                    ConfigError::invalid(*key, format!("`{raw}` from {} is not a number", name.as_ref()))
                })?;
                serde_json::Number::from_f64(n)
                    .map(Value::Number)
                    .ok_or_else(|| ConfigError::invalid(*key, "not a finite number"))?
            } else {
                Value::String(raw.to_string())
            };
            map.insert((*key).to_string(), value);
        }

        Self::from_json_map(&map)
    }

    /// Environment layer read from the running process.
    pub fn from_process_env() -> Result<SettingsPatch, ConfigError> {
        Self::from_env_vars(std::env::vars())
    }
}

const INTEGER_FIELDS: &[&str] = &["tts_speed", "provider_timeout_seconds", "stats_interval_seconds"];

fn normalise_value(key: &str, value: &Value) -> Value {
    match value {
        Value::String(s) if ENUM_FIELDS.contains(&key) => Value::String(s.trim().to_lowercase()),
        // `150.0` from a float-only source (the env layer) still means 150.
        Value::Number(n) if INTEGER_FIELDS.contains(&key) && !n.is_u64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f >= 0.0 => Value::from(f as u64),
            _ => value.clone(),
        },
        _ => value.clone(),
    }
}

fn field<T: DeserializeOwned>(name: &str, value: Value) -> Result<T, ConfigError> {
    serde_json::from_value(value).map_err(|e| ConfigError::invalid(name, e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patch(value: Value) -> Result<SettingsPatch, ConfigError> {
        match value {
            Value::Object(map) => SettingsPatch::from_json_map(&map),
            _ => panic!("test patch must be an object"),
        }
    }

    #[test]
    fn defaults_are_valid() {
        Settings::default().validate().expect("defaults must validate");
    }

    #[test]
    fn default_values() {
        let s = Settings::default();
        assert_eq!(s.wake_word, "jetson");
        assert_eq!(s.whisper_mode, WhisperMode::Local);
        assert_eq!(s.whisper_model_size, "small");
        assert_eq!(s.llm_provider, LlmProvider::OpenAi);
        assert_eq!(s.llm_model, "gpt-4o-mini");
        assert_eq!(s.ollama_host, "http://localhost:11434");
        assert_eq!(s.tts_provider, TtsProvider::Gtts);
        assert_eq!(s.tts_speed, 150);
        assert!((s.audio_record_seconds - 4.0).abs() < f32::EPSILON);
    }

    #[test]
    fn apply_normalises_wake_word() {
        let p = SettingsPatch {
            wake_word: Some("  Hey Apple ".into()),
            ..Default::default()
        };
        assert_eq!(Settings::default().apply(&p).wake_word, "hey apple");
    }

    #[test]
    fn apply_only_touches_present_fields() {
        let base = Settings::default();
        let p = SettingsPatch {
            tts_speed: Some(180),
            ..Default::default()
        };
        let out = base.apply(&p);
        assert_eq!(out.tts_speed, 180);
        assert_eq!(Settings { tts_speed: 150, ..out }, base);
    }

    #[test]
    fn zero_recording_duration_is_invalid() {
        let s = Settings {
            audio_record_seconds: 0.0,
            ..Settings::default()
        };
        match s.validate() {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, "audio_record_seconds"),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn unknown_model_size_is_invalid() {
        let s = Settings {
            whisper_model_size: "huge".into(),
            ..Settings::default()
        };
        assert!(matches!(s.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn duplicate_fallback_entries_are_invalid() {
        let s = Settings {
            tts_fallback_order: vec![TtsProvider::Espeak, TtsProvider::Espeak],
            ..Settings::default()
        };
        assert!(matches!(s.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn unknown_provider_name_reports_field() {
        match patch(json!({ "llm_provider": "skynet" })) {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, "llm_provider"),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn unknown_key_is_rejected() {
        match patch(json!({ "wake_wrod": "x" })) {
            Err(ConfigError::Invalid { field, reason }) => {
                assert_eq!(field, "wake_wrod");
                assert!(reason.contains("unknown"));
            }
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn provider_aliases_are_accepted() {
        let p = patch(json!({
            "llm_provider": "Local-Daemon",
            "tts_provider": "offline-a",
            "whisper_mode": "API",
        }))
        .unwrap();
        assert_eq!(p.llm_provider, Some(LlmProvider::Ollama));
        assert_eq!(p.tts_provider, Some(TtsProvider::Espeak));
        assert_eq!(p.whisper_mode, Some(WhisperMode::Api));
    }

    #[test]
    fn null_values_are_ignored() {
        let p = patch(json!({ "wake_word": null, "tts_speed": 120 })).unwrap();
        assert!(p.wake_word.is_none());
        assert_eq!(p.tts_speed, Some(120));
    }

    #[test]
    fn merge_prefers_the_overlay() {
        let lower = SettingsPatch {
            wake_word: Some("alpha".into()),
            tts_speed: Some(100),
            ..Default::default()
        };
        let upper = SettingsPatch {
            wake_word: Some("bravo".into()),
            ..Default::default()
        };
        let merged = lower.merge(&upper);
        assert_eq!(merged.wake_word.as_deref(), Some("bravo"));
        assert_eq!(merged.tts_speed, Some(100));
    }

    #[test]
    fn env_layer_parses_numbers_and_ignores_unknown_vars() {
        let p = SettingsPatch::from_env_vars([
            ("WAKE_WORD", "computer"),
            ("AUDIO_RECORD_SECONDS", "5.5"),
            ("TTS_SPEED", "170"),
            ("HOME", "/root"),
            ("LLM_MODEL", ""),
        ])
        .unwrap();
        assert_eq!(p.wake_word.as_deref(), Some("computer"));
        assert_eq!(p.audio_record_seconds, Some(5.5));
        assert_eq!(p.tts_speed, Some(170));
        assert!(p.llm_model.is_none());
    }

    #[test]
    fn env_layer_rejects_non_numeric_duration() {
        let err = SettingsPatch::from_env_vars([("AUDIO_RECORD_SECONDS", "four")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "audio_record_seconds"));
    }

    #[test]
    fn toml_round_trip_keeps_only_set_fields() {
        let p = SettingsPatch {
            wake_word: Some("apple".into()),
            tts_fallback_order: Some(vec![TtsProvider::Spd, TtsProvider::Espeak]),
            ..Default::default()
        };
        let text = p.to_toml_string().unwrap();
        assert!(text.contains("wake_word"));
        assert!(!text.contains("llm_model"));
        assert_eq!(SettingsPatch::from_toml_str(&text).unwrap(), p);
    }

    #[test]
    fn tts_chain_puts_preferred_first_without_duplicates() {
        let s = Settings {
            tts_provider: TtsProvider::Espeak,
            ..Settings::default()
        };
        assert_eq!(
            s.tts_chain(),
            vec![TtsProvider::Espeak, TtsProvider::Gtts, TtsProvider::Spd]
        );
    }

    #[test]
    fn redacted_json_hides_credentials() {
        let s = Settings {
            openai_api_key: "sk-secret".into(),
            ..Settings::default()
        };
        let v = s.redacted_json();
        assert_eq!(v["openai_api_key"], "********");
        assert_eq!(v["picovoice_access_key"], "");
        assert_eq!(v["wake_word"], "jetson");
    }
}
