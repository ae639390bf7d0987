//! Whisper GGML model registry and path resolution.
//!
//! `whisper_model_size` in settings names one of [`WHISPER_MODELS`];
//! [`ModelPaths`] maps it to a file under the models directory.

use std::path::PathBuf;

use crate::config::AppPaths;

// ---------------------------------------------------------------------------
// ModelInfo
// ---------------------------------------------------------------------------

/// Static metadata for one GGML model file.
#[derive(Debug)]
pub struct ModelInfo {
    /// Settings value selecting this model (`"small"`, ...).
    pub size: &'static str,
    pub file_name: &'static str,
    pub file_size_mb: u64,
    /// Rough resident memory while transcribing.
    pub ram_required_mb: u64,
    pub download_url: &'static str,
}

/// Standard multilingual Whisper models.
pub const WHISPER_MODELS: &[ModelInfo] = &[
    ModelInfo {
        size: "tiny",
        file_name: "ggml-tiny.bin",
        file_size_mb: 75,
        ram_required_mb: 390,
        download_url: "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-tiny.bin",
    },
    ModelInfo {
        size: "base",
        file_name: "ggml-base.bin",
        file_size_mb: 142,
        ram_required_mb: 500,
        download_url: "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-base.bin",
    },
    ModelInfo {
        size: "small",
        file_name: "ggml-small.bin",
        file_size_mb: 466,
        ram_required_mb: 1_000,
        download_url: "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-small.bin",
    },
    ModelInfo {
        size: "medium",
        file_name: "ggml-medium.bin",
        file_size_mb: 1_500,
        ram_required_mb: 2_600,
        download_url: "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-medium.bin",
    },
    ModelInfo {
        size: "large",
        file_name: "ggml-large-v3.bin",
        file_size_mb: 2_900,
        ram_required_mb: 4_700,
        download_url: "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-large-v3.bin",
    },
];

/// Look up a model by its settings value.
pub fn find_model(size: &str) -> Option<&'static ModelInfo> {
    WHISPER_MODELS.iter().find(|m| m.size == size)
}

// ---------------------------------------------------------------------------
// ModelPaths
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub models_dir: PathBuf,
}

impl ModelPaths {
    pub fn from_app_paths(app_paths: &AppPaths) -> Self {
        Self::new(app_paths.models_dir.clone())
    }

    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
        }
    }

    pub fn model_path(&self, model: &ModelInfo) -> PathBuf {
        self.models_dir.join(model.file_name)
    }

    pub fn is_available(&self, model: &ModelInfo) -> bool {
        self.model_path(model).exists()
    }

    /// Models present on disk.
    pub fn list_local_models(&self) -> Vec<&'static ModelInfo> {
        WHISPER_MODELS
            .iter()
            .filter(|m| self.is_available(m))
            .collect()
    }
}
