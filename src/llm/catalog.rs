//! Curated model lists shown by the monitoring surface.

use serde::Serialize;

/// A suggested model for one of the LLM providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CatalogModel {
    pub name: &'static str,
    /// Approximate download size; empty for cloud models.
    pub size: &'static str,
    pub description: &'static str,
}

/// Small models that run well on the local daemon.
pub const RECOMMENDED_OLLAMA_MODELS: &[CatalogModel] = &[
    CatalogModel { name: "llama3.2:1b", size: "1.3GB", description: "Fast, general purpose" },
    CatalogModel { name: "llama3.2:3b", size: "2.0GB", description: "Better quality, still fast" },
    CatalogModel { name: "phi3:mini", size: "2.3GB", description: "Microsoft's efficient model" },
    CatalogModel { name: "gemma2:2b", size: "1.6GB", description: "Google's compact model" },
    CatalogModel { name: "qwen2.5:1.5b", size: "1.0GB", description: "Alibaba's efficient model" },
    CatalogModel { name: "tinyllama", size: "637MB", description: "Ultra-lightweight" },
];

pub const OPENAI_MODELS: &[CatalogModel] = &[
    CatalogModel { name: "gpt-4o-mini", size: "", description: "Fast and affordable" },
    CatalogModel { name: "gpt-4o", size: "", description: "Most capable" },
    CatalogModel { name: "gpt-4-turbo", size: "", description: "High performance" },
    CatalogModel { name: "gpt-3.5-turbo", size: "", description: "Legacy, fast" },
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[test]
    fn default_model_is_in_the_cloud_catalog() {
        let default = Settings::default().llm_model;
        assert!(OPENAI_MODELS.iter().any(|m| m.name == default));
    }

    #[test]
    fn catalog_names_are_unique() {
        let mut names: Vec<_> = RECOMMENDED_OLLAMA_MODELS.iter().map(|m| m.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), RECOMMENDED_OLLAMA_MODELS.len());
    }
}
