//! Recorder settings
//!
//! Read from `<config dir>/autotest-recorder/settings.json` (camelCase keys,
//! every key optional). `AUTOTEST_LICENSE_KEY` overrides the license key.

use crate::codegen::{LocatorSettings, LocatorStrategy, DEFAULT_CODEGEN_URL};
use crate::error::{RecorderError, Result};
use crate::llm::{ClaudeCli, Disabled, LanguageModel, LlmBackend, OllamaClient};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const LICENSE_KEY_ENV: &str = "AUTOTEST_LICENSE_KEY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderConfig {
    /// Ask a language model for step names and CSS selectors
    pub use_llm: bool,
    pub llm_backend: LlmBackend,
    pub ollama_url: String,
    pub llm_model: String,

    /// `data-*` attribute used for test-id locators
    pub custom_test_id: String,
    pub locator_strategy: LocatorStrategy,
    pub exclude_xpath: bool,

    pub license_key: String,
    pub codegen_url: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            use_llm: false,
            llm_backend: LlmBackend::Ollama,
            ollama_url: "http://localhost:11434".to_string(),
            llm_model: "llama3".to_string(),
            custom_test_id: "data-testid".to_string(),
            locator_strategy: LocatorStrategy::Smart,
            exclude_xpath: false,
            license_key: String::new(),
            codegen_url: DEFAULT_CODEGEN_URL.to_string(),
        }
    }
}

impl RecorderConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("autotest-recorder").join("settings.json"))
    }

    /// Load settings from `path`; a missing file gives the defaults
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                RecorderError::Other(format!("Invalid settings file {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No settings file at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => return Err(e.into()),
        };
        config.apply_env();
        Ok(config)
    }

    /// Settings from the default location, or defaults
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => {
                let mut config = Self::default();
                config.apply_env();
                Ok(config)
            }
        }
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(LICENSE_KEY_ENV) {
            if !key.trim().is_empty() {
                self.license_key = key.trim().to_string();
            }
        }
    }

    /// Language model selected by `useLlm` and `llmBackend`
    pub fn language_model(&self) -> Arc<dyn LanguageModel> {
        if !self.use_llm {
            return Arc::new(Disabled);
        }
        match self.llm_backend {
            LlmBackend::Ollama => Arc::new(OllamaClient::new(&self.ollama_url, &self.llm_model)),
            LlmBackend::ClaudeCli => Arc::new(ClaudeCli::new().with_model(self.llm_model.clone())),
        }
    }

    pub fn locator_settings(&self) -> LocatorSettings {
        LocatorSettings {
            custom_test_id: self.custom_test_id.clone(),
            strategy: self.locator_strategy,
            exclude_xpath: self.exclude_xpath,
            use_llm: self.use_llm,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"useLlm": true, "llmBackend": "claude-cli", "locatorStrategy": "xpath"}"#,
        )
        .unwrap();

        let config = RecorderConfig::load(&path).unwrap();
        assert!(config.use_llm);
        assert_eq!(config.llm_backend, LlmBackend::ClaudeCli);
        assert_eq!(config.locator_strategy, LocatorStrategy::Xpath);
        assert_eq!(config.ollama_url, "http://localhost:11434");
        assert_eq!(config.custom_test_id, "data-testid");

        let locators = config.locator_settings();
        assert!(locators.use_llm);
        assert_eq!(locators.strategy, LocatorStrategy::Xpath);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RecorderConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.llm_model, "llama3");
        assert_eq!(config.codegen_url, "http://127.0.0.1:8000");
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"useLlm": "sometimes"}"#).unwrap();
        assert!(RecorderConfig::load(&path).is_err());
    }
}
