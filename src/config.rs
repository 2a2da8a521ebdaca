//! Configuration file support for wildcrafter
//!
//! Reads an optional JSON object (default `web/config.json`) with prompt and
//! model defaults. API keys never live in this file; they come from the
//! environment or the command line.

use crate::llm::{ApiKeys, ModelConfig, ProviderSettings, DEFAULT_GEMINI_MODEL, DEFAULT_OPENROUTER_MODEL};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "web/config.json";
pub const DEFAULT_DATA_PATH: &str = "web/data/initial-data.yaml";
pub const DEFAULT_SUGGEST_PROMPT: &str = "Suggest creative categories...";

/// Environment variables holding API keys
pub const GEMINI_KEY_ENV: &str = "GEMINI_API_KEY";
pub const OPENROUTER_KEY_ENV: &str = "OPENROUTER_API_KEY";
pub const CUSTOM_KEY_ENV: &str = "CUSTOM_API_KEY";

/// Configuration structure
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    /// System prompt sent with every generation request
    #[serde(rename = "DEFAULT_SYSTEM_PROMPT", default)]
    pub system_prompt: Option<String>,

    /// Suggestion prompt; `{parentPath}` is replaced by the readable path
    #[serde(rename = "DEFAULT_SUGGEST_ITEM_PROMPT", default)]
    pub suggest_prompt: Option<String>,

    #[serde(rename = "MODEL_NAME_GEMINI", default)]
    pub gemini_model: Option<String>,

    #[serde(rename = "MODEL_NAME_OPENROUTER", default)]
    pub openrouter_model: Option<String>,

    #[serde(rename = "MODEL_NAME_CUSTOM", default)]
    pub custom_model: Option<String>,

    /// Base URL of an OpenAI-compatible endpoint
    #[serde(rename = "API_URL_CUSTOM", default)]
    pub custom_url: Option<String>,
}

impl Config {
    /// Load config from `path`.
    /// Returns the default config if the file is missing or unreadable.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            info!(path = %path.display(), "no config file, using defaults");
            return Self::default();
        }
        match std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|content| serde_json::from_str(&content).map_err(|e| e.to_string()))
        {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable config");
                Self::default()
            }
        }
    }

    pub fn system_prompt(&self) -> String {
        self.system_prompt.clone().unwrap_or_default()
    }

    pub fn suggest_prompt(&self) -> String {
        self.suggest_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SUGGEST_PROMPT.to_string())
    }

    /// Model names and custom URL, falling back to the built-in defaults
    pub fn models(&self) -> ModelConfig {
        ModelConfig {
            gemini: self
                .gemini_model
                .clone()
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            openrouter: self
                .openrouter_model
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENROUTER_MODEL.to_string()),
            custom: self.custom_model.clone().unwrap_or_default(),
            custom_url: self.custom_url.clone().unwrap_or_default(),
        }
    }

    /// Provider settings with keys read from the environment
    pub fn provider_settings(&self) -> ProviderSettings {
        ProviderSettings {
            api_keys: api_keys_from_env(),
            models: self.models(),
        }
    }
}

/// Read API keys from `GEMINI_API_KEY`, `OPENROUTER_API_KEY` and
/// `CUSTOM_API_KEY`
pub fn api_keys_from_env() -> ApiKeys {
    let read = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
    ApiKeys {
        gemini: read(GEMINI_KEY_ENV),
        openrouter: read(OPENROUTER_KEY_ENV),
        custom: read(CUSTOM_KEY_ENV),
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

pub fn default_data_path() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_PATH)
}
