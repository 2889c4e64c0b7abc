use std::env;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RoundtableError};
use crate::llm::{CompletionClient, OpenAIClient};

/// Completion provider settings. Constructed once at process start and
/// passed by reference to whatever needs the completion capability; nothing
/// here is read from ambient global state after construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    /// One of `openai`, `azure`, `stub`.
    pub provider: String,
    /// Model name, or the deployment name for Azure addressing.
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub model: ModelConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig {
                provider: "stub".into(),
                model: "stub-model".into(),
                api_key: None,
                endpoint: None,
                api_version: None,
                stream: false,
            },
        }
    }
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let cfg: Self = toml::from_str(&raw)
            .map_err(|err| RoundtableError::Config(format!("failed to parse configuration: {err}")))?;
        Ok(cfg)
    }

    /// Load from a file when it exists, then apply `ROUNDTABLE_*` env
    /// overrides. A missing file falls back to defaults so the cookbook
    /// demos run out of the box.
    pub fn from_env_or_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut cfg = if path.as_ref().exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        if let Ok(provider) = env::var("ROUNDTABLE_PROVIDER") {
            cfg.model.provider = provider;
        }
        if let Ok(model) = env::var("ROUNDTABLE_MODEL") {
            cfg.model.model = model;
        }
        if let Ok(key) = env::var("ROUNDTABLE_API_KEY") {
            cfg.model.api_key = Some(key);
        }
        if let Ok(endpoint) = env::var("ROUNDTABLE_ENDPOINT") {
            cfg.model.endpoint = Some(endpoint);
        }
        if let Ok(version) = env::var("ROUNDTABLE_API_VERSION") {
            cfg.model.api_version = Some(version);
        }
        if let Ok(stream) = env::var("ROUNDTABLE_STREAMING") {
            if let Ok(parsed) = stream.parse::<bool>() {
                cfg.model.stream = parsed;
            }
        }
        Ok(cfg)
    }
}

/// Build the completion client named by the configuration. The `stub`
/// provider has no client here — demos construct a scripted
/// [`StubClient`](crate::llm::StubClient) directly.
pub fn client_from_config(cfg: &ModelConfig) -> Result<Arc<dyn CompletionClient>> {
    match cfg.provider.as_str() {
        "openai" | "azure" => Ok(Arc::new(OpenAIClient::from_config(cfg)?)),
        other => Err(RoundtableError::Config(format!(
            "unknown completion provider `{other}`"
        ))),
    }
}
