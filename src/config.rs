//! Configuration management for the model resolver

use crate::error::{ModelResolverError, Result};
use crate::model::{ModelId, Provider};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub llm: LlmConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// The `[llm]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model name, with or without a provider prefix
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_model: Option<String>,
    #[serde(default)]
    pub auto_pull: bool,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default = "default_color")]
    pub color: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Console,
    Json,
}

impl FromStr for OutputFormat {
    type Err = ModelResolverError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "console" => Ok(OutputFormat::Console),
            "json" => Ok(OutputFormat::Json),
            _ => Err(ModelResolverError::InvalidInput(format!(
                "Invalid output format: {}. Supported: console, json",
                s
            ))),
        }
    }
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_color() -> bool {
    true
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: Provider::Ollama.default_model().to_string(),
            provider: Some(Provider::Ollama),
            base_url: None,
            api_key: None,
            fallback_model: None,
            auto_pull: false,
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Console,
            color: default_color(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse::<T>().map_err(|_| {
        ModelResolverError::Configuration(format!("Invalid value for {}: '{}'", key, value))
    })
}

impl Config {
    /// Load from the default location, writing defaults on first use
    pub fn load() -> Result<Self> {
        Self::load_or_create(&Self::config_path())
    }

    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from(path)
        } else {
            info!("No configuration at {}, writing defaults", path.display());
            let config = Self::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Load an existing file; a missing file is an error.
    ///
    /// The result is not validated, so a broken `[llm]` table can still be
    /// repaired through [`Config::set`].
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ModelResolverError::Configuration(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
        debug!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
            .join("model-resolver")
            .join("config.toml")
    }

    /// Configured model with its provider prefix applied exactly once
    pub fn model_id(&self) -> Result<ModelId> {
        ModelId::parse(&self.llm.model, self.llm.provider)
    }

    pub fn provider(&self) -> Result<Provider> {
        Ok(self.model_id()?.provider)
    }

    pub fn base_url(&self, provider: Provider) -> String {
        self.llm
            .base_url
            .clone()
            .unwrap_or_else(|| provider.default_base_url().to_string())
    }

    /// Configured key, else the provider's environment variable
    pub fn api_key(&self, provider: Provider) -> Option<String> {
        self.llm
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| provider.api_key_env().and_then(|var| std::env::var(var).ok()))
    }

    /// Configured fallback, else the provider's built-in default
    pub fn fallback_model(&self, provider: Provider) -> String {
        self.llm
            .fallback_model
            .clone()
            .unwrap_or_else(|| provider.default_model().to_string())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        let model = self.model_id()?;
        if let Some(fallback) = &self.llm.fallback_model {
            model.with_name(fallback.as_str())?;
        }
        if self.llm.max_tokens == 0 {
            return Err(ModelResolverError::Configuration(
                "llm.max_tokens must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ModelResolverError::Configuration(format!(
                "llm.temperature must be between 0.0 and 2.0, got {}",
                self.llm.temperature
            )));
        }
        if self.llm.timeout_secs == 0 {
            return Err(ModelResolverError::Configuration(
                "llm.timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Set one key in the file at `path` and save it.
    ///
    /// A missing or unparseable file is replaced by defaults with the key
    /// applied, so a broken file can be repaired with the tool itself.
    pub fn set_in_file(path: &Path, key: &str, value: &str) -> Result<Self> {
        let mut config = match Self::load_from(path) {
            Ok(config) => config,
            Err(ModelResolverError::Configuration(reason)) => {
                warn!("{}; starting from defaults", reason);
                Self::default()
            }
            Err(e) => return Err(e),
        };
        config.set(key, value)?;
        config.save_to(path)?;
        Ok(config)
    }

    /// Apply per-invocation `--model` / `--provider` overrides.
    ///
    /// A model override that carries its own provider prefix replaces the
    /// file's provider unless a provider override is given too.
    pub fn with_overrides(&self, model: Option<&str>, provider: Option<&str>) -> Result<Self> {
        let mut config = self.clone();
        if let Some(model) = model {
            if provider.is_none() && ModelId::parse(model, None).is_ok() {
                config.llm.provider = None;
            }
            config.llm.model = model.to_string();
        }
        if let Some(provider) = provider {
            config.llm.provider = Some(provider.parse()?);
        }
        config.validate()?;
        Ok(config)
    }

    /// Set a dotted key such as `llm.model`; the config is left unchanged on error
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut updated = self.clone();
        match key {
            "llm.model" => {
                updated.llm.model = ModelId::parse(value, updated.llm.provider)?.qualified();
            }
            "llm.provider" => {
                updated.llm.provider = match non_empty(value) {
                    Some(tag) => Some(tag.parse()?),
                    None => None,
                };
            }
            "llm.base_url" => updated.llm.base_url = non_empty(value),
            "llm.api_key" => updated.llm.api_key = non_empty(value),
            "llm.fallback_model" => updated.llm.fallback_model = non_empty(value),
            "llm.auto_pull" => updated.llm.auto_pull = parse_value(key, value)?,
            "llm.max_tokens" => updated.llm.max_tokens = parse_value(key, value)?,
            "llm.temperature" => updated.llm.temperature = parse_value(key, value)?,
            "llm.timeout_secs" => updated.llm.timeout_secs = parse_value(key, value)?,
            "output.format" => updated.output.format = value.parse()?,
            "output.color" => updated.output.color = parse_value(key, value)?,
            _ => {
                return Err(ModelResolverError::Configuration(format!(
                    "Unknown configuration key: {}",
                    key
                )))
            }
        }
        updated.validate()?;
        *self = updated;
        Ok(())
    }
}
