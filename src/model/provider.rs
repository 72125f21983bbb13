//! LLM providers and their routing tags

use crate::error::{ModelResolverError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Backend that serves a model, identified by the prefix used in model identifiers
///
/// Deserialization goes through [`Provider::from_tag`], so configuration
/// files accept the same case-insensitive tags and aliases as the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Provider {
    Ollama,
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "openrouter")]
    OpenRouter,
    Groq,
    #[serde(rename = "deepseek")]
    DeepSeek,
}

impl Provider {
    pub const ALL: [Provider; 5] = [
        Provider::Ollama,
        Provider::OpenAi,
        Provider::OpenRouter,
        Provider::Groq,
        Provider::DeepSeek,
    ];

    /// Routing tag used as `<prefix>/<model>`
    pub fn prefix(self) -> &'static str {
        match self {
            Provider::Ollama => "ollama",
            Provider::OpenAi => "openai",
            Provider::OpenRouter => "openrouter",
            Provider::Groq => "groq",
            Provider::DeepSeek => "deepseek",
        }
    }

    /// Only Ollama keeps a registry of locally installed models
    pub fn is_local(self) -> bool {
        matches!(self, Provider::Ollama)
    }

    /// Aggregators keep the upstream vendor as part of the model name
    pub fn is_aggregator(self) -> bool {
        matches!(self, Provider::OpenRouter)
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Provider::Ollama => "http://localhost:11434",
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::OpenRouter => "https://openrouter.ai/api/v1",
            Provider::Groq => "https://api.groq.com/openai/v1",
            Provider::DeepSeek => "https://api.deepseek.com/v1",
        }
    }

    pub fn api_key_env(self) -> Option<&'static str> {
        match self {
            Provider::Ollama => None,
            Provider::OpenAi => Some("OPENAI_API_KEY"),
            Provider::OpenRouter => Some("OPENROUTER_API_KEY"),
            Provider::Groq => Some("GROQ_API_KEY"),
            Provider::DeepSeek => Some("DEEPSEEK_API_KEY"),
        }
    }

    pub fn requires_api_key(self) -> bool {
        self.api_key_env().is_some()
    }

    /// Built-in fallback model when the configuration names none
    pub fn default_model(self) -> &'static str {
        match self {
            Provider::Ollama => "llama3",
            Provider::OpenAi => "gpt-4o-mini",
            Provider::OpenRouter => "openai/gpt-4o-mini",
            Provider::Groq => "llama-3.1-8b-instant",
            Provider::DeepSeek => "deepseek-chat",
        }
    }

    /// Parse a routing tag, returning `None` for anything that is not a known provider
    pub fn from_tag(tag: &str) -> Option<Provider> {
        match tag.trim().to_lowercase().as_str() {
            "ollama" | "local" => Some(Provider::Ollama),
            "openai" | "open_ai" | "open-ai" => Some(Provider::OpenAi),
            "openrouter" | "open_router" | "open-router" => Some(Provider::OpenRouter),
            "groq" => Some(Provider::Groq),
            "deepseek" | "deep_seek" | "deep-seek" => Some(Provider::DeepSeek),
            _ => None,
        }
    }
}

impl FromStr for Provider {
    type Err = ModelResolverError;

    fn from_str(s: &str) -> Result<Self> {
        Provider::from_tag(s).ok_or_else(|| {
            let known: Vec<&str> = Provider::ALL.iter().map(|p| p.prefix()).collect();
            ModelResolverError::UnknownProvider(format!(
                "{}. Supported: {}",
                s,
                known.join(", ")
            ))
        })
    }
}

impl TryFrom<String> for Provider {
    type Error = ModelResolverError;

    fn try_from(tag: String) -> Result<Self> {
        tag.parse()
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}
