//! Model identifiers with a provider prefix applied exactly once

use crate::error::{ModelResolverError, Result};
use crate::model::provider::Provider;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Tag Ollama assumes when a model name carries none
pub const DEFAULT_TAG: &str = "latest";

/// A model name bound to the provider that serves it.
///
/// `name` never contains the provider's own routing prefix, so
/// [`ModelId::qualified`] always yields `<prefix>/<name>` with the prefix
/// present exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelId {
    pub provider: Provider,
    pub name: String,
}

fn name_regex() -> &'static Regex {
    static NAME_REGEX: OnceLock<Regex> = OnceLock::new();
    NAME_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._@+-][A-Za-z0-9._:/@+-]*$").expect("Invalid model name regex")
    })
}

/// Remove every leading `<provider>/` segment that routes to `provider`.
///
/// Aggregator names are always `vendor/model`, so a prefix is only removed
/// while a vendor segment remains: `openrouter/auto` is itself a model.
fn strip_provider_prefix(mut raw: &str, provider: Provider) -> &str {
    while let Some((head, tail)) = raw.split_once('/') {
        if Provider::from_tag(head) != Some(provider) {
            break;
        }
        if provider.is_aggregator() && !tail.contains('/') {
            break;
        }
        raw = tail.trim_start();
    }
    raw
}

impl ModelId {
    pub fn new(provider: Provider, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::parse(&name, Some(provider))
    }

    /// Parse a configured model string.
    ///
    /// With an explicit provider, any number of leading copies of that
    /// provider's prefix are dropped. Without one, the string must start
    /// with a known provider prefix.
    pub fn parse(raw: &str, explicit: Option<Provider>) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ModelResolverError::InvalidModel(
                "model name is empty".to_string(),
            ));
        }

        let (provider, rest) = match explicit {
            Some(provider) => {
                let rest = strip_provider_prefix(trimmed, provider);
                if !provider.is_aggregator() {
                    if let Some((head, _)) = rest.split_once('/') {
                        if let Some(prefixed) = Provider::from_tag(head) {
                            return Err(ModelResolverError::ProviderMismatch {
                                model: trimmed.to_string(),
                                prefixed: prefixed.to_string(),
                                explicit: provider.to_string(),
                            });
                        }
                    }
                }
                (provider, rest)
            }
            None => {
                let provider = trimmed
                    .split_once('/')
                    .and_then(|(head, _)| Provider::from_tag(head))
                    .ok_or_else(|| {
                        ModelResolverError::ProviderNotProvided(format!(
                            "'{}' has no provider prefix; use e.g. 'ollama/{}' or set [llm] provider",
                            trimmed, trimmed
                        ))
                    })?;
                (provider, strip_provider_prefix(trimmed, provider))
            }
        };

        if rest.is_empty() {
            return Err(ModelResolverError::InvalidModel(format!(
                "'{}' names a provider but no model",
                trimmed
            )));
        }
        if rest.ends_with('/') || !name_regex().is_match(rest) {
            return Err(ModelResolverError::InvalidModel(format!(
                "'{}' contains characters not allowed in a model name",
                rest
            )));
        }

        Ok(Self {
            provider,
            name: rest.to_string(),
        })
    }

    /// `<prefix>/<name>`, the form stored in configuration files
    pub fn qualified(&self) -> String {
        format!("{}/{}", self.provider.prefix(), self.name)
    }

    /// Name sent to the backend, which already knows its own provider
    pub fn wire_name(&self) -> &str {
        &self.name
    }

    /// Split into `(base, tag)`; the tag defaults to `latest`
    pub fn split_tag(&self) -> (&str, &str) {
        split_tag(&self.name)
    }

    /// Whether an installed registry entry is this model
    pub fn matches_installed(&self, installed: &str) -> bool {
        let (base, tag) = self.split_tag();
        let (installed_base, installed_tag) = split_tag(installed);
        base.eq_ignore_ascii_case(installed_base) && tag == installed_tag
    }

    pub fn with_name(&self, name: impl Into<String>) -> Result<Self> {
        Self::new(self.provider, name)
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider.prefix(), self.name)
    }
}

/// Split an Ollama model name into `(base, tag)`.
///
/// Only a `:` after the last `/` starts a tag, so registry hosts with a
/// port keep their colon.
pub fn split_tag(name: &str) -> (&str, &str) {
    let last_segment_start = name.rfind('/').map(|i| i + 1).unwrap_or(0);
    match name[last_segment_start..].rfind(':') {
        Some(offset) => {
            let split_at = last_segment_start + offset;
            let tag = &name[split_at + 1..];
            if tag.is_empty() {
                (&name[..split_at], DEFAULT_TAG)
            } else {
                (&name[..split_at], tag)
            }
        }
        None => (name, DEFAULT_TAG),
    }
}

/// Qualify a model string with its provider prefix exactly once.
///
/// Idempotent: feeding the result back in returns it unchanged.
pub fn normalize_model_name(raw: &str, explicit: Option<Provider>) -> Result<String> {
    ModelId::parse(raw, explicit).map(|id| id.qualified())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_provider_bare_name() {
        let id = ModelId::parse("llama3", Some(Provider::Ollama)).unwrap();
        assert_eq!(id.provider, Provider::Ollama);
        assert_eq!(id.name, "llama3");
        assert_eq!(id.qualified(), "ollama/llama3");
    }

    #[test]
    fn test_double_prefix_collapses() {
        let id = ModelId::parse("ollama/ollama/llama3", None).unwrap();
        assert_eq!(id.name, "llama3");
        assert_eq!(id.qualified(), "ollama/llama3");

        let id = ModelId::parse("ollama/llama3", Some(Provider::Ollama)).unwrap();
        assert_eq!(id.qualified(), "ollama/llama3");
    }

    #[test]
    fn test_missing_provider_is_reported() {
        let err = ModelId::parse("llama3", None).unwrap_err();
        assert!(matches!(err, ModelResolverError::ProviderNotProvided(_)));
        assert!(err.to_string().contains("LLM Provider NOT provided"));

        let err = ModelId::parse("hf.co/org/model", None).unwrap_err();
        assert!(matches!(err, ModelResolverError::ProviderNotProvided(_)));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            ("llama3", Some(Provider::Ollama)),
            ("ollama/llama3:8b", None),
            ("ollama/ollama/ollama/qwen2.5", Some(Provider::Ollama)),
            ("openrouter/anthropic/claude-3.5-sonnet", None),
            ("openrouter/auto", Some(Provider::OpenRouter)),
            ("openrouter/auto", None),
            ("gpt-4o", Some(Provider::OpenAi)),
        ];
        for (raw, explicit) in inputs {
            let once = normalize_model_name(raw, explicit).unwrap();
            let twice = normalize_model_name(&once, explicit).unwrap();
            let inferred = normalize_model_name(&once, None).unwrap();
            assert_eq!(once, twice, "normalizing {} twice changed it", raw);
            assert_eq!(once, inferred);
        }
    }

    #[test]
    fn test_aggregator_keeps_vendor_segment() {
        let id = ModelId::parse("anthropic/claude-3.5-sonnet", Some(Provider::OpenRouter)).unwrap();
        assert_eq!(id.name, "anthropic/claude-3.5-sonnet");

        let id = ModelId::parse("openrouter/openai/gpt-4o", None).unwrap();
        assert_eq!(id.provider, Provider::OpenRouter);
        assert_eq!(id.name, "openai/gpt-4o");
        assert_eq!(id.qualified(), "openrouter/openai/gpt-4o");
    }

    #[test]
    fn test_aggregator_own_models_keep_their_vendor() {
        for explicit in [Some(Provider::OpenRouter), None] {
            let id = ModelId::parse("openrouter/auto", explicit).unwrap();
            assert_eq!(id.provider, Provider::OpenRouter);
            assert_eq!(id.wire_name(), "openrouter/auto");
            assert_eq!(id.qualified(), "openrouter/openrouter/auto");
        }

        let id = ModelId::parse("openrouter/openrouter/auto", Some(Provider::OpenRouter)).unwrap();
        assert_eq!(id.wire_name(), "openrouter/auto");
        let id = ModelId::parse("auto", Some(Provider::OpenRouter)).unwrap();
        assert_eq!(id.wire_name(), "auto");
    }

    #[test]
    fn test_provider_mismatch() {
        let err = ModelId::parse("ollama/llama3", Some(Provider::OpenAi)).unwrap_err();
        assert!(matches!(err, ModelResolverError::ProviderMismatch { .. }));
    }

    #[test]
    fn test_invalid_names() {
        assert!(ModelId::parse("   ", Some(Provider::Ollama)).is_err());
        assert!(ModelId::parse("ollama/", None).is_err());
        assert!(ModelId::parse("llama 3", Some(Provider::Ollama)).is_err());
        assert!(ModelId::parse("ollama/llama3/", None).is_err());
    }

    #[test]
    fn test_alias_prefix_is_stripped() {
        let id = ModelId::parse("local/mistral", Some(Provider::Ollama)).unwrap();
        assert_eq!(id.qualified(), "ollama/mistral");
    }

    #[test]
    fn test_split_tag() {
        assert_eq!(split_tag("llama3"), ("llama3", "latest"));
        assert_eq!(split_tag("llama3:8b"), ("llama3", "8b"));
        assert_eq!(split_tag("llama3:"), ("llama3", "latest"));
        assert_eq!(split_tag("localhost:5000/team/model"), ("localhost:5000/team/model", "latest"));
        assert_eq!(split_tag("hf.co/org/model:Q4_K_M"), ("hf.co/org/model", "Q4_K_M"));
    }

    #[test]
    fn test_matches_installed() {
        let id = ModelId::parse("ollama/llama3", None).unwrap();
        assert!(id.matches_installed("llama3:latest"));
        assert!(id.matches_installed("llama3"));
        assert!(!id.matches_installed("llama3:8b"));
        assert!(!id.matches_installed("llama3.1:latest"));

        let tagged = ModelId::parse("ollama/llama3:8b", None).unwrap();
        assert!(tagged.matches_installed("llama3:8b"));
        assert!(!tagged.matches_installed("llama3:latest"));
    }

    #[test]
    fn test_display_matches_qualified() {
        let id = ModelId::new(Provider::Groq, "groq/llama-3.1-8b-instant").unwrap();
        assert_eq!(id.to_string(), id.qualified());
        assert_eq!(id.wire_name(), "llama-3.1-8b-instant");
    }
}
