//! Integration tests for the model resolver

use async_trait::async_trait;
use model_resolver::config::{Config, OutputFormat};
use model_resolver::llm::{ChatBackend, ChatRequest, ChatResponse, LlmRouter, Message};
use model_resolver::model::{normalize_model_name, ModelId, Provider};
use model_resolver::registry::{
    InstalledModel, ModelDetails, ModelInfo, ModelRegistry, ModelResolver, ResolutionSource,
};
use model_resolver::{ModelResolverError, Result};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

struct StaticRegistry {
    names: Vec<&'static str>,
}

#[async_trait]
impl ModelRegistry for StaticRegistry {
    async fn list(&self) -> Result<Vec<InstalledModel>> {
        Ok(self
            .names
            .iter()
            .map(|name| InstalledModel {
                name: name.to_string(),
                size: 0,
                digest: String::new(),
                modified_at: None,
                details: ModelDetails::default(),
            })
            .collect())
    }

    async fn pull(&self, name: &str) -> Result<()> {
        Err(ModelResolverError::model_not_found(name))
    }

    async fn show(&self, name: &str) -> Result<ModelInfo> {
        Err(ModelResolverError::model_not_found(name))
    }

    async fn remove(&self, name: &str) -> Result<()> {
        Err(ModelResolverError::model_not_found(name))
    }
}

/// Records the wire model name of every request
struct RecordingBackend {
    seen: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ChatBackend for RecordingBackend {
    fn provider(&self) -> Provider {
        Provider::Ollama
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.seen
            .lock()
            .unwrap()
            .push(request.model.wire_name().to_string());
        Ok(ChatResponse {
            model: request.model.wire_name().to_string(),
            content: Some("pong".to_string()),
            tool_calls: Vec::new(),
            usage: Default::default(),
        })
    }
}

#[test]
fn test_load_or_create_writes_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let config = Config::load_or_create(&path).unwrap();
    assert!(path.exists());
    assert_eq!(config, Config::default());

    let reloaded = Config::load_from(&path).unwrap();
    assert_eq!(reloaded, config);
}

#[test]
fn test_load_from_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    let err = Config::load_from(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ModelResolverError::Configuration(_)));
}

#[test]
fn test_double_prefixed_config_resolves_once() {
    let config = Config::load_from(Path::new("tests/fixtures/double_prefix.toml")).unwrap();
    let id = config.model_id().unwrap();
    assert_eq!(id.qualified(), "ollama/llama3");
    assert_eq!(id.wire_name(), "llama3");
    assert_eq!(config.output.format, OutputFormat::Json);
    assert!(config.validate().is_ok());
}

#[test]
fn test_set_and_save_does_not_grow_prefix() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::copy("tests/fixtures/double_prefix.toml", &path).unwrap();

    for _ in 0..3 {
        let mut config = Config::load_from(&path).unwrap();
        let current = config.llm.model.clone();
        config.set("llm.model", &current).unwrap();
        config.save_to(&path).unwrap();
    }

    let saved = std::fs::read_to_string(&path).unwrap();
    assert!(saved.contains("model = \"ollama/llama3\""));
    assert!(!saved.contains("ollama/ollama"));
}

#[test]
fn test_bare_model_without_provider_is_reported() {
    let config = Config::load_from(Path::new("tests/fixtures/bare_model.toml")).unwrap();
    let err = config.model_id().unwrap_err();
    assert!(matches!(err, ModelResolverError::ProviderNotProvided(_)));
    assert!(err.to_string().contains("LLM Provider NOT provided"));

    let mut repaired = config.clone();
    repaired.set("llm.provider", "ollama").unwrap();
    assert_eq!(repaired.model_id().unwrap().qualified(), "ollama/llama3");
}

#[test]
fn test_normalization_is_idempotent() {
    for raw in ["llama3", "ollama/llama3", "ollama/ollama/llama3:8b", "OLLAMA/qwen2.5"] {
        let once = normalize_model_name(raw, Some(Provider::Ollama)).unwrap();
        let twice = normalize_model_name(&once, Some(Provider::Ollama)).unwrap();
        assert_eq!(once, twice, "normalizing {raw} twice changed it");
        assert_eq!(once.matches("ollama/").count(), 1);
    }

    let routed = normalize_model_name("openrouter/anthropic/claude-3.5-sonnet", None).unwrap();
    assert_eq!(routed, "openrouter/anthropic/claude-3.5-sonnet");
    assert_eq!(normalize_model_name(&routed, None).unwrap(), routed);
}

#[tokio::test]
async fn test_missing_model_falls_back_to_installed() {
    let registry = Arc::new(StaticRegistry {
        names: vec!["phi3:latest", "llama3:latest"],
    });
    let resolver = ModelResolver::new(registry).with_fallback_model(Some("phi3".to_string()));

    let requested = ModelId::parse("ollama/mistral", None).unwrap();
    let resolution = resolver.resolve(&requested).await.unwrap();
    assert_eq!(resolution.source, ResolutionSource::Fallback);
    assert_eq!(resolution.model.qualified(), "ollama/phi3:latest");
}

#[tokio::test]
async fn test_router_sends_unprefixed_wire_name() {
    let config = Config::load_from(Path::new("tests/fixtures/double_prefix.toml")).unwrap();
    let requested = config.model_id().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let backend = RecordingBackend { seen: seen.clone() };
    let resolver = ModelResolver::new(Arc::new(StaticRegistry {
        names: vec!["llama3:latest"],
    }));

    let mut router = LlmRouter::with_parts(requested, Box::new(backend), Some(resolver));
    let answer = router.ask(&[Message::user("ping")], None).await.unwrap();
    assert_eq!(answer, "pong");
    assert_eq!(router.resolution().unwrap().source, ResolutionSource::Installed);
    assert_eq!(*seen.lock().unwrap(), vec!["llama3:latest".to_string()]);
}

#[test]
fn test_unparseable_file_is_repaired_by_set() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::copy("tests/fixtures/unknown_provider.toml", &path).unwrap();

    let err = Config::load_from(&path).unwrap_err();
    assert!(matches!(err, ModelResolverError::Configuration(_)));

    let repaired = Config::set_in_file(&path, "llm.model", "ollama/ollama/phi3").unwrap();
    assert_eq!(repaired.llm.model, "ollama/phi3");
    let reloaded = Config::load_from(&path).unwrap();
    assert_eq!(reloaded.model_id().unwrap().qualified(), "ollama/phi3");
}

#[test]
fn test_set_in_file_keeps_existing_settings() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::copy("tests/fixtures/double_prefix.toml", &path).unwrap();

    Config::set_in_file(&path, "llm.auto_pull", "true").unwrap();
    let config = Config::load_from(&path).unwrap();
    assert!(config.llm.auto_pull);
    assert_eq!(config.llm.fallback_model.as_deref(), Some("phi3"));
    assert_eq!(config.output.format, OutputFormat::Json);

    assert!(Config::set_in_file(&path, "llm.temperature", "9").is_err());
    assert_eq!(Config::load_from(&path).unwrap(), config);
}

#[test]
fn test_capitalized_provider_tag_loads() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[llm]\nmodel = \"llama3\"\nprovider = \"Ollama\"\n").unwrap();

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.model_id().unwrap().qualified(), "ollama/llama3");
}
