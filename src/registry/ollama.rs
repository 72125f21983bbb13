//! Ollama model registry over its HTTP API

use crate::error::{ModelResolverError, Result};
use crate::http::{build_client, error_from_response, normalize_base_url};
use crate::registry::{InstalledModel, ModelDetails, ModelInfo, ModelRegistry};
use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Environment variable Ollama itself uses for its listen address
pub const OLLAMA_HOST_ENV: &str = "OLLAMA_HOST";

/// Pulls stream gigabytes; they get a much longer budget than other calls
const PULL_TIMEOUT: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<InstalledModel>,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ShowResponse {
    #[serde(default)]
    details: ModelDetails,
    #[serde(default)]
    parameters: Option<String>,
    #[serde(default)]
    template: Option<String>,
    #[serde(default)]
    capabilities: Vec<String>,
}

/// The Ollama server to talk to: `OLLAMA_HOST` when set, otherwise `configured`.
///
/// Registry lookups and chat requests must both go through this so a
/// resolved model is looked up on the server that serves it.
pub fn ollama_base_url(configured: &str) -> String {
    select_base_url(configured, std::env::var(OLLAMA_HOST_ENV).ok())
}

fn select_base_url(configured: &str, host: Option<String>) -> String {
    match host.filter(|h| !h.trim().is_empty()) {
        Some(host) => {
            debug!("Using {}={}", OLLAMA_HOST_ENV, host);
            normalize_base_url(&host)
        }
        None => normalize_base_url(configured),
    }
}

pub struct OllamaRegistry {
    base_url: String,
    client: reqwest::Client,
    pull_client: reqwest::Client,
}

impl OllamaRegistry {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: normalize_base_url(base_url),
            client: build_client(timeout)?,
            pull_client: build_client(PULL_TIMEOUT)?,
        })
    }

    /// Use `OLLAMA_HOST` when set, otherwise the configured URL
    pub fn from_env_or(base_url: &str, timeout: Duration) -> Result<Self> {
        Self::new(&ollama_base_url(base_url), timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        request.send().await.map_err(|e| {
            if e.is_connect() {
                ModelResolverError::Network(format!(
                    "cannot reach Ollama at {}; start it with `ollama serve`",
                    self.base_url
                ))
            } else {
                e.into()
            }
        })
    }

    async fn check(response: reqwest::Response, model: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(error_from_response(status, &body, model))
    }
}

#[async_trait]
impl ModelRegistry for OllamaRegistry {
    async fn list(&self) -> Result<Vec<InstalledModel>> {
        debug!("Listing models from {}", self.base_url);
        let response = self.send(self.client.get(self.url("api/tags"))).await?;
        let response = Self::check(response, "").await?;
        let tags: TagsResponse = response.json().await?;
        Ok(tags.models)
    }

    async fn pull(&self, name: &str) -> Result<()> {
        info!("Pulling model '{}' from {}", name, self.base_url);
        let request = self
            .pull_client
            .post(self.url("api/pull"))
            .json(&json!({ "model": name, "stream": false }));
        let response = Self::check(self.send(request).await?, name).await?;
        let pulled: PullResponse = response.json().await?;

        if let Some(error) = pulled.error {
            return Err(ModelResolverError::ModelNotFound {
                model: name.to_string(),
                suggestion: Some(error),
            });
        }
        if pulled.status != "success" {
            return Err(ModelResolverError::Backend {
                status: 200,
                message: format!("pull of '{}' ended with status '{}'", name, pulled.status),
                retryable: false,
            });
        }
        Ok(())
    }

    async fn show(&self, name: &str) -> Result<ModelInfo> {
        let request = self
            .client
            .post(self.url("api/show"))
            .json(&json!({ "model": name }));
        let response = Self::check(self.send(request).await?, name).await?;
        let shown: ShowResponse = response.json().await?;
        Ok(ModelInfo {
            name: name.to_string(),
            details: shown.details,
            parameters: shown.parameters,
            template: shown.template,
            capabilities: shown.capabilities,
        })
    }

    async fn remove(&self, name: &str) -> Result<()> {
        info!("Removing model '{}'", name);
        let request = self
            .client
            .delete(self.url("api/delete"))
            .json(&json!({ "model": name }));
        Self::check(self.send(request).await?, name).await?;
        Ok(())
    }
}
