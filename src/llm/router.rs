//! The single call site that turns `[llm]` configuration into backend calls

use crate::config::Config;
use crate::error::{ModelResolverError, Result};
use crate::llm::backend::{backend_for, ChatBackend, ChatRequest};
use crate::llm::messages::{ChatResponse, Message, ToolChoice, ToolDefinition};
use crate::model::ModelId;
use crate::registry::ollama::ollama_base_url;
use crate::registry::{ModelResolver, OllamaRegistry, Resolution, ResolutionSource};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::Retry;

/// Retries after the first attempt for transient failures
const RETRIES: usize = 2;

pub struct LlmRouter {
    backend: Box<dyn ChatBackend>,
    resolver: Option<ModelResolver>,
    requested: ModelId,
    fallback: Option<ModelId>,
    allow_fallback: bool,
    resolution: Option<Resolution>,
    max_tokens: u32,
    temperature: f32,
    retry_delays: Vec<Duration>,
}

impl LlmRouter {
    /// Build a router from configuration, parsing the model exactly once
    pub fn from_config(config: &Config, allow_fallback: bool) -> Result<Self> {
        let requested = config.model_id()?;
        let provider = requested.provider;
        let base_url = if provider.is_local() {
            ollama_base_url(&config.base_url(provider))
        } else {
            config.base_url(provider)
        };
        let backend = backend_for(provider, &base_url, config.api_key(provider), config.timeout())?;
        let fallback = requested.with_name(config.fallback_model(provider))?;

        let resolver = if provider.is_local() {
            let registry = OllamaRegistry::new(&base_url, config.timeout())?;
            Some(
                ModelResolver::new(Arc::new(registry))
                    .with_fallback_model(Some(fallback.name.clone()))
                    .with_auto_pull(config.llm.auto_pull)
                    .with_allow_fallback(allow_fallback),
            )
        } else {
            None
        };

        info!("LLM routed to provider '{}' with model {}", provider, requested);
        Ok(Self::with_parts(requested, backend, resolver)
            .with_fallback(Some(fallback))
            .with_allow_fallback(allow_fallback)
            .with_generation(config.llm.max_tokens, config.llm.temperature))
    }

    pub fn with_parts(requested: ModelId, backend: Box<dyn ChatBackend>, resolver: Option<ModelResolver>) -> Self {
        Self {
            backend,
            resolver,
            requested,
            fallback: None,
            allow_fallback: true,
            resolution: None,
            max_tokens: 4096,
            temperature: 0.0,
            retry_delays: ExponentialBackoff::from_millis(10)
                .factor(20)
                .max_delay(Duration::from_secs(5))
                .take(RETRIES)
                .collect(),
        }
    }

    pub fn with_fallback(mut self, fallback: Option<ModelId>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_allow_fallback(mut self, allow_fallback: bool) -> Self {
        self.allow_fallback = allow_fallback;
        self
    }

    pub fn with_generation(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    pub fn requested(&self) -> &ModelId {
        &self.requested
    }

    pub fn resolution(&self) -> Option<&Resolution> {
        self.resolution.as_ref()
    }

    /// Model the next request will use
    pub fn active_model(&self) -> &ModelId {
        self.resolution
            .as_ref()
            .map(|r| &r.model)
            .unwrap_or(&self.requested)
    }

    /// Resolve the requested model against the local registry once
    pub async fn prepare(&mut self) -> Result<&Resolution> {
        if self.resolution.is_none() {
            let resolution = match &self.resolver {
                Some(resolver) => resolver.resolve(&self.requested).await?,
                None => Resolution {
                    requested: self.requested.clone(),
                    model: self.requested.clone(),
                    source: ResolutionSource::Remote,
                },
            };
            if resolution.fell_back() {
                warn!(
                    "Requested model {} unavailable, using {}",
                    resolution.requested, resolution.model
                );
            }
            self.resolution = Some(resolution);
        }
        self.resolution
            .as_ref()
            .ok_or_else(|| ModelResolverError::model_not_found(self.requested.qualified()))
    }

    /// Send a conversation and return the assistant's text
    pub async fn ask(&mut self, messages: &[Message], system_msgs: Option<&[Message]>) -> Result<String> {
        let request = self.build_request(messages, system_msgs, Vec::new(), ToolChoice::None).await?;
        match self.send(request).await {
            Ok(response) => Ok(response.content.unwrap_or_default()),
            Err(e) => {
                error!("LLM communication error: {}", e);
                Err(e)
            }
        }
    }

    /// Send a conversation with tools offered to the model
    pub async fn ask_tool(
        &mut self,
        messages: &[Message],
        system_msgs: Option<&[Message]>,
        tools: Vec<ToolDefinition>,
        tool_choice: ToolChoice,
    ) -> Result<ChatResponse> {
        if tool_choice == ToolChoice::Required && tools.is_empty() {
            return Err(ModelResolverError::InvalidInput(
                "tool choice 'required' needs at least one tool".to_string(),
            ));
        }

        let request = self.build_request(messages, system_msgs, tools, tool_choice).await?;
        let mut response = match self.send(request).await {
            Ok(response) => response,
            Err(e) => {
                error!("LLM communication error: {}", e);
                return Err(e);
            }
        };

        debug!("Model selected {} tools", response.tool_calls.len());
        match tool_choice {
            ToolChoice::None if !response.tool_calls.is_empty() => {
                warn!("Model requested tools while tools were disabled; ignoring them");
                response.tool_calls.clear();
            }
            ToolChoice::Required if response.tool_calls.is_empty() => {
                return Err(ModelResolverError::ToolCallRequired);
            }
            _ => {}
        }
        Ok(response)
    }

    async fn build_request(
        &mut self,
        messages: &[Message],
        system_msgs: Option<&[Message]>,
        tools: Vec<ToolDefinition>,
        tool_choice: ToolChoice,
    ) -> Result<ChatRequest> {
        let model = self.prepare().await?.model.clone();
        let mut all = Vec::with_capacity(messages.len() + system_msgs.map_or(0, |s| s.len()));
        if let Some(system_msgs) = system_msgs {
            all.extend_from_slice(system_msgs);
        }
        all.extend_from_slice(messages);

        let mut request = ChatRequest::new(model, all);
        request.tools = tools;
        request.tool_choice = tool_choice;
        request.max_tokens = self.max_tokens;
        request.temperature = self.temperature;
        Ok(request)
    }

    async fn send(&mut self, mut request: ChatRequest) -> Result<ChatResponse> {
        match self.chat_with_retry(&request).await {
            Err(e) if e.is_model_not_found() => {
                let Some(fallback) = self.fallback_after(&request.model).await else {
                    return Err(e);
                };
                warn!(
                    "Backend does not know {} ({}); retrying with {}",
                    request.model, e, fallback
                );
                self.resolution = Some(Resolution {
                    requested: self.requested.clone(),
                    model: fallback.clone(),
                    source: ResolutionSource::Fallback,
                });
                request.model = fallback;
                self.chat_with_retry(&request).await
            }
            other => other,
        }
    }

    /// Only transient failures are retried; anything else is carried out as `Ok(Err(_))`
    async fn chat_with_retry(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let outcome = Retry::spawn(self.retry_delays.clone(), || async {
            match self.backend.chat(request).await {
                Err(e) if e.is_transient() => {
                    warn!("Transient LLM error, retrying: {}", e);
                    Err(e)
                }
                settled => Ok(settled),
            }
        })
        .await;
        outcome.and_then(|settled| settled)
    }

    async fn fallback_after(&self, failed: &ModelId) -> Option<ModelId> {
        if !self.allow_fallback {
            return None;
        }
        match &self.resolver {
            Some(resolver) => match resolver.resolve_after_failure(failed).await {
                Ok(resolution) => Some(resolution.model),
                Err(e) => {
                    debug!("No fallback available: {}", e);
                    None
                }
            },
            None => self.fallback.clone().filter(|f| f != failed),
        }
    }
}
