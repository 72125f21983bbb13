//! Chat backends: Ollama's native API and OpenAI-compatible APIs

use crate::error::{ModelResolverError, Result};
use crate::http::{build_client, error_from_response, normalize_base_url};
use crate::llm::messages::{ChatResponse, Message, Role, TokenUsage, ToolCall, ToolChoice, ToolDefinition};
use crate::model::{ModelId, Provider};
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;

/// One chat completion call; the model always carries its provider explicitly
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: ModelId,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: ToolChoice,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ChatRequest {
    pub fn new(model: ModelId, messages: Vec<Message>) -> Self {
        Self {
            model,
            messages,
            tools: Vec::new(),
            tool_choice: ToolChoice::Auto,
            max_tokens: 4096,
            temperature: 0.0,
        }
    }

    /// Tools actually offered to the model
    fn offered_tools(&self) -> &[ToolDefinition] {
        if self.tool_choice == ToolChoice::None {
            &[]
        } else {
            &self.tools
        }
    }
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn provider(&self) -> Provider;

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse>;
}

fn tool_json(tool: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

async fn post_json(request: reqwest::RequestBuilder, body: &Value, model: &str) -> Result<Value> {
    let response = request.json(body).send().await?;
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(error_from_response(status, &text, model));
    }
    Ok(serde_json::from_str(&text)?)
}

// ---------------------------------------------------------------------------
// Ollama
// ---------------------------------------------------------------------------

pub struct OllamaBackend {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    model: String,
    message: OllamaMessage,
    #[serde(default)]
    prompt_eval_count: usize,
    #[serde(default)]
    eval_count: usize,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<OllamaToolCall>,
}

#[derive(Debug, Deserialize)]
struct OllamaToolCall {
    #[serde(default)]
    id: Option<String>,
    function: OllamaFunction,
}

#[derive(Debug, Deserialize)]
struct OllamaFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

impl OllamaBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: normalize_base_url(base_url),
            client: build_client(timeout)?,
        })
    }

    /// Ollama takes tool-call arguments as objects, so they are parsed back here
    fn message_json(message: &Message) -> Result<Value> {
        let mut obj = Map::new();
        obj.insert("role".into(), json!(message.role));
        obj.insert("content".into(), json!(message.text()));
        if !message.tool_calls.is_empty() {
            let calls = message
                .tool_calls
                .iter()
                .map(|call| {
                    let arguments = call.parse_arguments()?;
                    Ok(json!({ "function": { "name": call.name, "arguments": arguments } }))
                })
                .collect::<Result<Vec<Value>>>()?;
            obj.insert("tool_calls".into(), Value::Array(calls));
        }
        if message.role == Role::Tool {
            if let Some(name) = &message.name {
                obj.insert("tool_name".into(), json!(name));
            }
        }
        Ok(Value::Object(obj))
    }

    pub fn request_body(request: &ChatRequest) -> Result<Value> {
        let messages = request
            .messages
            .iter()
            .map(Self::message_json)
            .collect::<Result<Vec<_>>>()?;
        let mut body = json!({
            "model": request.model.wire_name(),
            "messages": messages,
            "stream": false,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            },
        });
        let tools = request.offered_tools();
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(tool_json).collect());
        }
        Ok(body)
    }

    pub fn parse_response(value: Value) -> Result<ChatResponse> {
        let parsed: OllamaChatResponse = serde_json::from_value(value)?;
        let tool_calls = parsed
            .message
            .tool_calls
            .into_iter()
            .enumerate()
            .map(|(i, call)| ToolCall {
                id: call.id.unwrap_or_else(|| format!("call_{}", i)),
                name: call.function.name,
                arguments: match call.function.arguments {
                    Value::String(raw) => raw,
                    Value::Null => "{}".to_string(),
                    other => other.to_string(),
                },
            })
            .collect();
        Ok(ChatResponse {
            model: parsed.model,
            content: Some(parsed.message.content).filter(|c| !c.is_empty()),
            tool_calls,
            usage: TokenUsage {
                input_tokens: parsed.prompt_eval_count,
                output_tokens: parsed.eval_count,
            },
        })
    }
}

#[async_trait]
impl ChatBackend for OllamaBackend {
    fn provider(&self) -> Provider {
        Provider::Ollama
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        debug!("POST {}/api/chat model={}", self.base_url, request.model.wire_name());
        let body = Self::request_body(request)?;
        let builder = self.client.post(format!("{}/api/chat", self.base_url));
        let value = post_json(builder, &body, &request.model.qualified()).await?;
        Self::parse_response(value)
    }
}

// ---------------------------------------------------------------------------
// OpenAI-compatible
// ---------------------------------------------------------------------------

pub struct OpenAiCompatibleBackend {
    provider: Provider,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiToolCall {
    #[serde(default)]
    id: String,
    function: OpenAiFunction,
}

#[derive(Debug, Deserialize)]
struct OpenAiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

impl OpenAiCompatibleBackend {
    pub fn new(provider: Provider, base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let api_key = api_key.filter(|k| !k.trim().is_empty()).ok_or_else(|| {
            ModelResolverError::Configuration(format!(
                "provider '{}' needs an API key: set [llm] api_key or {}",
                provider,
                provider.api_key_env().unwrap_or("an API key environment variable")
            ))
        })?;
        Ok(Self {
            provider,
            base_url: normalize_base_url(base_url),
            api_key,
            client: build_client(timeout)?,
        })
    }

    fn message_json(message: &Message) -> Value {
        let mut obj = Map::new();
        obj.insert("role".into(), json!(message.role));
        obj.insert("content".into(), json!(message.content));
        if !message.tool_calls.is_empty() {
            let calls: Vec<Value> = message
                .tool_calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": { "name": call.name, "arguments": call.arguments },
                    })
                })
                .collect();
            obj.insert("tool_calls".into(), Value::Array(calls));
        }
        if let Some(id) = &message.tool_call_id {
            obj.insert("tool_call_id".into(), json!(id));
        }
        if let Some(name) = &message.name {
            obj.insert("name".into(), json!(name));
        }
        Value::Object(obj)
    }

    pub fn request_body(request: &ChatRequest) -> Value {
        let mut body = json!({
            "model": request.model.wire_name(),
            "messages": request.messages.iter().map(Self::message_json).collect::<Vec<_>>(),
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });
        let tools = request.offered_tools();
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(tool_json).collect());
            body["tool_choice"] = json!(request.tool_choice.to_string());
        }
        body
    }

    pub fn parse_response(value: Value) -> Result<ChatResponse> {
        let parsed: OpenAiChatResponse = serde_json::from_value(value)?;
        let usage = parsed.usage.map_or_else(TokenUsage::default, |u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });
        let message = parsed.choices.into_iter().next().ok_or_else(|| {
            ModelResolverError::InvalidInput("response contained no choices".to_string())
        })?;
        let tool_calls = message
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(i, call)| ToolCall {
                id: if call.id.is_empty() {
                    format!("call_{}", i)
                } else {
                    call.id
                },
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();
        Ok(ChatResponse {
            model: parsed.model,
            content: message.message.content,
            tool_calls,
            usage,
        })
    }
}

#[async_trait]
impl ChatBackend for OpenAiCompatibleBackend {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        debug!(
            "POST {}/chat/completions provider={} model={}",
            self.base_url,
            self.provider,
            request.model.wire_name()
        );
        let body = Self::request_body(request);
        let builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key);
        let value = post_json(builder, &body, &request.model.qualified()).await?;
        Self::parse_response(value)
    }
}

/// Build the backend that serves `provider`
pub fn backend_for(
    provider: Provider,
    base_url: &str,
    api_key: Option<String>,
    timeout: Duration,
) -> Result<Box<dyn ChatBackend>> {
    match provider {
        Provider::Ollama => Ok(Box::new(OllamaBackend::new(base_url, timeout)?)),
        other => Ok(Box::new(OpenAiCompatibleBackend::new(other, base_url, api_key, timeout)?)),
    }
}
