//! Shared HTTP plumbing for registry and chat backends

use crate::error::{ModelResolverError, Result};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

const USER_AGENT: &str = concat!("model-resolver/", env!("CARGO_PKG_VERSION"));

pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ModelResolverError::Network(format!("Failed to build HTTP client: {}", e)))
}

/// Accepts `host:port`, `http://host:port/` and similar; returns a scheme-qualified URL without a trailing slash
pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

/// Pull the human-readable message out of an error body.
///
/// Ollama answers `{"error": "..."}`, OpenAI-compatible APIs answer
/// `{"error": {"message": "...", "code": "..."}}`.
fn extract_error(body: &str) -> (String, Option<String>) {
    match serde_json::from_str::<Value>(body) {
        Ok(json) => match json.get("error") {
            Some(Value::String(message)) => (message.clone(), None),
            Some(Value::Object(obj)) => {
                let message = obj
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let code = obj.get("code").and_then(Value::as_str).map(str::to_string);
                (message, code)
            }
            _ => (body.trim().to_string(), None),
        },
        Err(_) => (body.trim().to_string(), None),
    }
}

/// Map a failed response to the error taxonomy
pub fn error_from_response(status: StatusCode, body: &str, model: &str) -> ModelResolverError {
    let (message, code) = extract_error(body);
    let lowered = message.to_lowercase();

    if lowered.contains("provider not provided") {
        return ModelResolverError::ProviderNotProvided(message);
    }

    let code_says_missing = code
        .as_deref()
        .map(|c| c == "model_not_found")
        .unwrap_or(false);
    let message_says_missing = lowered.contains("not found") || lowered.contains("does not exist");
    if status == StatusCode::NOT_FOUND || code_says_missing || message_says_missing {
        return ModelResolverError::ModelNotFound {
            model: model.to_string(),
            suggestion: Some(if message.is_empty() {
                format!("HTTP {}", status.as_u16())
            } else {
                message
            }),
        };
    }

    ModelResolverError::Backend {
        status: status.as_u16(),
        retryable: status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error(),
        message: if message.is_empty() {
            status.canonical_reason().unwrap_or("unknown error").to_string()
        } else {
            message
        },
    }
}
