//! Error handling for the model resolver

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelResolverError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("LLM Provider NOT provided: {0}")]
    ProviderNotProvided(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Provider mismatch: model '{model}' is prefixed for '{prefixed}' but provider '{explicit}' was requested")]
    ProviderMismatch {
        model: String,
        prefixed: String,
        explicit: String,
    },

    #[error("Invalid model identifier: {0}")]
    InvalidModel(String),

    #[error("Model not found: {model}{}", suggestion_suffix(.suggestion))]
    ModelNotFound {
        model: String,
        suggestion: Option<String>,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Backend error ({status}): {message}")]
    Backend {
        status: u16,
        message: String,
        retryable: bool,
    },

    #[error("Tool calls required but none provided")]
    ToolCallRequired,

    #[error("Error parsing arguments for {name}: Invalid JSON format")]
    InvalidToolArguments { name: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Output formatting error: {0}")]
    OutputFormatting(String),
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(hint) => format!(" ({})", hint),
        None => String::new(),
    }
}

impl ModelResolverError {
    pub fn model_not_found(model: impl Into<String>) -> Self {
        ModelResolverError::ModelNotFound {
            model: model.into(),
            suggestion: None,
        }
    }

    /// Whether retrying the same request could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ModelResolverError::Network(_) => true,
            ModelResolverError::Backend { retryable, .. } => *retryable,
            _ => false,
        }
    }

    pub fn is_model_not_found(&self) -> bool {
        matches!(self, ModelResolverError::ModelNotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, ModelResolverError>;

impl From<toml::de::Error> for ModelResolverError {
    fn from(err: toml::de::Error) -> Self {
        ModelResolverError::Configuration(format!("Failed to parse config: {}", err))
    }
}

impl From<toml::ser::Error> for ModelResolverError {
    fn from(err: toml::ser::Error) -> Self {
        ModelResolverError::Configuration(format!("Failed to serialize config: {}", err))
    }
}

impl From<reqwest::Error> for ModelResolverError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            ModelResolverError::Network(format!("{} (is the server running?)", err))
        } else if err.is_timeout() {
            ModelResolverError::Network(format!("request timed out: {}", err))
        } else if err.is_decode() {
            ModelResolverError::InvalidInput(format!("unexpected response body: {}", err))
        } else {
            ModelResolverError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_not_provided_message() {
        let err = ModelResolverError::ProviderNotProvided("llama3".to_string());
        assert!(err.to_string().contains("LLM Provider NOT provided"));
    }

    #[test]
    fn test_model_not_found_with_suggestion() {
        let err = ModelResolverError::ModelNotFound {
            model: "llama".to_string(),
            suggestion: Some("did you mean 'llama3'?".to_string()),
        };
        assert_eq!(err.to_string(), "Model not found: llama (did you mean 'llama3'?)");
        assert_eq!(
            ModelResolverError::model_not_found("x").to_string(),
            "Model not found: x"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(ModelResolverError::Network("reset".into()).is_transient());
        assert!(ModelResolverError::Backend {
            status: 503,
            message: "busy".into(),
            retryable: true
        }
        .is_transient());
        assert!(!ModelResolverError::model_not_found("x").is_transient());
        assert!(!ModelResolverError::ToolCallRequired.is_transient());
    }
}
