//! Chat messages, tool definitions and responses

use crate::error::{ModelResolverError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Result of executing a tool call, linked back to the call by id
    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
            ..Self::with_role(Role::Tool, content)
        }
    }

    pub fn from_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

/// A function the model may call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A tool invocation requested by the model; `arguments` is raw JSON text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    pub fn parse_arguments(&self) -> Result<Value> {
        if self.arguments.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_str(&self.arguments).map_err(|_| ModelResolverError::InvalidToolArguments {
            name: self.name.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    None,
    #[default]
    Auto,
    Required,
}

impl FromStr for ToolChoice {
    type Err = ModelResolverError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "none" => Ok(ToolChoice::None),
            "auto" => Ok(ToolChoice::Auto),
            "required" => Ok(ToolChoice::Required),
            _ => Err(ModelResolverError::InvalidInput(format!(
                "Invalid tool choice: {}. Supported: none, auto, required",
                s
            ))),
        }
    }
}

impl fmt::Display for ToolChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ToolChoice::None => "none",
            ToolChoice::Auto => "auto",
            ToolChoice::Required => "required",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl TokenUsage {
    pub fn total(&self) -> usize {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub model: String,
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: TokenUsage,
}

impl ChatResponse {
    pub fn has_content(&self) -> bool {
        self.content.as_deref().map_or(false, |c| !c.trim().is_empty())
    }

    /// Message to append to the conversation history
    pub fn to_message(&self) -> Message {
        if self.tool_calls.is_empty() {
            Message::assistant(self.content.clone().unwrap_or_default())
        } else {
            Message::from_tool_calls(self.content.clone(), self.tool_calls.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_message_links_call() {
        let msg = Message::tool("42", "call_1", "calculator");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(msg.name.as_deref(), Some("calculator"));
        assert_eq!(msg.text(), "42");
    }

    #[test]
    fn test_parse_arguments() {
        let call = ToolCall {
            id: "call_0".into(),
            name: "bash".into(),
            arguments: r#"{"command":"ls"}"#.into(),
        };
        assert_eq!(call.parse_arguments().unwrap(), json!({"command": "ls"}));

        let empty = ToolCall { arguments: "  ".into(), ..call.clone() };
        assert_eq!(empty.parse_arguments().unwrap(), json!({}));

        let broken = ToolCall { arguments: "{command".into(), ..call };
        let err = broken.parse_arguments().unwrap_err();
        assert_eq!(err.to_string(), "Error parsing arguments for bash: Invalid JSON format");
    }

    #[test]
    fn test_tool_choice_parsing() {
        assert_eq!("REQUIRED".parse::<ToolChoice>().unwrap(), ToolChoice::Required);
        assert_eq!(ToolChoice::default(), ToolChoice::Auto);
        assert!("always".parse::<ToolChoice>().is_err());
        assert_eq!(ToolChoice::None.to_string(), "none");
    }

    #[test]
    fn test_response_to_message() {
        let response = ChatResponse {
            model: "llama3".into(),
            content: Some("  ".into()),
            tool_calls: vec![ToolCall {
                id: "call_0".into(),
                name: "terminate".into(),
                arguments: "{}".into(),
            }],
            usage: TokenUsage::default(),
        };
        assert!(!response.has_content());
        let msg = response.to_message();
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.tool_calls.len(), 1);
    }
}
