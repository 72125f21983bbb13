//! LLM integration module

pub mod backend;
pub mod messages;
pub mod router;

pub use backend::{ChatBackend, ChatRequest};
pub use messages::{ChatResponse, Message, Role, ToolCall, ToolChoice, ToolDefinition};
pub use router::LlmRouter;
