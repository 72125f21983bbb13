//! Model identifiers and providers

pub mod identifier;
pub mod provider;

pub use identifier::{normalize_model_name, ModelId};
pub use provider::Provider;
