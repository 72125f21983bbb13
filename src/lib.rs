//! Model resolver library

pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod llm;
pub mod model;
pub mod output;
pub mod registry;

pub use config::Config;
pub use error::{ModelResolverError, Result};
