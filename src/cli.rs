//! CLI interface for the model resolver

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "model-resolver")]
#[command(about = "Resolve provider-prefixed LLM model names against local registries")]
#[command(long_about = "Normalize the [llm] model from a TOML config so its provider prefix is applied exactly once, check it against the local Ollama registry, fall back to a default model when it is missing, and send prompts to the resolved backend")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format: console, json (overrides the config file)
    #[arg(short, long, global = true)]
    pub output: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send a prompt to the configured model
    Ask {
        /// Prompt text
        prompt: String,

        /// Model to use instead of [llm] model
        #[arg(short, long)]
        model: Option<String>,

        /// Provider tag to use instead of [llm] provider
        #[arg(short, long)]
        provider: Option<String>,

        /// System prompt
        #[arg(short, long)]
        system: Option<String>,

        /// Fail instead of falling back when the model is unavailable
        #[arg(long)]
        no_fallback: bool,
    },

    /// Show how the configured model resolves
    Resolve {
        /// Model to resolve instead of [llm] model
        #[arg(short, long)]
        model: Option<String>,

        /// Provider tag to use instead of [llm] provider
        #[arg(short, long)]
        provider: Option<String>,

        /// Fail instead of falling back when the model is unavailable
        #[arg(long)]
        no_fallback: bool,
    },

    /// Local model management commands
    Models {
        #[command(subcommand)]
        action: ModelAction,
    },

    /// Show or edit configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
pub enum ModelAction {
    /// List installed models
    List,

    /// Download a model into the local registry
    Pull {
        /// Model name, with or without the ollama/ prefix
        model: String,
    },

    /// Show model information
    Info {
        /// Model name
        model: String,
    },

    /// Remove an installed model
    Remove {
        /// Model name
        model: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Print the configuration file path
    Path,

    /// Reset configuration to defaults
    Reset,

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "llm.model")
        key: String,

        /// Configuration value
        value: String,
    },
}
