//! model-resolver: normalize and resolve LLM model identifiers from configuration

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use model_resolver::cli::{Cli, Commands, ConfigAction, ModelAction};
use model_resolver::config::{Config, OutputConfig};
use model_resolver::llm::{LlmRouter, Message};
use model_resolver::model::{ModelId, Provider};
use model_resolver::output::{formatter_for, OutputFormatter};
use model_resolver::registry::{ModelRegistry, OllamaRegistry};
use std::path::Path;
use std::process;
use std::time::Duration;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let explicit_path = cli.config.is_some();
    let config_path = cli.config.unwrap_or_else(Config::config_path);

    // these must work even when the file does not parse
    match cli.command {
        Commands::Config {
            action: Some(ConfigAction::Path),
        } => {
            println!("{}", config_path.display());
        }

        Commands::Config {
            action: Some(ConfigAction::Reset),
        } => {
            Config::default().save_to(&config_path)?;
            println!("✅ Configuration reset: {}", config_path.display());
        }

        Commands::Config {
            action: Some(ConfigAction::Set { key, value }),
        } => {
            let config = Config::set_in_file(&config_path, &key, &value)
                .with_context(|| format!("Failed to set {}", key))?;
            println!("✅ {} updated in {}", key, config_path.display());
            if key == "llm.model" {
                println!("   model is now {}", config.llm.model);
            }
        }

        command => {
            let config = load_config(&config_path, explicit_path)?;
            let output = output_config(&config, cli.output.as_deref())?;
            run_command(command, config, &config_path, output).await?;
        }
    }

    Ok(())
}

fn load_config(path: &Path, explicit_path: bool) -> Result<Config> {
    let loaded = if explicit_path {
        Config::load_from(path)
    } else {
        Config::load_or_create(path)
    };
    let config = loaded.with_context(|| {
        format!(
            "Failed to load configuration from {}; fix it with `model-resolver config set` or `model-resolver config reset`",
            path.display()
        )
    })?;
    if let Err(e) = config.validate() {
        warn!("Configuration at {} is invalid: {}", path.display(), e);
    }
    Ok(config)
}

/// `--output` applies to this invocation only and is never saved
fn output_config(config: &Config, format: Option<&str>) -> Result<OutputConfig> {
    let mut output = config.output.clone();
    if let Some(format) = format {
        output.format = format.parse()?;
    }
    Ok(output)
}

/// The local registry lives on the Ollama server, whatever provider is configured
fn local_registry(config: &Config) -> Result<OllamaRegistry> {
    let base_url = match config.provider() {
        Ok(Provider::Ollama) => config.base_url(Provider::Ollama),
        _ => Provider::Ollama.default_base_url().to_string(),
    };
    Ok(OllamaRegistry::from_env_or(&base_url, config.timeout())?)
}

fn local_model_name(raw: &str) -> Result<String> {
    Ok(ModelId::parse(raw, Some(Provider::Ollama))?.wire_name().to_string())
}

async fn run_command(command: Commands, config: Config, config_path: &Path, output: OutputConfig) -> Result<()> {
    let formatter = formatter_for(&output);

    match command {
        Commands::Ask {
            prompt,
            model,
            provider,
            system,
            no_fallback,
        } => {
            let config = config.with_overrides(model.as_deref(), provider.as_deref())?;
            let mut router = LlmRouter::from_config(&config, !no_fallback)?;
            let resolution = router.prepare().await?;
            info!("Asking {}", resolution.model);

            let system_msgs = system.map(|s| vec![Message::system(s)]);
            let answer = router
                .ask(&[Message::user(prompt)], system_msgs.as_deref())
                .await
                .context("LLM request failed")?;
            println!("{}", answer);
        }

        Commands::Resolve {
            model,
            provider,
            no_fallback,
        } => {
            let config = config.with_overrides(model.as_deref(), provider.as_deref())?;
            let mut router = LlmRouter::from_config(&config, !no_fallback)?;
            let resolution = router.prepare().await?;
            println!("{}", formatter.format_resolution(resolution)?);
        }

        Commands::Models { action } => {
            run_model_action(action, &config, formatter.as_ref()).await?;
        }

        // path, reset and set are handled before the file is loaded
        Commands::Config { .. } => {
            println!("{}", formatter.format_config(&config, config_path)?);
        }
    }

    Ok(())
}

async fn run_model_action(action: ModelAction, config: &Config, formatter: &dyn OutputFormatter) -> Result<()> {
    let registry = local_registry(config)?;

    match action {
        ModelAction::List => {
            let models = registry.list().await?;
            let configured = config.model_id().ok().filter(|id| id.provider.is_local());
            println!("{}", formatter.format_models(&models, configured.as_ref())?);
        }

        ModelAction::Pull { model } => {
            let name = local_model_name(&model)?;
            let spinner = ProgressBar::new_spinner();
            spinner.set_style(
                ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            spinner.set_message(format!("Pulling {}", name));
            spinner.enable_steady_tick(Duration::from_millis(120));

            let result = registry.pull(&name).await;
            spinner.finish_and_clear();
            result.with_context(|| format!("Failed to pull '{}'", name))?;
            println!("✅ Model '{}' pulled into {}", name, registry.base_url());
        }

        ModelAction::Info { model } => {
            let name = local_model_name(&model)?;
            let info = registry.show(&name).await?;
            println!("{}", formatter.format_model_info(&info)?);
        }

        ModelAction::Remove { model } => {
            let name = local_model_name(&model)?;
            registry.remove(&name).await?;
            println!("✅ Model '{}' removed", name);
        }
    }

    Ok(())
}
