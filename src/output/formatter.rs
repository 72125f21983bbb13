//! Output formatters for model listings, resolutions and configuration

use crate::config::{Config, OutputConfig, OutputFormat};
use crate::error::{ModelResolverError, Result};
use crate::model::ModelId;
use crate::registry::{InstalledModel, ModelInfo, Resolution, ResolutionSource};
use colored::{Color, Colorize};
use serde::Serialize;
use serde_json::json;
use std::path::Path;

/// Trait for rendering command results
pub trait OutputFormatter {
    fn format_models(&self, models: &[InstalledModel], configured: Option<&ModelId>) -> Result<String>;
    fn format_resolution(&self, resolution: &Resolution) -> Result<String>;
    fn format_model_info(&self, info: &ModelInfo) -> Result<String>;
    fn format_config(&self, config: &Config, path: &Path) -> Result<String>;
    fn supports_format(&self) -> OutputFormat;
}

/// Console formatter with optional colors
pub struct ConsoleFormatter {
    use_colors: bool,
}

/// JSON formatter for scripting
pub struct JsonFormatter {
    pretty: bool,
}

pub fn formatter_for(output: &OutputConfig) -> Box<dyn OutputFormatter> {
    match output.format {
        OutputFormat::Console => Box::new(ConsoleFormatter::new(output.color)),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
    }
}

impl ConsoleFormatter {
    pub fn new(use_colors: bool) -> Self {
        Self { use_colors }
    }

    fn colorize(&self, text: &str, color: Color) -> String {
        if self.use_colors {
            text.color(color).to_string()
        } else {
            text.to_string()
        }
    }

    fn header(&self, title: &str) -> String {
        if self.use_colors {
            format!("{}\n", title.bold())
        } else {
            format!("{}\n", title)
        }
    }

    fn source_label(&self, source: ResolutionSource) -> String {
        match source {
            ResolutionSource::Remote => self.colorize("remote", Color::Blue),
            ResolutionSource::Installed => self.colorize("installed", Color::Green),
            ResolutionSource::Pulled => self.colorize("pulled", Color::Green),
            ResolutionSource::Fallback => self.colorize("fallback", Color::Yellow),
        }
    }
}

impl OutputFormatter for ConsoleFormatter {
    fn format_models(&self, models: &[InstalledModel], configured: Option<&ModelId>) -> Result<String> {
        let mut out = self.header("📚 Installed Models");
        if models.is_empty() {
            out.push_str("\n  No models installed.\n");
            if let Some(configured) = configured {
                out.push_str(&format!(
                    "  💡 Install the configured model: model-resolver models pull {}\n",
                    configured.wire_name()
                ));
            }
            return Ok(out);
        }

        out.push('\n');
        for model in models {
            let is_configured = configured.map_or(false, |c| c.matches_installed(&model.name));
            let marker = if is_configured {
                self.colorize("*", Color::Green)
            } else {
                " ".to_string()
            };
            let mut line = format!("{} {:<32} {:>6.1} GB", marker, model.name, model.size_gb());
            if let Some(params) = &model.details.parameter_size {
                line.push_str(&format!("  {}", params));
            }
            if let Some(quant) = &model.details.quantization_level {
                line.push_str(&format!("  {}", quant));
            }
            if let Some(modified) = model.modified_at {
                line.push_str(&format!("  {}", modified.format("%Y-%m-%d")));
            }
            out.push_str(&line);
            out.push('\n');
        }

        if let Some(configured) = configured {
            if !models.iter().any(|m| configured.matches_installed(&m.name)) {
                out.push_str(&format!(
                    "\n{} configured model {} is not installed\n",
                    self.colorize("⚠️ ", Color::Yellow),
                    configured
                ));
            }
        }
        Ok(out)
    }

    fn format_resolution(&self, resolution: &Resolution) -> Result<String> {
        let mut out = self.header("🔎 Model Resolution");
        out.push_str(&format!("Requested: {}\n", resolution.requested));
        out.push_str(&format!("Provider:  {}\n", resolution.model.provider));
        out.push_str(&format!(
            "Using:     {} [{}]\n",
            self.colorize(&resolution.model.qualified(), Color::Cyan),
            self.source_label(resolution.source)
        ));
        out.push_str(&format!("Wire name: {}\n", resolution.model.wire_name()));
        if resolution.fell_back() {
            out.push_str(&format!(
                "\n💡 To use {} run: model-resolver models pull {}\n",
                resolution.requested,
                resolution.requested.wire_name()
            ));
        }
        Ok(out)
    }

    fn format_model_info(&self, info: &ModelInfo) -> Result<String> {
        let mut out = self.header(&format!("📋 Model Information for '{}'", info.name));
        let unknown = "unknown".to_string();
        out.push_str(&format!("Family:       {}\n", info.details.family.as_ref().unwrap_or(&unknown)));
        out.push_str(&format!(
            "Parameters:   {}\n",
            info.details.parameter_size.as_ref().unwrap_or(&unknown)
        ));
        out.push_str(&format!(
            "Quantization: {}\n",
            info.details.quantization_level.as_ref().unwrap_or(&unknown)
        ));
        out.push_str(&format!("Format:       {}\n", info.details.format.as_ref().unwrap_or(&unknown)));
        if !info.capabilities.is_empty() {
            out.push_str("\nCapabilities:\n");
            for capability in &info.capabilities {
                out.push_str(&format!("  • {}\n", capability));
            }
        }
        if let Some(parameters) = info.parameters.as_deref().filter(|p| !p.trim().is_empty()) {
            out.push_str("\nParameters:\n");
            for line in parameters.lines() {
                out.push_str(&format!("  {}\n", line.trim()));
            }
        }
        Ok(out)
    }

    fn format_config(&self, config: &Config, path: &Path) -> Result<String> {
        let mut out = self.header("⚙️  Current Configuration");
        out.push_str(&format!("File: {}\n\n", path.display()));
        out.push_str("[llm]\n");
        out.push_str(&format!("  model:          {}\n", config.llm.model));
        match config.model_id() {
            Ok(id) => out.push_str(&format!(
                "  resolved as:    {}\n",
                self.colorize(&id.qualified(), Color::Cyan)
            )),
            Err(e) => out.push_str(&format!(
                "  resolved as:    {}\n",
                self.colorize(&e.to_string(), Color::Red)
            )),
        }
        let provider = config
            .llm
            .provider
            .map(|p| p.to_string())
            .unwrap_or_else(|| "(from model prefix)".to_string());
        out.push_str(&format!("  provider:       {}\n", provider));
        if let Ok(provider) = config.provider() {
            out.push_str(&format!("  base_url:       {}\n", config.base_url(provider)));
            out.push_str(&format!("  fallback_model: {}\n", config.fallback_model(provider)));
            if provider.requires_api_key() {
                let key_state = if config.api_key(provider).is_some() { "set" } else { "missing" };
                out.push_str(&format!("  api_key:        {}\n", key_state));
            }
        }
        out.push_str(&format!("  auto_pull:      {}\n", config.llm.auto_pull));
        out.push_str(&format!("  max_tokens:     {}\n", config.llm.max_tokens));
        out.push_str(&format!("  temperature:    {:.2}\n", config.llm.temperature));
        out.push_str(&format!("  timeout_secs:   {}\n", config.llm.timeout_secs));
        out.push_str("\n[output]\n");
        out.push_str(&format!("  format:         {:?}\n", config.output.format));
        out.push_str(&format!("  color:          {}\n", config.output.color));
        Ok(out)
    }

    fn supports_format(&self) -> OutputFormat {
        OutputFormat::Console
    }
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        rendered.map_err(|e| ModelResolverError::OutputFormatting(e.to_string()))
    }
}

impl OutputFormatter for JsonFormatter {
    fn format_models(&self, models: &[InstalledModel], configured: Option<&ModelId>) -> Result<String> {
        self.render(&json!({
            "configured": configured.map(|c| c.qualified()),
            "configured_installed": configured
                .map(|c| models.iter().any(|m| c.matches_installed(&m.name))),
            "models": models,
        }))
    }

    fn format_resolution(&self, resolution: &Resolution) -> Result<String> {
        self.render(&json!({
            "requested": resolution.requested.qualified(),
            "model": resolution.model.qualified(),
            "provider": resolution.model.provider,
            "wire_name": resolution.model.wire_name(),
            "source": resolution.source,
            "fell_back": resolution.fell_back(),
        }))
    }

    fn format_model_info(&self, info: &ModelInfo) -> Result<String> {
        self.render(info)
    }

    fn format_config(&self, config: &Config, path: &Path) -> Result<String> {
        let mut redacted = config.clone();
        if redacted.llm.api_key.is_some() {
            redacted.llm.api_key = Some("***".to_string());
        }
        self.render(&json!({
            "path": path.display().to_string(),
            "resolved_model": config.model_id().ok().map(|id| id.qualified()),
            "config": redacted,
        }))
    }

    fn supports_format(&self) -> OutputFormat {
        OutputFormat::Json
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Provider;
    use crate::registry::ModelDetails;

    fn model(name: &str) -> InstalledModel {
        InstalledModel {
            name: name.to_string(),
            size: 2 * 1024 * 1024 * 1024,
            digest: String::new(),
            modified_at: None,
            details: ModelDetails {
                parameter_size: Some("8.0B".to_string()),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_console_marks_configured_model() {
        let formatter = ConsoleFormatter::new(false);
        let configured = ModelId::new(Provider::Ollama, "llama3").unwrap();
        let out = formatter
            .format_models(&[model("llama3:latest"), model("phi3:latest")], Some(&configured))
            .unwrap();
        assert!(out.contains("* llama3:latest"));
        assert!(out.contains("8.0B"));
        assert!(!out.contains("is not installed"));
    }

    #[test]
    fn test_console_warns_when_configured_missing() {
        let formatter = ConsoleFormatter::new(false);
        let configured = ModelId::new(Provider::Ollama, "mistral").unwrap();
        let out = formatter.format_models(&[model("llama3:latest")], Some(&configured)).unwrap();
        assert!(out.contains("configured model ollama/mistral is not installed"));

        let empty = formatter.format_models(&[], Some(&configured)).unwrap();
        assert!(empty.contains("models pull mistral"));
    }

    #[test]
    fn test_json_resolution() {
        let formatter = JsonFormatter::new(false);
        let requested = ModelId::new(Provider::Ollama, "mistral").unwrap();
        let resolution = Resolution {
            requested: requested.clone(),
            model: requested.with_name("llama3:latest").unwrap(),
            source: ResolutionSource::Fallback,
        };
        let out = formatter.format_resolution(&resolution).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["model"], "ollama/llama3:latest");
        assert_eq!(value["wire_name"], "llama3:latest");
        assert_eq!(value["source"], "fallback");
        assert_eq!(value["fell_back"], true);
    }

    #[test]
    fn test_json_config_redacts_api_key() {
        let mut config = Config::default();
        config.llm.api_key = Some("sk-secret".to_string());
        let out = JsonFormatter::new(true)
            .format_config(&config, Path::new("/tmp/config.toml"))
            .unwrap();
        assert!(!out.contains("sk-secret"));
        assert!(out.contains("ollama/llama3"));
    }

    #[test]
    fn test_formatter_selection() {
        let mut output = OutputConfig::default();
        assert_eq!(formatter_for(&output).supports_format(), OutputFormat::Console);
        output.format = OutputFormat::Json;
        assert_eq!(formatter_for(&output).supports_format(), OutputFormat::Json);
    }
}
