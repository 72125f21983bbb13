//! Resolve a requested model against the local registry, falling back when it is missing

use crate::error::{ModelResolverError, Result};
use crate::model::ModelId;
use crate::registry::{InstalledModel, ModelRegistry};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Minimum Jaro-Winkler similarity for a "did you mean" hint
const SUGGESTION_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionSource {
    /// Provider has no local registry; the remote API decides
    Remote,
    /// Requested model is installed
    Installed,
    /// Requested model was pulled on demand
    Pulled,
    /// Requested model is missing; another installed model is used
    Fallback,
}

/// Outcome of resolving a requested model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub requested: ModelId,
    pub model: ModelId,
    pub source: ResolutionSource,
}

impl Resolution {
    fn new(requested: &ModelId, model: ModelId, source: ResolutionSource) -> Self {
        Self {
            requested: requested.clone(),
            model,
            source,
        }
    }

    pub fn fell_back(&self) -> bool {
        self.source == ResolutionSource::Fallback
    }
}

pub struct ModelResolver {
    registry: Arc<dyn ModelRegistry>,
    fallback_model: Option<String>,
    auto_pull: bool,
    allow_fallback: bool,
}

impl ModelResolver {
    pub fn new(registry: Arc<dyn ModelRegistry>) -> Self {
        Self {
            registry,
            fallback_model: None,
            auto_pull: false,
            allow_fallback: true,
        }
    }

    pub fn with_fallback_model(mut self, fallback: Option<String>) -> Self {
        self.fallback_model = fallback.filter(|f| !f.trim().is_empty());
        self
    }

    pub fn with_auto_pull(mut self, auto_pull: bool) -> Self {
        self.auto_pull = auto_pull;
        self
    }

    pub fn with_allow_fallback(mut self, allow_fallback: bool) -> Self {
        self.allow_fallback = allow_fallback;
        self
    }

    pub fn registry(&self) -> &Arc<dyn ModelRegistry> {
        &self.registry
    }

    pub async fn resolve(&self, requested: &ModelId) -> Result<Resolution> {
        if !requested.provider.is_local() {
            debug!("{} is served remotely, skipping registry lookup", requested);
            return Ok(Resolution::new(
                requested,
                requested.clone(),
                ResolutionSource::Remote,
            ));
        }

        let installed = self.registry.list().await?;
        if let Some(found) = find_installed(requested, &installed) {
            debug!("{} is installed as '{}'", requested, found.name);
            return Ok(Resolution::new(
                requested,
                requested.with_name(&found.name)?,
                ResolutionSource::Installed,
            ));
        }

        if self.auto_pull {
            match self.registry.pull(requested.wire_name()).await {
                Ok(()) => {
                    info!("Pulled missing model {}", requested);
                    return Ok(Resolution::new(
                        requested,
                        requested.clone(),
                        ResolutionSource::Pulled,
                    ));
                }
                Err(e) => warn!("Could not pull {}: {}", requested, e),
            }
        }

        self.fall_back(requested, &installed)
    }

    /// Resolve again after the backend rejected `failed`; never returns `failed` itself
    pub async fn resolve_after_failure(&self, failed: &ModelId) -> Result<Resolution> {
        let installed = self.registry.list().await?;
        let remaining: Vec<InstalledModel> = installed
            .into_iter()
            .filter(|m| !failed.matches_installed(&m.name))
            .collect();
        self.fall_back(failed, &remaining)
    }

    fn fall_back(&self, requested: &ModelId, installed: &[InstalledModel]) -> Result<Resolution> {
        if !self.allow_fallback {
            return Err(not_found(requested, installed));
        }

        if let Some(fallback) = &self.fallback_model {
            let fallback = requested.with_name(fallback.as_str())?;
            match find_installed(&fallback, installed) {
                Some(found) if !requested.matches_installed(&found.name) => {
                    warn!(
                        "Model {} is not installed, falling back to {}",
                        requested, fallback
                    );
                    return Ok(Resolution::new(
                        requested,
                        requested.with_name(&found.name)?,
                        ResolutionSource::Fallback,
                    ));
                }
                Some(_) => {}
                None => warn!("Fallback model {} is not installed either", fallback),
            }
        }

        let newest = installed
            .iter()
            .filter(|m| !requested.matches_installed(&m.name))
            .max_by_key(|m| m.modified_at);
        if let Some(newest) = newest {
            warn!(
                "Model {} is not installed, falling back to most recent model '{}'",
                requested, newest.name
            );
            return Ok(Resolution::new(
                requested,
                requested.with_name(&newest.name)?,
                ResolutionSource::Fallback,
            ));
        }

        Err(not_found(requested, installed))
    }
}

fn find_installed<'a>(model: &ModelId, installed: &'a [InstalledModel]) -> Option<&'a InstalledModel> {
    installed.iter().find(|m| model.matches_installed(&m.name))
}

/// Closest installed model name, if any is similar enough
pub fn suggest_similar<'a>(name: &str, installed: &'a [InstalledModel]) -> Option<&'a str> {
    installed
        .iter()
        .map(|m| (m.name.as_str(), strsim::jaro_winkler(name, &m.name)))
        .filter(|(_, score)| *score >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(name, _)| name)
}

fn not_found(requested: &ModelId, installed: &[InstalledModel]) -> ModelResolverError {
    let suggestion = match suggest_similar(requested.wire_name(), installed) {
        Some(similar) => format!("did you mean '{}'?", similar),
        None => format!(
            "install it with `model-resolver models pull {}`",
            requested.wire_name()
        ),
    };
    ModelResolverError::ModelNotFound {
        model: requested.qualified(),
        suggestion: Some(suggestion),
    }
}
