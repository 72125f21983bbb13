//! Local model registries and model resolution

pub mod ollama;
pub mod resolver;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use ollama::OllamaRegistry;
pub use resolver::{ModelResolver, Resolution, ResolutionSource};

/// A model present in a local registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledModel {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub details: ModelDetails,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelDetails {
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub parameter_size: Option<String>,
    #[serde(default)]
    pub quantization_level: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
}

impl InstalledModel {
    pub fn size_gb(&self) -> f64 {
        self.size as f64 / (1024.0 * 1024.0 * 1024.0)
    }
}

/// Detailed information about one installed model
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub details: ModelDetails,
    #[serde(default)]
    pub parameters: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// Registry of locally installed models
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    /// List installed models
    async fn list(&self) -> Result<Vec<InstalledModel>>;

    /// Download a model into the registry
    async fn pull(&self, name: &str) -> Result<()>;

    /// Show details of an installed model
    async fn show(&self, name: &str) -> Result<ModelInfo>;

    /// Delete an installed model
    async fn remove(&self, name: &str) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory registry used by unit tests

    use super::*;
    use crate::error::ModelResolverError;
    use crate::model::identifier::split_tag;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeRegistry {
        pub models: Mutex<Vec<InstalledModel>>,
        pub pulls: Mutex<Vec<String>>,
        pub pullable: Vec<String>,
    }

    pub fn installed(name: &str, days_old: i64) -> InstalledModel {
        InstalledModel {
            name: name.to_string(),
            size: 4 * 1024 * 1024 * 1024,
            digest: format!("sha256:{}", name.len()),
            modified_at: Some(Utc::now() - chrono::Duration::days(days_old)),
            details: ModelDetails::default(),
        }
    }

    impl FakeRegistry {
        pub fn with_models(models: Vec<InstalledModel>) -> Self {
            Self {
                models: Mutex::new(models),
                ..Default::default()
            }
        }

        pub fn pulled(&self) -> Vec<String> {
            self.pulls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ModelRegistry for FakeRegistry {
        async fn list(&self) -> Result<Vec<InstalledModel>> {
            Ok(self.models.lock().unwrap().clone())
        }

        async fn pull(&self, name: &str) -> Result<()> {
            if !self.pullable.iter().any(|p| p == name) {
                return Err(ModelResolverError::model_not_found(name));
            }
            self.pulls.lock().unwrap().push(name.to_string());
            let (base, tag) = split_tag(name);
            self.models
                .lock()
                .unwrap()
                .push(installed(&format!("{}:{}", base, tag), 0));
            Ok(())
        }

        async fn show(&self, name: &str) -> Result<ModelInfo> {
            self.models
                .lock()
                .unwrap()
                .iter()
                .find(|m| m.name == name)
                .map(|m| ModelInfo {
                    name: m.name.clone(),
                    details: m.details.clone(),
                    ..Default::default()
                })
                .ok_or_else(|| ModelResolverError::model_not_found(name))
        }

        async fn remove(&self, name: &str) -> Result<()> {
            let mut models = self.models.lock().unwrap();
            let before = models.len();
            models.retain(|m| m.name != name);
            if models.len() == before {
                return Err(ModelResolverError::model_not_found(name));
            }
            Ok(())
        }
    }
}
