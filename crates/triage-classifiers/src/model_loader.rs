//! Model artifact loading
//!
//! Artifacts are loaded once at startup. Any failure here is a
//! [`Error::ModelLoad`] and the process must not start serving.

use crate::forest::RandomForestModel;
use crate::logistic::LogisticModel;
use crate::model::TriageModel;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use triage_core::{Error, Result};

/// Configuration for loading a model artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Path to the artifact file
    pub path: PathBuf,

    /// Artifact encoding; inferred from the file extension when unset
    #[serde(default)]
    pub format: Option<ModelFormat>,
}

impl ModelConfig {
    /// Create a new model configuration from local path
    pub fn from_local(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: None,
        }
    }

    /// Set the artifact format explicitly
    pub fn with_format(mut self, format: ModelFormat) -> Self {
        self.format = Some(format);
        self
    }

    fn resolve_format(&self) -> Result<ModelFormat> {
        if let Some(format) = self.format {
            return Ok(format);
        }
        match self.path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(ModelFormat::Json),
            Some("yaml") | Some("yml") => Ok(ModelFormat::Yaml),
            _ => Err(Error::model_load(format!(
                "cannot infer artifact format from {}; set model.format",
                self.path.display()
            ))),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::from_local("models/triage_forest.json")
    }
}

/// Model file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    Json,
    Yaml,
}

/// Supported artifact kinds, tagged by `kind`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelArtifact {
    RandomForest(RandomForestModel),
    Logistic(LogisticModel),
}

impl ModelArtifact {
    /// Parse an artifact in the given format
    pub fn parse(content: &str, format: ModelFormat) -> Result<Self> {
        let parsed = match format {
            ModelFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
            ModelFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
        };
        parsed.map_err(|e| Error::model_load(format!("artifact is not a usable model: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::RandomForest(model) => model.validate(),
            Self::Logistic(model) => model.validate(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::RandomForest(_) => "random_forest",
            Self::Logistic(_) => "logistic",
        }
    }

    /// Validate and wrap as an opaque model handle
    pub fn into_model(self) -> Result<Arc<dyn TriageModel>> {
        self.validate()?;
        Ok(match self {
            Self::RandomForest(model) => Arc::new(model),
            Self::Logistic(model) => Arc::new(model),
        })
    }
}

/// Load, parse and validate the configured artifact
pub fn load_model(config: &ModelConfig) -> Result<Arc<dyn TriageModel>> {
    let path: &Path = &config.path;
    if !path.is_file() {
        return Err(Error::model_load(format!(
            "model artifact not found at {}",
            path.display()
        )));
    }

    let format = config.resolve_format()?;
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::model_load(format!("failed to read {}: {}", path.display(), e))
    })?;

    let artifact = ModelArtifact::parse(&content, format)?;
    let kind = artifact.kind();
    let model = artifact.into_model()?;

    info!(
        "Loaded {} model '{}' with {} features from {}",
        kind,
        model.name(),
        model.feature_names().len(),
        path.display()
    );

    Ok(model)
}
