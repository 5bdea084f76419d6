//! Model registry: artifact discovery, loading and hot-swapping
//!
//! The current model is held as an `Arc` behind a short-lived read lock.
//! A swap replaces the pointer; requests already holding the previous model
//! finish against it.

pub mod artifact;
mod pipeline;
mod schema;

pub use artifact::{DataInfo, TrainingMetadata};
pub use pipeline::TrainedPipeline;
pub use schema::FeatureSchema;

use crate::error::{ExoError, Result};
use crate::training::metrics::ClassificationMetrics;
use crate::training::ModelFamily;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// A pipeline made current by the registry
#[derive(Debug)]
pub struct LoadedModel {
    /// Artifact file stem
    pub name: String,
    pub path: PathBuf,
    pub pipeline: TrainedPipeline,
    pub schema: FeatureSchema,
    pub metadata: Option<TrainingMetadata>,
    pub loaded_at: DateTime<Utc>,
}

/// Listing entry for one artifact on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub name: String,
    pub family: String,
    pub path: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub is_current: bool,
    pub metrics: Option<ClassificationMetrics>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_name: String,
    pub model_type: String,
    pub model_path: String,
    pub n_features: usize,
    pub target_classes: Option<Vec<String>>,
    pub numeric_features: usize,
    pub categorical_features: usize,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedFeatures {
    pub numeric: Vec<String>,
    pub categorical: Vec<String>,
    pub all: Vec<String>,
}

pub struct ModelRegistry {
    models_dir: PathBuf,
    default_family: ModelFamily,
    current: RwLock<Option<Arc<LoadedModel>>>,
}

impl ModelRegistry {
    pub fn new(models_dir: impl Into<PathBuf>, default_family: ModelFamily) -> Self {
        Self { models_dir: models_dir.into(), default_family, current: RwLock::new(None) }
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Every recognizable artifact, newest first
    pub fn list_available(&self) -> Result<Vec<ModelSummary>> {
        let current_path = self.current.read().as_ref().map(|m| m.path.clone());
        let entries = match fs::read_dir(&self.models_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut models = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(artifact::ARTIFACT_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };

            let summary = match artifact::load_sidecar(&path) {
                Some(meta) => ModelSummary {
                    name: stem,
                    family: meta.model_name,
                    path: path.display().to_string(),
                    timestamp: Some(meta.timestamp),
                    is_current: false,
                    metrics: Some(meta.metrics),
                },
                None => match artifact::parse_artifact_stem(&stem) {
                    Some(parsed) => ModelSummary {
                        name: stem,
                        family: parsed.family,
                        path: path.display().to_string(),
                        timestamp: parsed.timestamp,
                        is_current: false,
                        metrics: None,
                    },
                    None => {
                        warn!(file = %path.display(), "Skipping artifact with unrecognized name");
                        continue;
                    }
                },
            };
            models.push(ModelSummary {
                is_current: current_path.as_deref() == Some(path.as_path()),
                ..summary
            });
        }

        models.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.name.cmp(&a.name)));
        Ok(models)
    }

    /// Load a model and make it current.
    ///
    /// Resolution order: explicit `path`; else `name` as an artifact name or
    /// a family (newest of that family); else the newest artifact of the
    /// default family; else the newest `best_model_*` artifact.
    pub fn load(&self, path: Option<&Path>, name: Option<&str>) -> Result<Arc<LoadedModel>> {
        let path = match (path, name) {
            (Some(path), _) => path.to_path_buf(),
            (None, Some(name)) => self.resolve_name(name)?,
            (None, None) => self.resolve_default()?,
        };

        let pipeline = artifact::load_pipeline(&path)?;
        let schema = FeatureSchema::extract(&pipeline);
        let loaded = Arc::new(LoadedModel {
            name: path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string(),
            metadata: artifact::load_sidecar(&path),
            path,
            pipeline,
            schema,
            loaded_at: Utc::now(),
        });

        *self.current.write() = Some(Arc::clone(&loaded));
        info!(
            model = %loaded.name,
            family = %loaded.pipeline.family,
            features = loaded.schema.n_features(),
            "Model loaded"
        );
        Ok(loaded)
    }

    fn resolve_name(&self, name: &str) -> Result<PathBuf> {
        let available = self.list_available()?;
        available
            .iter()
            .find(|m| m.name == name)
            .or_else(|| available.iter().find(|m| m.family == name))
            .map(|m| PathBuf::from(&m.path))
            .ok_or_else(|| ExoError::ArtifactNotFound(name.to_string()))
    }

    fn resolve_default(&self) -> Result<PathBuf> {
        let available = self.list_available()?;
        available
            .iter()
            .find(|m| m.family == self.default_family.as_str())
            .or_else(|| available.iter().find(|m| m.family == "best_model"))
            .map(|m| PathBuf::from(&m.path))
            .ok_or_else(|| {
                ExoError::ArtifactNotFound(format!(
                    "no {} or best_model artifact in {}",
                    self.default_family,
                    self.models_dir.display()
                ))
            })
    }

    /// Make the named model current; the previous model stays on failure
    pub fn switch(&self, name: &str) -> Result<ModelInfo> {
        let loaded = self.load(None, Some(name))?;
        Ok(Self::info_of(&loaded))
    }

    pub fn current(&self) -> Result<Arc<LoadedModel>> {
        self.current.read().clone().ok_or(ExoError::NotLoaded)
    }

    pub fn is_loaded(&self) -> bool {
        self.current.read().is_some()
    }

    fn info_of(model: &LoadedModel) -> ModelInfo {
        ModelInfo {
            model_name: model.pipeline.family.to_string(),
            model_type: "classification".to_string(),
            model_path: model.path.display().to_string(),
            n_features: model.schema.n_features(),
            target_classes: model.schema.classes.clone(),
            numeric_features: model.schema.numeric.len(),
            categorical_features: model.schema.categorical.len(),
            loaded_at: model.loaded_at,
        }
    }

    pub fn model_info(&self) -> Result<ModelInfo> {
        Ok(Self::info_of(&*self.current()?))
    }

    pub fn expected_features(&self) -> Result<ExpectedFeatures> {
        let model = self.current()?;
        Ok(ExpectedFeatures {
            numeric: model.schema.numeric.clone(),
            categorical: model.schema.categorical.clone(),
            all: model.schema.all(),
        })
    }

    /// Training record of the current model, when it has a sidecar
    pub fn metrics(&self) -> Result<Option<TrainingMetadata>> {
        Ok(self.current()?.metadata.clone())
    }
}
