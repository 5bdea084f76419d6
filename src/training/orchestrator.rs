//! Training runs: validation, split, pipeline fit, evaluation, persistence
//!
//! A run walks fixed stages and publishes a progress event at each one to
//! the subscribers of its session. CPU-bound work runs on the blocking pool
//! so the async runtime keeps serving other requests meanwhile.

use super::estimator::Estimator;
use super::hyperparams::{self, ModelFamily, DEFAULT_RANDOM_STATE};
use super::metrics::{self, ClassificationMetrics, ClassificationReport};
use super::split::train_test_split;
use crate::data::Dataset;
use crate::error::{ExoError, Result};
use crate::preprocessing::{infer_feature_types, ColumnPreprocessor};
use crate::progress::{ProgressEvent, ProgressHub, Stage};
use crate::registry::artifact;
use crate::registry::{DataInfo, TrainedPipeline, TrainingMetadata};
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Columns above this share of missing cells get a validation warning
const HIGH_MISSING_PERCENT: f64 = 50.0;
const SMALL_DATASET_ROWS: usize = 100;
const MIN_CLASS_PERCENT: f64 = 5.0;

#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub models_dir: PathBuf,
    pub output_dir: PathBuf,
    pub random_state: u64,
    /// Pause after each progress event so clients can render it
    pub progress_delay: Duration,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("./models"),
            output_dir: PathBuf::from("./output"),
            random_state: DEFAULT_RANDOM_STATE,
            progress_delay: Duration::from_millis(300),
        }
    }
}

/// Parameters of one training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingRequest {
    pub target_column: String,
    /// Model family name, e.g. `RandomForest`
    pub model_name: String,
    #[serde(default)]
    pub hyperparameters: Map<String, Value>,
    #[serde(default = "default_test_size")]
    pub test_size: f64,
    #[serde(default)]
    pub session_id: Option<String>,
}

fn default_test_size() -> f64 {
    0.2
}

impl TrainingRequest {
    pub fn new(target_column: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            target_column: target_column.into(),
            model_name: model_name.into(),
            hyperparameters: Map::new(),
            test_size: default_test_size(),
            session_id: None,
        }
    }

    pub fn with_hyperparameters(mut self, hyperparameters: Map<String, Value>) -> Self {
        self.hyperparameters = hyperparameters;
        self
    }

    pub fn with_test_size(mut self, test_size: f64) -> Self {
        self.test_size = test_size;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Result of a successful run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingOutcome {
    pub status: String,
    pub session_id: String,
    #[serde(flatten)]
    pub metadata: TrainingMetadata,
}

/// Pre-training checks over an uploaded table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
    pub n_samples: usize,
    pub n_features: usize,
    pub target_column: String,
}

/// Family listing entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyInfo {
    pub name: String,
    pub display_name: String,
}

/// Features and class-index targets with missing-target rows removed
struct PreparedData {
    features: Dataset,
    y: Vec<usize>,
    classes: Vec<String>,
}

fn prepare(dataset: &Dataset, target: &str) -> Result<PreparedData> {
    let (features, target_col) = dataset
        .split_off(target)
        .ok_or_else(|| ExoError::MissingTargetColumn(target.to_string()))?;

    let labels = target_col.data.to_labels();
    let keep: Vec<usize> = (0..labels.len()).filter(|&i| labels[i].is_some()).collect();
    if keep.is_empty() {
        return Err(ExoError::InsufficientData(format!(
            "target column '{}' has no values",
            target
        )));
    }

    let mut classes: Vec<String> = keep.iter().filter_map(|&i| labels[i].clone()).collect();
    classes.sort();
    classes.dedup();

    let y = keep
        .iter()
        .filter_map(|&i| labels[i].as_ref())
        .map(|label| classes.binary_search(label).unwrap_or_default())
        .collect();
    let features = if keep.len() == dataset.n_rows() { features } else { features.take_rows(&keep) };

    Ok(PreparedData { features, y, classes })
}

/// Eight hex characters of a v4 UUID, used for training and session ids
pub fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ExoError::FitFailure(format!("worker task failed: {}", e)))?
}

/// Runs training sessions and keeps the history of completed runs
pub struct Trainer {
    config: TrainerConfig,
    hub: Arc<ProgressHub>,
    history: RwLock<Vec<TrainingMetadata>>,
}

impl Trainer {
    pub fn new(config: TrainerConfig, hub: Arc<ProgressHub>) -> Self {
        Self { config, hub, history: RwLock::new(Vec::new()) }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    async fn emit(&self, event: ProgressEvent) {
        self.hub.publish(&event);
        if !self.config.progress_delay.is_zero() {
            tokio::time::sleep(self.config.progress_delay).await;
        }
    }

    async fn step(&self, session: &str, progress: u8, stage: Stage, message: impl Into<String>) {
        self.emit(ProgressEvent::new(session, progress, stage, message)).await;
    }

    /// Train, evaluate and persist a model.
    ///
    /// Any failure publishes an `error` event to the session and leaves no
    /// artifact behind.
    pub async fn train(&self, dataset: Dataset, request: TrainingRequest) -> Result<TrainingOutcome> {
        let training_id = short_id();
        let session = request.session_id.clone().unwrap_or_else(|| training_id.clone());
        let started = Instant::now();

        match self.run(&training_id, &session, dataset, &request).await {
            Ok(metadata) => {
                info!(
                    training_id = %training_id,
                    model = %metadata.model_name,
                    accuracy = metadata.metrics.accuracy,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Training complete"
                );
                Ok(TrainingOutcome { status: "success".to_string(), session_id: session, metadata })
            }
            Err(e) => {
                error!(training_id = %training_id, session = %session, error = %e, "Training failed");
                self.emit(ProgressEvent::failed(&session, &e)).await;
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        training_id: &str,
        session: &str,
        dataset: Dataset,
        request: &TrainingRequest,
    ) -> Result<TrainingMetadata> {
        let family: ModelFamily = request.model_name.parse()?;
        let mut hyperparameters = hyperparams::clean_hyperparameters(family, &request.hyperparameters)?;
        if family.is_seeded() && !hyperparameters.contains_key("random_state") {
            hyperparameters.insert("random_state".to_string(), Value::from(self.config.random_state));
        }
        let mut warnings = Vec::new();

        self.step(session, 10, Stage::Preprocessing, "Preparing data...").await;
        let PreparedData { features, y, classes } = prepare(&dataset, &request.target_column)?;

        self.step(session, 20, Stage::Preprocessing, "Splitting data...").await;
        let split = train_test_split(&y, classes.len(), request.test_size, self.config.random_state)?;
        if let Some(warning) = &split.warning {
            warnings.push(warning.clone());
        }
        let train_rows = features.take_rows(&split.train);
        let test_rows = features.take_rows(&split.test);
        let y_train: Vec<usize> = split.train.iter().map(|&i| y[i]).collect();
        let y_test: Vec<usize> = split.test.iter().map(|&i| y[i]).collect();

        self.step(session, 30, Stage::Preprocessing, "Creating preprocessing pipeline...").await;
        let (numeric, categorical) = infer_feature_types(&features);
        let preprocessor = ColumnPreprocessor::new(numeric.clone(), categorical.clone());

        self.step(session, 40, Stage::Training, format!("Creating {} model...", family)).await;
        let estimator = Estimator::build(family, &hyperparameters)?;

        self.step(session, 50, Stage::Training, "Training model... This may take a few minutes.").await;
        self.step(session, 60, Stage::Training, "Fitting model to training data...").await;
        let n_classes = classes.len();
        let (preprocessor, estimator) = blocking(move || {
            let mut preprocessor = preprocessor;
            let mut estimator = estimator;
            let x_train = preprocessor.fit_transform(&train_rows)?;
            estimator.fit(&x_train, &y_train, n_classes)?;
            Ok((preprocessor, estimator))
        })
        .await
        .map_err(|e| match e {
            ExoError::FitFailure(_) => e,
            other => ExoError::FitFailure(other.to_string()),
        })?;
        self.step(session, 70, Stage::Training, "Model training complete!").await;

        self.step(session, 80, Stage::Evaluation, "Evaluating model performance...").await;
        let pipeline = TrainedPipeline::new(classes.clone(), Some(preprocessor), estimator);
        let (pipeline, y_pred) = blocking(move || {
            let x_test = pipeline.features(&test_rows)?;
            let y_pred = pipeline.predict_indices(&x_test)?;
            Ok((pipeline, y_pred))
        })
        .await?;
        let scores: ClassificationMetrics = metrics::evaluate(&y_test, &y_pred, n_classes);
        let report: ClassificationReport = metrics::classification_report(&y_test, &y_pred, &classes);

        let saving = ProgressEvent::new(
            session,
            90,
            Stage::Saving,
            format!("Saving model (Accuracy: {:.2}%)...", scores.accuracy * 100.0),
        )
        .with_metrics(&scores);
        self.emit(saving).await;

        let mut metadata = TrainingMetadata {
            training_id: training_id.to_string(),
            timestamp: Utc::now(),
            model_name: family.to_string(),
            model_path: String::new(),
            hyperparameters,
            metrics: scores,
            classification_report: report,
            data_info: DataInfo {
                n_samples: y.len(),
                n_train: split.train.len(),
                n_test: split.test.len(),
                n_features: features.n_columns(),
                numeric_features: numeric,
                categorical_features: categorical,
                target_column: request.target_column.clone(),
                classes,
            },
            warnings,
        };
        let (models_dir, output_dir) = (self.config.models_dir.clone(), self.config.output_dir.clone());
        let metadata = blocking(move || {
            artifact::save(&pipeline, &mut metadata, &models_dir, &output_dir)?;
            Ok(metadata)
        })
        .await?;
        self.history.write().push(metadata.clone());

        self.emit(ProgressEvent::new(session, 100, Stage::Complete, "Training complete!").with_metrics(&metadata.metrics))
            .await;
        Ok(metadata)
    }

    /// Check a table before training on it
    pub fn validate_data(&self, dataset: &Dataset, target_column: &str) -> ValidationReport {
        let mut issues = Vec::new();
        let mut warnings = Vec::new();
        let n = dataset.n_rows();

        let target = dataset.column(target_column);
        if target.is_none() {
            issues.push(format!("Target column '{}' not found in data", target_column));
        }

        if n > 0 {
            for column in dataset.columns() {
                let percent = column.data.missing_count() as f64 / n as f64 * 100.0;
                if percent > HIGH_MISSING_PERCENT {
                    warnings.push(format!("Column '{}' has {:.1}% missing values", column.name, percent));
                }
            }
        }

        if n < SMALL_DATASET_ROWS {
            warnings.push(format!("Small dataset ({} rows). More data recommended.", n));
        }

        if let Some(target) = target {
            let mut counts: std::collections::BTreeMap<String, usize> = std::collections::BTreeMap::new();
            for label in target.data.to_labels().into_iter().flatten() {
                *counts.entry(label).or_default() += 1;
            }
            if let Some(&smallest) = counts.values().min() {
                let percent = smallest as f64 / n as f64 * 100.0;
                if percent < MIN_CLASS_PERCENT {
                    warnings.push(format!("Imbalanced classes. Smallest class: {:.1}%", percent));
                }
            }
        }

        if !warnings.is_empty() {
            warn!(target = %target_column, warnings = warnings.len(), "Data validation produced warnings");
        }

        ValidationReport {
            valid: issues.is_empty(),
            issues,
            warnings,
            n_samples: n,
            n_features: dataset.n_columns().saturating_sub(1),
            target_column: target_column.to_string(),
        }
    }

    /// Completed runs, oldest first
    pub fn history(&self) -> Vec<TrainingMetadata> {
        self.history.read().clone()
    }

    /// Hyperparameter table of a family
    pub fn hyperparameters(family: &str) -> Result<Value> {
        let family: ModelFamily = family.parse()?;
        Ok(hyperparams::specification_json(family))
    }

    pub fn families() -> Vec<FamilyInfo> {
        ModelFamily::ALL
            .iter()
            .map(|f| FamilyInfo { name: f.to_string(), display_name: f.display_name().to_string() })
            .collect()
    }
}
