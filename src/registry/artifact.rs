//! On-disk layout of model artifacts and their metadata
//!
//! An artifact `{family}_classification_{YYYYMMDD_HHMMSS}.model` holds the
//! serialized pipeline. Its sidecar `{artifact}.meta.json` holds the
//! training record and is the authoritative source for family, timestamp
//! and metrics.

use super::pipeline::TrainedPipeline;
use crate::error::{ExoError, Result};
use crate::training::metrics::{ClassificationMetrics, ClassificationReport};
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const ARTIFACT_EXTENSION: &str = "model";
pub const SIDECAR_SUFFIX: &str = ".meta.json";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const BEST_MODEL_PREFIX: &str = "best_model_";

/// Shape of the data a model was trained on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataInfo {
    pub n_samples: usize,
    pub n_train: usize,
    pub n_test: usize,
    pub n_features: usize,
    pub numeric_features: Vec<String>,
    pub categorical_features: Vec<String>,
    pub target_column: String,
    pub classes: Vec<String>,
}

/// Immutable record of one completed training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetadata {
    pub training_id: String,
    pub timestamp: DateTime<Utc>,
    pub model_name: String,
    pub model_path: String,
    pub hyperparameters: Map<String, Value>,
    pub metrics: ClassificationMetrics,
    pub classification_report: ClassificationReport,
    pub data_info: DataInfo,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// `{family}_classification_{YYYYMMDD_HHMMSS}`
pub fn artifact_stem(family: &str, timestamp: DateTime<Utc>) -> String {
    format!("{}_classification_{}", family, timestamp.format(TIMESTAMP_FORMAT))
}

pub fn sidecar_path(artifact: &Path) -> PathBuf {
    let mut name = artifact.as_os_str().to_os_string();
    name.push(SIDECAR_SUFFIX);
    PathBuf::from(name)
}

/// Family and timestamp recovered from an artifact file stem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    pub family: String,
    pub timestamp: Option<DateTime<Utc>>,
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Parse `{family}_classification_{ts}` or `best_model_*` stems
pub fn parse_artifact_stem(stem: &str) -> Option<ParsedName> {
    if let Some((family, ts)) = stem.split_once("_classification_") {
        let timestamp = parse_timestamp(ts)?;
        if family.is_empty() {
            return None;
        }
        return Some(ParsedName { family: family.to_string(), timestamp: Some(timestamp) });
    }
    if let Some(rest) = stem.strip_prefix(BEST_MODEL_PREFIX) {
        // best_model_{task}_{YYYYMMDD_HHMMSS}; the timestamp is optional
        let timestamp = rest
            .rsplitn(3, '_')
            .collect::<Vec<_>>()
            .get(..2)
            .and_then(|parts| parse_timestamp(&format!("{}_{}", parts[1], parts[0])));
        return Some(ParsedName { family: "best_model".to_string(), timestamp });
    }
    None
}

/// First free artifact path at or after `timestamp`, one second apart
fn unique_artifact_path(dir: &Path, family: &str, timestamp: DateTime<Utc>) -> PathBuf {
    let mut ts = timestamp;
    loop {
        let path = dir.join(format!("{}.{}", artifact_stem(family, ts), ARTIFACT_EXTENSION));
        if !path.exists() {
            return path;
        }
        ts += Duration::seconds(1);
    }
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    let json = serde_json::to_vec_pretty(value)?;
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        ExoError::from(e)
    })
}

/// Persist a pipeline with its sidecar and the training metadata file.
///
/// `metadata.model_path` is filled in here. Any failure after the artifact
/// is written removes it again.
pub fn save(
    pipeline: &TrainedPipeline,
    metadata: &mut TrainingMetadata,
    models_dir: &Path,
    output_dir: &Path,
) -> Result<PathBuf> {
    fs::create_dir_all(models_dir)?;
    fs::create_dir_all(output_dir)?;

    let path = unique_artifact_path(models_dir, pipeline.family.as_str(), metadata.timestamp);
    metadata.model_path = path.display().to_string();
    write_json_atomic(&path, pipeline)?;

    let records = write_json_atomic(&sidecar_path(&path), &*metadata).and_then(|_| {
        let record = output_dir.join(format!("training_metadata_{}.json", metadata.training_id));
        write_json_atomic(&record, &*metadata)
    });
    if let Err(e) = records {
        warn!(path = %path.display(), error = %e, "Metadata write failed, removing artifact");
        let _ = fs::remove_file(&path);
        let _ = fs::remove_file(sidecar_path(&path));
        return Err(e);
    }

    debug!(path = %path.display(), "Artifact saved");
    Ok(path)
}

pub fn load_pipeline(path: &Path) -> Result<TrainedPipeline> {
    let bytes = fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ExoError::ArtifactNotFound(path.display().to_string()),
        _ => ExoError::from(e),
    })?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Sidecar metadata, `None` when absent or unreadable
pub fn load_sidecar(artifact: &Path) -> Option<TrainingMetadata> {
    let path = sidecar_path(artifact);
    let bytes = fs::read(&path).ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(meta) => Some(meta),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable sidecar");
            None
        }
    }
}
