//! Integration test: training sessions end-to-end

use exo_classifier::data::{from_dataframe, read_csv_bytes, Dataset};
use exo_classifier::error::ExoError;
use exo_classifier::progress::{ProgressEvent, ProgressHub, Stage};
use exo_classifier::registry::ModelRegistry;
use exo_classifier::training::{ModelFamily, Trainer, TrainerConfig, TrainingRequest};
use polars::prelude::*;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Two balanced classes separated along `f1`, with a categorical column
fn candidates_df() -> DataFrame {
    let n = 40;
    let f1: Vec<f64> = (0..n).map(|i| if i % 2 == 0 { i as f64 * 0.1 } else { 10.0 + i as f64 * 0.1 }).collect();
    let f2: Vec<f64> = (0..n).map(|i| ((i * 7) % 11) as f64).collect();
    let band: Vec<&str> = (0..n).map(|i| if i % 3 == 0 { "kepler" } else { "tess" }).collect();
    let t: Vec<&str> = (0..n).map(|i| if i % 2 == 0 { "FALSE POSITIVE" } else { "CONFIRMED" }).collect();
    df!(
        "f1" => f1,
        "f2" => f2,
        "band" => band,
        "t" => t
    )
    .unwrap()
}

fn candidates() -> Dataset {
    from_dataframe(&candidates_df()).unwrap()
}

fn trainer(dir: &tempfile::TempDir) -> (Trainer, Arc<ProgressHub>) {
    let hub = Arc::new(ProgressHub::new());
    let config = TrainerConfig {
        models_dir: dir.path().join("models"),
        output_dir: dir.path().join("output"),
        random_state: 42,
        progress_delay: Duration::ZERO,
    };
    (Trainer::new(config, Arc::clone(&hub)), hub)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(text) = rx.try_recv() {
        events.push(serde_json::from_str(&text).unwrap());
    }
    events
}

#[tokio::test]
async fn test_random_forest_session_reports_progress() {
    let dir = tempfile::tempdir().unwrap();
    let (trainer, hub) = trainer(&dir);
    let (tx, mut rx) = mpsc::unbounded_channel();
    hub.subscribe(tx, Some("session-1"));

    let request = TrainingRequest::new("t", "RandomForest").with_session("session-1");
    let result = trainer.train(candidates(), request).await;
    assert!(result.is_ok(), "RandomForest training should succeed: {:?}", result.err());
    let outcome = result.unwrap();

    let events = drain(&mut rx);
    let progress: Vec<u8> = events.iter().map(|e| e.progress).collect();
    assert_eq!(progress, vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
    assert!(progress.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(events.last().unwrap().stage, Stage::Complete);
    assert_eq!(events[3].message, "Creating RandomForest model...");
    assert!(events[8].message.starts_with("Saving model (Accuracy: "));
    assert!(events[8].metrics.contains_key("f1_score"));

    let meta = &outcome.metadata;
    assert!((0.0..=1.0).contains(&meta.metrics.accuracy));
    assert!(std::path::Path::new(&meta.model_path).exists());
    assert!(std::path::Path::new(&format!("{}.meta.json", meta.model_path)).exists());
    assert!(dir
        .path()
        .join("output")
        .join(format!("training_metadata_{}.json", meta.training_id))
        .exists());
    assert_eq!(meta.data_info.n_test, 8);
    assert_eq!(meta.data_info.classes, vec!["CONFIRMED", "FALSE POSITIVE"]);
    assert_eq!(meta.data_info.categorical_features, vec!["band"]);
    assert_eq!(meta.hyperparameters["random_state"], json!(42));
    assert_eq!(trainer.history().len(), 1);
}

#[tokio::test]
async fn test_every_family_trains() {
    let dir = tempfile::tempdir().unwrap();
    let (trainer, _hub) = trainer(&dir);

    for family in ModelFamily::ALL {
        let request = TrainingRequest::new("t", family.as_str());
        let result = trainer.train(candidates(), request).await;
        assert!(result.is_ok(), "{} training should succeed: {:?}", family, result.err());
    }
    assert_eq!(trainer.history().len(), ModelFamily::ALL.len());
}

#[tokio::test]
async fn test_identical_inputs_give_identical_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let (trainer, _hub) = trainer(&dir);

    let mut params = Map::new();
    params.insert("n_estimators".to_string(), json!(20));
    let first = trainer
        .train(candidates(), TrainingRequest::new("t", "GradientBoosting").with_hyperparameters(params.clone()))
        .await
        .unwrap();
    let second = trainer
        .train(candidates(), TrainingRequest::new("t", "GradientBoosting").with_hyperparameters(params))
        .await
        .unwrap();

    assert_eq!(first.metadata.metrics, second.metadata.metrics);
    assert_ne!(first.metadata.model_path, second.metadata.model_path);
}

#[tokio::test]
async fn test_unknown_family_emits_error_event() {
    let dir = tempfile::tempdir().unwrap();
    let (trainer, hub) = trainer(&dir);
    let (tx, mut rx) = mpsc::unbounded_channel();
    hub.subscribe(tx, Some("s"));

    let result = trainer.train(candidates(), TrainingRequest::new("t", "XGBoost").with_session("s")).await;
    assert!(matches!(result, Err(ExoError::UnknownModelFamily(_))));

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1, "no data work before family validation");
    assert_eq!(events[0].stage, Stage::Error);
    assert_eq!(events[0].progress, 0);
    assert!(events[0].message.starts_with("Training failed: "));
    assert!(trainer.history().is_empty());
    assert!(!dir.path().join("models").exists());
}

#[tokio::test]
async fn test_missing_target_and_bad_parameters() {
    let dir = tempfile::tempdir().unwrap();
    let (trainer, _hub) = trainer(&dir);

    let missing = trainer.train(candidates(), TrainingRequest::new("koi_disposition", "KNN")).await;
    assert!(matches!(missing, Err(ExoError::MissingTargetColumn(_))));

    let mut params = Map::new();
    params.insert("n_neighbors".to_string(), json!(500));
    let out_of_range = trainer
        .train(candidates(), TrainingRequest::new("t", "KNN").with_hyperparameters(params))
        .await;
    assert!(matches!(out_of_range, Err(ExoError::InvalidParameter { .. })));

    let bad_split = trainer
        .train(candidates(), TrainingRequest::new("t", "KNN").with_test_size(1.0))
        .await;
    assert!(matches!(bad_split, Err(ExoError::InvalidParameter { .. })));
}

#[tokio::test]
async fn test_none_hyperparameters_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let (trainer, _hub) = trainer(&dir);

    let mut params = Map::new();
    params.insert("max_depth".to_string(), Value::Null);
    params.insert("max_features".to_string(), json!("None"));
    params.insert("n_estimators".to_string(), json!(10));
    let result = trainer
        .train(candidates(), TrainingRequest::new("t", "RandomForest").with_hyperparameters(params))
        .await;
    assert!(result.is_ok(), "None values should be ignored: {:?}", result.err());
    let hyperparameters = result.unwrap().metadata.hyperparameters;
    assert!(!hyperparameters.contains_key("max_depth"));
    assert!(!hyperparameters.contains_key("max_features"));
}

#[tokio::test]
async fn test_single_class_falls_back_to_unstratified_split() {
    let dir = tempfile::tempdir().unwrap();
    let (trainer, _hub) = trainer(&dir);

    let df = df!(
        "x" => (0..20).map(|i| i as f64).collect::<Vec<_>>(),
        "t" => vec!["only"; 20]
    )
    .unwrap();
    let result = trainer
        .train(from_dataframe(&df).unwrap(), TrainingRequest::new("t", "NaiveBayes"))
        .await;
    // one class cannot be fitted by every family; the split itself must warn
    match result {
        Ok(outcome) => assert!(!outcome.metadata.warnings.is_empty()),
        Err(e) => assert!(matches!(e, ExoError::FitFailure(_)), "unexpected error: {:?}", e),
    }
}

#[tokio::test]
async fn test_fit_failure_reports_error_and_persists_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (trainer, hub) = trainer(&dir);
    let (tx, mut rx) = mpsc::unbounded_channel();
    hub.subscribe(tx, Some("knn"));

    let mut params = Map::new();
    params.insert("n_neighbors".to_string(), json!(50));
    let result = trainer
        .train(candidates(), TrainingRequest::new("t", "KNN").with_hyperparameters(params).with_session("knn"))
        .await;
    assert!(matches!(result, Err(ExoError::FitFailure(_))), "expected FitFailure: {:?}", result);

    let events = drain(&mut rx);
    let progress: Vec<u8> = events.iter().map(|e| e.progress).collect();
    assert_eq!(progress, vec![10, 20, 30, 40, 50, 60, 0]);
    assert_eq!(events.last().unwrap().stage, Stage::Error);

    let models = dir.path().join("models");
    let written = std::fs::read_dir(&models).map(|entries| entries.count()).unwrap_or(0);
    assert_eq!(written, 0, "no artifact may be written after a failed fit");
    assert!(trainer.history().is_empty());
}

#[tokio::test]
async fn test_infinite_cells_still_give_loadable_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let (trainer, _hub) = trainer(&dir);

    let mut csv = String::from("f1,f2,t\n");
    for i in 0..40 {
        let f1 = match i {
            3 => "inf".to_string(),
            i if i % 2 == 0 => format!("{}", i as f64 * 0.1),
            i => format!("{}", 10.0 + i as f64 * 0.1),
        };
        let t = if i % 2 == 0 { "FALSE POSITIVE" } else { "CONFIRMED" };
        csv.push_str(&format!("{},{},{}\n", f1, (i * 7) % 11, t));
    }

    for family in ModelFamily::ALL {
        let dataset = read_csv_bytes(csv.as_bytes()).unwrap();
        let result = trainer.train(dataset, TrainingRequest::new("t", family.as_str())).await;
        assert!(result.is_ok(), "{} training should succeed: {:?}", family, result.err());
        let path = std::path::PathBuf::from(result.unwrap().metadata.model_path);

        let registry = ModelRegistry::new(dir.path().join("models"), family);
        let loaded = registry.load(Some(&path), None);
        assert!(loaded.is_ok(), "{} artifact should load: {:?}", family, loaded.err());
    }
}

#[test]
fn test_validation_report() {
    let dir = tempfile::tempdir().unwrap();
    let (trainer, _hub) = trainer(&dir);
    let report = trainer.validate_data(&candidates(), "t");
    assert!(report.valid);
    assert_eq!(report.n_samples, 40);
    assert_eq!(report.n_features, 3);
    assert!(report.warnings.iter().any(|w| w.contains("Small dataset (40 rows)")));
}
