//! Integration test: model registry, prediction and analytics over stored artifacts

use exo_classifier::analytics;
use exo_classifier::data::{from_dataframe, DataColumn, Dataset};
use exo_classifier::error::ExoError;
use exo_classifier::inference::PredictionEngine;
use exo_classifier::progress::ProgressHub;
use exo_classifier::registry::ModelRegistry;
use exo_classifier::training::{ModelFamily, Trainer, TrainerConfig, TrainingRequest};
use polars::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn training_df() -> DataFrame {
    let n = 30;
    df!(
        "koi_period" => (0..n).map(|i| if i % 2 == 0 { 1.0 + i as f64 * 0.05 } else { 50.0 + i as f64 }).collect::<Vec<_>>(),
        "koi_prad" => (0..n).map(|i| (i % 5) as f64 + 0.5).collect::<Vec<_>>(),
        "koi_pdisposition" => (0..n).map(|i| if i % 4 == 0 { "CANDIDATE" } else { "OTHER" }).collect::<Vec<_>>(),
        "koi_disposition" => (0..n).map(|i| if i % 2 == 0 { "FALSE POSITIVE" } else { "CONFIRMED" }).collect::<Vec<_>>()
    )
    .unwrap()
}

async fn train(dir: &tempfile::TempDir, family: &str) -> String {
    let config = TrainerConfig {
        models_dir: dir.path().join("models"),
        output_dir: dir.path().join("output"),
        random_state: 42,
        progress_delay: Duration::ZERO,
    };
    let trainer = Trainer::new(config, Arc::new(ProgressHub::new()));
    let dataset = from_dataframe(&training_df()).unwrap();
    let outcome = trainer
        .train(dataset, TrainingRequest::new("koi_disposition", family))
        .await
        .unwrap();
    outcome.metadata.model_path
}

/// Schema columns in a different order plus an extra column
fn scoring_table() -> Dataset {
    Dataset::new(vec![
        DataColumn::categorical("koi_pdisposition", vec![Some("CANDIDATE".into()), Some("OTHER".into()), None]),
        DataColumn::numeric("extra", vec![Some(1.0), Some(2.0), Some(3.0)]),
        DataColumn::numeric("koi_prad", vec![Some(1.5), None, Some(2.5)]),
        // numbers supplied as text are parsed
        DataColumn::categorical("koi_period", vec![Some("1.2".into()), Some("70".into()), Some("n/a".into())]),
    ])
    .unwrap()
}

#[tokio::test]
async fn test_registry_loads_default_family() {
    let dir = tempfile::tempdir().unwrap();
    train(&dir, "RandomForest").await;

    let registry = ModelRegistry::new(dir.path().join("models"), ModelFamily::RandomForest);
    assert!(matches!(registry.current(), Err(ExoError::NotLoaded)));

    let result = registry.load(None, None);
    assert!(result.is_ok(), "default model should load: {:?}", result.err());
    let info = registry.model_info().unwrap();
    assert_eq!(info.model_name, "RandomForest");
    assert_eq!(info.model_type, "classification");
    assert_eq!(info.n_features, 3);
    assert_eq!(info.target_classes, Some(vec!["CONFIRMED".to_string(), "FALSE POSITIVE".to_string()]));

    let features = registry.expected_features().unwrap();
    assert_eq!(features.numeric, vec!["koi_period", "koi_prad"]);
    assert_eq!(features.categorical, vec!["koi_pdisposition"]);
    assert!(registry.metrics().unwrap().is_some());
}

#[tokio::test]
async fn test_predict_aligns_columns() {
    let dir = tempfile::tempdir().unwrap();
    train(&dir, "RandomForest").await;
    let registry = ModelRegistry::new(dir.path().join("models"), ModelFamily::RandomForest);
    let model = registry.load(None, None).unwrap();

    let engine = PredictionEngine::new();
    let result = engine.predict(&model, &scoring_table());
    assert!(result.is_ok(), "prediction should succeed: {:?}", result.err());
    let result = result.unwrap();
    assert_eq!(result.predictions.len(), 3);
    assert_eq!(result.metrics.total_predictions, 3);
    let probabilities = result.probabilities.unwrap();
    assert!(probabilities.iter().all(|row| (row.iter().sum::<f64>() - 1.0).abs() < 1e-6));
    assert!(result.metrics.average_confidence.is_some());

    let detailed = engine.predict_detailed(&model, &scoring_table()).unwrap();
    assert_eq!(detailed.predictions_detail.len(), 3);
    assert_eq!(detailed.predictions_detail[2].row_id, 2);
    let total: f64 = detailed.summary.predictions_by_class.values().map(|s| s.percentage).sum();
    assert!((total - 100.0).abs() < 0.02);
    assert!(detailed.summary.confidence_stats.is_some());
}

#[tokio::test]
async fn test_missing_columns_named_exactly() {
    let dir = tempfile::tempdir().unwrap();
    train(&dir, "DecisionTree").await;
    let registry = ModelRegistry::new(dir.path().join("models"), ModelFamily::DecisionTree);
    let model = registry.load(None, None).unwrap();

    let partial = Dataset::new(vec![DataColumn::numeric("koi_prad", vec![Some(1.0)])]).unwrap();
    match PredictionEngine::new().predict(&model, &partial) {
        Err(ExoError::SchemaMismatch { missing }) => {
            assert_eq!(missing, vec!["koi_period", "koi_pdisposition"])
        }
        other => panic!("expected SchemaMismatch, got {:?}", other),
    }
}

#[tokio::test]
async fn test_switch_keeps_previous_on_failure() {
    let dir = tempfile::tempdir().unwrap();
    train(&dir, "RandomForest").await;
    train(&dir, "NaiveBayes").await;

    let registry = ModelRegistry::new(dir.path().join("models"), ModelFamily::RandomForest);
    registry.load(None, None).unwrap();

    let switched = registry.switch("NaiveBayes");
    assert!(switched.is_ok(), "switch by family should succeed: {:?}", switched.err());
    assert_eq!(registry.model_info().unwrap().model_name, "NaiveBayes");

    assert!(matches!(registry.switch("NoSuchModel"), Err(ExoError::ArtifactNotFound(_))));
    assert_eq!(registry.model_info().unwrap().model_name, "NaiveBayes");

    let models = registry.list_available().unwrap();
    assert_eq!(models.len(), 2);
    assert_eq!(models.iter().filter(|m| m.is_current).count(), 1);
    assert!(models.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
}

#[tokio::test]
async fn test_svm_without_probability_has_no_probabilities() {
    let dir = tempfile::tempdir().unwrap();
    let config = TrainerConfig {
        models_dir: dir.path().join("models"),
        output_dir: dir.path().join("output"),
        random_state: 42,
        progress_delay: Duration::ZERO,
    };
    let trainer = Trainer::new(config, Arc::new(ProgressHub::new()));
    let mut params = serde_json::Map::new();
    params.insert("probability".to_string(), serde_json::json!(false));
    trainer
        .train(
            from_dataframe(&training_df()).unwrap(),
            TrainingRequest::new("koi_disposition", "SVM").with_hyperparameters(params),
        )
        .await
        .unwrap();

    let registry = ModelRegistry::new(dir.path().join("models"), ModelFamily::SVM);
    let model = registry.load(None, None).unwrap();
    let result = PredictionEngine::new().predict(&model, &scoring_table()).unwrap();
    assert_eq!(result.predictions.len(), 3);
    assert!(result.probabilities.is_none());
    assert!(result.confidence.is_none());
    assert!(result.metrics.average_confidence.is_none());
}

#[tokio::test]
async fn test_complete_analytics_with_ground_truth() {
    let dir = tempfile::tempdir().unwrap();
    train(&dir, "RandomForest").await;
    let registry = ModelRegistry::new(dir.path().join("models"), ModelFamily::RandomForest);
    let model = registry.load(None, None).unwrap();

    let table = from_dataframe(&training_df()).unwrap();
    let (features, target) = table.split_off("koi_disposition").unwrap();
    let truth: Vec<String> = target.data.to_labels().into_iter().flatten().collect();

    let report = analytics::complete_analytics(&model, &features, Some(&truth));
    assert!(report.is_ok(), "analytics should succeed: {:?}", report.err());
    let report = report.unwrap();
    assert!(report.statistics.performance_metrics.is_some());
    assert!(report.statistics.confidence_statistics.is_some());
    assert!(report.charts.confusion_matrix.is_some());
    assert!(report.charts.roc_curves.is_some());
    assert!(report.charts.feature_importance.is_some());
    assert_eq!(report.summary.charts_generated, 7);
    assert!(report.summary.has_ground_truth);

    let bare = analytics::prediction_statistics(&model, &features, None).unwrap();
    assert!(bare.performance_metrics.is_none());
    assert!(bare.per_class_metrics.is_none());
}
