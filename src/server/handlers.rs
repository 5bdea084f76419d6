//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::analytics::{self, ChartType};
use crate::data::{self, Dataset};
use crate::error::ExoError;
use crate::training::{self, Trainer, TrainingRequest};

use super::error::{Result, ServerError};
use super::state::AppState;
use super::upload::UploadForm;

/// Run CPU-bound work off the async workers
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> crate::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ServerError::Internal(format!("worker task failed: {}", e)))?
        .map_err(ServerError::from)
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

// ============================================================================
// Service Handlers
// ============================================================================

pub async fn root(State(state): State<Arc<AppState>>) -> Json<Value> {
    let model = state.registry.current().ok().map(|m| m.name.clone());
    Json(json!({
        "message": "Exoplanet Classification API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "active",
        "model": model,
        "endpoints": {
            "health": "/health",
            "model_info": "/api/model/info",
            "features": "/api/model/features",
            "models": "/api/models",
            "predict": "/api/predict",
            "predict_batch": "/api/predict/batch",
            "predict_json": "/api/predict/json",
            "analytics": "/api/analytics",
            "analytics_stats": "/api/analytics/statistics",
            "plot_types": "/api/analytics/plots/types",
            "training": "/api/training/train",
            "training_progress": "/ws/training/{session_id}",
        },
    }))
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "model_loaded": state.registry.is_loaded(),
        "timestamp": now(),
    }))
}

// ============================================================================
// Model Handlers
// ============================================================================

pub async fn model_info(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let info = state.registry.model_info()?;
    Ok(Json(serde_json::to_value(info).map_err(ExoError::from)?))
}

pub async fn model_features(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let features = state.registry.expected_features()?;
    Ok(Json(json!({
        "status": "success",
        "total_features": features.all.len(),
        "features": features,
    })))
}

pub async fn model_metrics(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let model = state.registry.current()?;
    let body = match state.registry.metrics()? {
        Some(metadata) => json!({ "status": "success", "metrics": metadata }),
        None => json!({
            "status": "success",
            "metrics": {
                "model_name": model.name,
                "note": "Training metrics not available. Upload test data to calculate metrics.",
            },
        }),
    };
    Ok(Json(body))
}

pub async fn list_models(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let models = state.registry.list_available()?;
    Ok(Json(json!({
        "status": "success",
        "total": models.len(),
        "models": models,
    })))
}

#[derive(Deserialize)]
pub struct SwitchRequest {
    model_name: String,
}

pub async fn switch_model(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SwitchRequest>,
) -> Result<Json<Value>> {
    let info = state.registry.switch(&request.model_name)?;
    info!(model = %request.model_name, "Switched current model");
    Ok(Json(json!({
        "status": "success",
        "message": format!("Switched to {}", request.model_name),
        "model_info": info,
    })))
}

// ============================================================================
// Prediction Handlers
// ============================================================================

pub async fn predict(State(state): State<Arc<AppState>>, multipart: Multipart) -> Result<Json<Value>> {
    let form = UploadForm::read(multipart).await?;
    let dataset = form.dataset()?;
    let model = state.registry.current()?;
    let engine = state.engine;

    let total_rows = dataset.n_rows();
    let result = blocking(move || engine.predict(&model, &dataset)).await?;

    Ok(Json(json!({
        "status": "success",
        "filename": form.filename,
        "total_rows": total_rows,
        "predictions": result.predictions,
        "probabilities": result.probabilities,
        "confidence": result.confidence,
        "metrics": result.metrics,
        "timestamp": now(),
    })))
}

pub async fn predict_batch(State(state): State<Arc<AppState>>, multipart: Multipart) -> Result<Json<Value>> {
    let form = UploadForm::read(multipart).await?;
    let dataset = form.dataset()?;
    let model = state.registry.current()?;
    let engine = state.engine;

    let total_rows = dataset.n_rows();
    let result = blocking(move || engine.predict_detailed(&model, &dataset)).await?;

    Ok(Json(json!({
        "status": "success",
        "filename": form.filename,
        "total_rows": total_rows,
        "predictions_detail": result.predictions_detail,
        "summary": result.summary,
        "metrics": result.metrics,
        "timestamp": now(),
    })))
}

pub async fn predict_json(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    let record: Map<String, Value> = match body.get("data") {
        Some(Value::Object(record)) => record.clone(),
        Some(_) => return Err(ServerError::BadRequest("'data' must be a JSON object".to_string())),
        None => return Err(ServerError::BadRequest("JSON must contain 'data' key".to_string())),
    };
    let dataset = Dataset::from_records(&[record])?;
    let model = state.registry.current()?;
    let result = state.engine.predict(&model, &dataset)?;

    Ok(Json(json!({
        "status": "success",
        "prediction": result.predictions.first(),
        "probabilities": result.probabilities.as_ref().and_then(|p| p.first()),
        "confidence": result.confidence.as_ref().and_then(|c| c.first()),
        "timestamp": now(),
    })))
}

// ============================================================================
// Analytics Handlers
// ============================================================================

/// Split off the first recognised target column; rows without a ground
/// truth label are dropped
fn split_ground_truth(dataset: Dataset) -> (Dataset, Option<Vec<String>>) {
    let Some(target) = data::detect_target_column(&dataset) else {
        return (dataset, None);
    };
    let Some((features, column)) = dataset.split_off(&target) else {
        return (dataset, None);
    };
    let labels = column.data.to_labels();
    if labels.iter().all(Option::is_some) {
        return (features, Some(labels.into_iter().flatten().collect()));
    }
    let keep: Vec<usize> = (0..labels.len()).filter(|&i| labels[i].is_some()).collect();
    let truth = labels.into_iter().flatten().collect();
    (features.take_rows(&keep), Some(truth))
}

pub async fn analytics(State(state): State<Arc<AppState>>, multipart: Multipart) -> Result<Json<Value>> {
    let form = UploadForm::read(multipart).await?;
    let (dataset, truth) = split_ground_truth(form.dataset()?);
    let model = state.registry.current()?;

    let report = blocking(move || analytics::complete_analytics(&model, &dataset, truth.as_deref())).await?;

    Ok(Json(json!({
        "status": "success",
        "filename": form.filename,
        "analytics": report,
        "timestamp": now(),
    })))
}

pub async fn analytics_statistics(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<Value>> {
    let form = UploadForm::read(multipart).await?;
    let (dataset, truth) = split_ground_truth(form.dataset()?);
    let model = state.registry.current()?;

    let total_samples = dataset.n_rows();
    let stats =
        blocking(move || analytics::prediction_statistics(&model, &dataset, truth.as_deref())).await?;

    Ok(Json(json!({
        "status": "success",
        "filename": form.filename,
        "statistics": stats,
        "total_samples": total_samples,
        "timestamp": now(),
    })))
}

pub async fn chart_types() -> Json<Value> {
    let charts: Vec<Value> = ChartType::ALL
        .iter()
        .map(|chart| {
            json!({
                "name": chart,
                "description": chart.description(),
                "requires_ground_truth": chart.requires_ground_truth(),
            })
        })
        .collect();
    Json(json!({ "status": "success", "available_plots": charts }))
}

// ============================================================================
// Training Handlers
// ============================================================================

pub async fn training_models() -> Json<Value> {
    Json(json!({ "status": "success", "models": Trainer::families() }))
}

pub async fn training_hyperparameters(Path(family): Path<String>) -> Result<Json<Value>> {
    let hyperparameters = Trainer::hyperparameters(&family)?;
    Ok(Json(json!({
        "status": "success",
        "model_name": family,
        "hyperparameters": hyperparameters,
    })))
}

pub async fn training_validate(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<Value>> {
    let form = UploadForm::read(multipart).await?;
    let target = form.required("target_column")?;
    let dataset = form.dataset()?;
    let report = state.trainer.validate_data(&dataset, target);
    Ok(Json(json!({ "status": "success", "validation": report })))
}

/// Build a training request from the form fields
fn training_request(form: &UploadForm) -> Result<TrainingRequest> {
    let mut request = TrainingRequest::new(
        form.required("target_column")?,
        form.field("model_name").unwrap_or("RandomForest"),
    );
    if let Some(raw) = form.field("hyperparameters") {
        let hyperparameters: Map<String, Value> = serde_json::from_str(raw).map_err(|e| {
            ServerError::BadRequest(format!("hyperparameters must be a JSON object: {}", e))
        })?;
        request = request.with_hyperparameters(hyperparameters);
    }
    if let Some(raw) = form.field("test_size") {
        let test_size: f64 = raw
            .trim()
            .parse()
            .map_err(|_| ExoError::invalid_param("test_size", raw, "must be a number"))?;
        request = request.with_test_size(test_size);
    }
    let session = form
        .field("session_id")
        .map(str::to_string)
        .unwrap_or_else(training::short_id);
    Ok(request.with_session(session))
}

pub async fn training_train(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<Value>> {
    let form = UploadForm::read(multipart).await?;
    let request = training_request(&form)?;
    let dataset = form.dataset()?;

    info!(
        file = %form.filename,
        model = %request.model_name,
        target = %request.target_column,
        session = ?request.session_id,
        "Training requested"
    );
    let outcome = state.trainer.train(dataset, request).await?;
    Ok(Json(serde_json::to_value(outcome).map_err(ExoError::from)?))
}

pub async fn training_history(State(state): State<Arc<AppState>>) -> Json<Value> {
    let history = state.trainer.history();
    Json(json!({
        "status": "success",
        "total": history.len(),
        "history": history,
    }))
}
