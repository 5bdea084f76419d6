//! API route definitions

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::warn;

use super::{handlers, state::AppState, ws, ServerConfig};

async fn handle_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": true,
            "message": "Not found. Visit / for the endpoint list or /health to check API status.",
        })),
    )
}

async fn handle_405() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({
            "error": true,
            "message": "Method not allowed. Check the endpoint list at / for supported methods.",
        })),
    )
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origin = config.cors_origin.as_deref().and_then(|o| match o.parse::<HeaderValue>() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(origin = %o, error = %e, "Ignoring invalid CORS_ORIGIN");
            None
        }
    });
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match origin {
        Some(origin) => cors.allow_origin(origin),
        None => cors.allow_origin(Any),
    }
}

/// Create the main application router
pub fn create_router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    let api_routes = Router::new()
        // Models
        .route("/model/info", get(handlers::model_info))
        .route("/model/features", get(handlers::model_features))
        .route("/model/metrics", get(handlers::model_metrics))
        .route("/models", get(handlers::list_models))
        .route("/models/switch", post(handlers::switch_model))
        // Prediction
        .route("/predict", post(handlers::predict))
        .route("/predict/batch", post(handlers::predict_batch))
        .route("/predict/json", post(handlers::predict_json))
        // Analytics
        .route("/analytics", post(handlers::analytics))
        .route("/analytics/statistics", post(handlers::analytics_statistics))
        .route("/analytics/plots/types", get(handlers::chart_types))
        // Training
        .route("/training/models", get(handlers::training_models))
        .route("/training/hyperparameters/:family", get(handlers::training_hyperparameters))
        .route("/training/validate", post(handlers::training_validate))
        .route("/training/train", post(handlers::training_train))
        .route("/training/history", get(handlers::training_history))
        .fallback(handle_404)
        .method_not_allowed_fallback(handle_405);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .route("/ws", get(ws::global))
        .route("/ws/training/:session_id", get(ws::training_session))
        .nest("/api", api_routes)
        .fallback(handle_404)
        .method_not_allowed_fallback(handle_405)
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_upload_size))
        .layer(CompressionLayer::new())
        .layer(cors_layer(config))
        .layer(TraceLayer::new_for_http())
}
