//! Integration test: HTTP API through the router

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use exo_classifier::server::{create_router, AppState, ServerConfig};
use exo_classifier::training::ModelFamily;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const BOUNDARY: &str = "exo-test-boundary";

fn config(dir: &tempfile::TempDir) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        models_dir: dir.path().join("models"),
        output_dir: dir.path().join("output"),
        max_upload_size: 10 * 1024 * 1024,
        default_family: ModelFamily::RandomForest,
        progress_delay: Duration::ZERO,
        cors_origin: None,
    }
}

fn app(dir: &tempfile::TempDir) -> Router {
    let config = config(dir);
    create_router(Arc::new(AppState::new(config.clone())), &config)
}

fn training_csv() -> String {
    let mut csv = String::from("koi_period,koi_prad,koi_disposition\n");
    for i in 0..30 {
        if i % 2 == 0 {
            csv.push_str(&format!("{},{},FALSE POSITIVE\n", 1.0 + i as f64 * 0.1, 0.5 + (i % 3) as f64));
        } else {
            csv.push_str(&format!("{},{},CONFIRMED\n", 40.0 + i as f64, 2.0 + (i % 4) as f64));
        }
    }
    csv
}

/// `multipart/form-data` body with one CSV file part and text fields
fn multipart(filename: &str, csv: &str, fields: &[(&str, &str)]) -> Request<Body> {
    multipart_to("/api/predict", filename, csv, fields)
}

fn multipart_to(uri: &str, filename: &str, csv: &str, fields: &[(&str, &str)]) -> Request<Body> {
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
            BOUNDARY, name, value
        ));
    }
    body.push_str(&format!(
        "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: text/csv\r\n\r\n{}\r\n",
        BOUNDARY, filename, csv
    ));
    body.push_str(&format!("--{}--\r\n", BOUNDARY));

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, value: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(value.to_string()))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health_and_root() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["model_loaded"], false);

    let (status, body) = send(&app, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "active");
    assert_eq!(body["endpoints"]["training_progress"], "/ws/training/{session_id}");
}

#[tokio::test]
async fn test_model_routes_without_model() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);

    let (status, body) = send(&app, get("/api/model/info")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], true);

    let (status, _) = send(&app, post_json("/api/predict/json", json!({ "data": { "koi_period": 1.0 } }))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, body) = send(&app, post_json("/api/predict/json", json!({ "rows": [] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "JSON must contain 'data' key");

    let (status, body) = send(&app, get("/api/models")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn test_catalog_routes() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);

    let (status, body) = send(&app, get("/api/training/models")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["models"].as_array().unwrap().len(), ModelFamily::ALL.len());

    let (status, body) = send(&app, get("/api/training/hyperparameters/RandomForest")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["hyperparameters"]["n_estimators"].is_object());

    let (status, body) = send(&app, get("/api/training/hyperparameters/XGBoost")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], true);

    let (status, body) = send(&app, get("/api/analytics/plots/types")).await;
    assert_eq!(status, StatusCode::OK);
    let plots = body["available_plots"].as_array().unwrap();
    assert_eq!(plots.len(), 7);
    assert!(plots.iter().any(|p| p["name"] == "confusion_matrix" && p["requires_ground_truth"] == true));
}

#[tokio::test]
async fn test_unknown_route_and_method() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);

    let (status, body) = send(&app, get("/api/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], true);

    let (status, body) = send(&app, post_json("/health", json!({}))).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["error"], true);
}

#[tokio::test]
async fn test_non_csv_upload_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);

    let (status, body) = send(&app, multipart("data.txt", "a,b\n1,2\n", &[])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "File must be a CSV");
}

#[tokio::test]
async fn test_train_switch_and_predict() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);

    let request = multipart_to(
        "/api/training/train",
        "koi.csv",
        &training_csv(),
        &[("target_column", "koi_disposition"), ("model_name", "DecisionTree"), ("session_id", "abc")],
    );
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK, "training failed: {}", body);
    assert_eq!(body["status"], "success");
    assert_eq!(body["session_id"], "abc");
    assert_eq!(body["model_name"], "DecisionTree");

    // the registry only picks up the artifact when asked
    let (status, _) = send(&app, get("/api/model/info")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, body) = send(&app, post_json("/api/models/switch", json!({ "model_name": "DecisionTree" }))).await;
    assert_eq!(status, StatusCode::OK, "switch failed: {}", body);
    assert_eq!(body["model_info"]["model_name"], "DecisionTree");

    let (status, body) = send(&app, post_json("/api/models/switch", json!({ "model_name": "Missing" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND, "unexpected body: {}", body);

    let csv = "koi_prad,koi_period,extra\n1.0,1.5,x\n3.0,60.0,y\n";
    let (status, body) = send(&app, multipart("score.csv", csv, &[])).await;
    assert_eq!(status, StatusCode::OK, "predict failed: {}", body);
    assert_eq!(body["total_rows"], 2);
    assert_eq!(body["predictions"].as_array().unwrap().len(), 2);

    let (status, body) = send(&app, multipart("score.csv", "koi_prad\n1.0\n", &[])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("koi_period"));

    let (status, body) = send(&app, post_json("/api/predict/json", json!({ "data": { "koi_period": 2.0, "koi_prad": 1.0 } }))).await;
    assert_eq!(status, StatusCode::OK, "predict/json failed: {}", body);
    assert!(body["prediction"].is_string());

    let (status, body) = send(&app, multipart_to("/api/analytics/statistics", "truth.csv", &training_csv(), &[])).await;
    assert_eq!(status, StatusCode::OK, "statistics failed: {}", body);
    assert_eq!(body["total_samples"], 30);
    assert!(body["statistics"]["performance_metrics"].is_object());

    let (status, body) = send(&app, get("/api/training/history")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
}

#[tokio::test]
async fn test_train_rejects_bad_form() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);

    let (status, body) = send(&app, multipart_to("/api/training/train", "koi.csv", &training_csv(), &[])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Missing form field 'target_column'");

    let request = multipart_to(
        "/api/training/train",
        "koi.csv",
        &training_csv(),
        &[("target_column", "koi_disposition"), ("hyperparameters", "[1,2]")],
    );
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = multipart_to(
        "/api/training/train",
        "koi.csv",
        &training_csv(),
        &[("target_column", "koi_disposition"), ("model_name", "XGBoost")],
    );
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
