//! Error types for the server

use crate::error::ExoError;
use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Exo(#[from] ExoError),

    #[error("Invalid upload: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) | ServerError::Multipart(_) => StatusCode::BAD_REQUEST,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Exo(e) => match e {
                ExoError::NotLoaded => StatusCode::SERVICE_UNAVAILABLE,
                ExoError::ArtifactNotFound(_) => StatusCode::NOT_FOUND,
                ExoError::SchemaMismatch { .. }
                | ExoError::MissingTargetColumn(_)
                | ExoError::UnknownModelFamily(_)
                | ExoError::InvalidParameter { .. }
                | ExoError::InsufficientData(_)
                | ExoError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                ExoError::FitFailure(_) => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(detail = %self, "Internal server error");
            match &self {
                ServerError::Exo(ExoError::IoError(_)) => "A file system error occurred".to_string(),
                other => other.to_string(),
            }
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": true,
            "message": message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
