//! Exoplanet classifier server module
//!
//! REST API for prediction, analytics and retraining, plus WebSocket
//! endpoints streaming training progress.

mod api;
mod error;
mod handlers;
mod state;
mod upload;
mod ws;

pub use api::create_router;
pub use error::ServerError;
pub use state::AppState;

use crate::training::{ModelFamily, TrainerConfig, DEFAULT_RANDOM_STATE};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub models_dir: PathBuf,
    pub output_dir: PathBuf,
    pub max_upload_size: usize,
    pub default_family: ModelFamily,
    pub progress_delay: Duration,
    /// Allowed CORS origin; any origin when unset
    pub cors_origin: Option<String>,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("API_PORT", 8000),
            models_dir: PathBuf::from(std::env::var("MODELS_DIR").unwrap_or_else(|_| "./models".to_string())),
            output_dir: PathBuf::from(std::env::var("OUTPUT_DIR").unwrap_or_else(|_| "./output".to_string())),
            max_upload_size: env_or("MAX_UPLOAD_SIZE", 100 * 1024 * 1024), // 100MB
            default_family: env_or("DEFAULT_MODEL_FAMILY", ModelFamily::RandomForest),
            progress_delay: Duration::from_millis(env_or("PROGRESS_DELAY_MS", 300)),
            cors_origin: std::env::var("CORS_ORIGIN").ok().filter(|o| !o.is_empty() && o != "*"),
        }
    }
}

impl ServerConfig {
    pub fn trainer_config(&self) -> TrainerConfig {
        TrainerConfig {
            models_dir: self.models_dir.clone(),
            output_dir: self.output_dir.clone(),
            random_state: DEFAULT_RANDOM_STATE,
            progress_delay: self.progress_delay,
        }
    }
}

/// Start the server with the given configuration
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let start_time = chrono::Utc::now();
    info!(
        models_dir = %config.models_dir.display(),
        output_dir = %config.output_dir.display(),
        started_at = %start_time.to_rfc3339(),
        "Initializing server directories"
    );
    std::fs::create_dir_all(&config.models_dir)?;
    std::fs::create_dir_all(&config.output_dir)?;

    let state = Arc::new(AppState::new(config.clone()));
    match state.registry.load(None, None) {
        Ok(model) => info!(model = %model.name, "Serving model"),
        Err(e) => warn!(error = %e, "No model loaded at startup; train or switch to one"),
    }

    let app = create_router(Arc::clone(&state), &config);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(
        address = %addr,
        max_upload_size_mb = config.max_upload_size / 1024 / 1024,
        default_family = %config.default_family,
        "Exoplanet classifier server starting"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, pid = std::process::id(), "Server listening and ready to accept connections");

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl+c");
            std::future::pending::<()>().await;
        }
        let uptime = chrono::Utc::now().signed_duration_since(start_time);
        info!(uptime_secs = uptime.num_seconds(), "Shutdown signal received, stopping server gracefully");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shut down cleanly");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.max_upload_size, 100 * 1024 * 1024);
        assert_eq!(config.trainer_config().random_state, 42);
    }
}
