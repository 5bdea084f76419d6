//! Application state management

use super::ServerConfig;
use crate::inference::PredictionEngine;
use crate::progress::ProgressHub;
use crate::registry::ModelRegistry;
use crate::training::Trainer;
use std::sync::Arc;

/// Application state shared across handlers
pub struct AppState {
    pub config: ServerConfig,
    pub registry: ModelRegistry,
    pub trainer: Trainer,
    pub hub: Arc<ProgressHub>,
    pub engine: PredictionEngine,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let hub = Arc::new(ProgressHub::new());
        Self {
            registry: ModelRegistry::new(config.models_dir.clone(), config.default_family),
            trainer: Trainer::new(config.trainer_config(), Arc::clone(&hub)),
            hub,
            engine: PredictionEngine::new(),
            config,
        }
    }
}
