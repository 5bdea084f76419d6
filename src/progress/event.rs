//! Training progress messages

use crate::training::metrics::ClassificationMetrics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Phase of a training run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Preprocessing,
    Training,
    Evaluation,
    Saving,
    Complete,
    Error,
}

/// Message pushed to subscribers of a training session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub session_id: String,
    /// Percentage in `0..=100`
    pub progress: u8,
    pub stage: Stage,
    pub message: String,
    pub metrics: BTreeMap<String, f64>,
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

impl ProgressEvent {
    pub const KIND: &'static str = "training_progress";

    pub fn new(session_id: &str, progress: u8, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            kind: Self::KIND.to_string(),
            session_id: session_id.to_string(),
            progress,
            stage,
            message: message.into(),
            metrics: BTreeMap::new(),
        }
    }

    /// Attach summary metrics rounded to 4 decimals
    pub fn with_metrics(mut self, metrics: &ClassificationMetrics) -> Self {
        self.metrics = BTreeMap::from([
            ("accuracy".to_string(), round4(metrics.accuracy)),
            ("f1_score".to_string(), round4(metrics.f1_macro)),
            ("precision".to_string(), round4(metrics.precision_macro)),
            ("recall".to_string(), round4(metrics.recall_macro)),
        ]);
        self
    }

    pub fn failed(session_id: &str, error: impl std::fmt::Display) -> Self {
        Self::new(session_id, 0, Stage::Error, format!("Training failed: {}", error))
    }
}
