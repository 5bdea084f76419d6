//! Prediction engine
//!
//! Runs the current pipeline against a table:
//! - Column validation and alignment against the feature schema
//! - Label prediction
//! - Best-effort class probabilities and per-row confidence
//! - Batch summaries by class

use crate::analytics::statistics::{confidences, distribution, round_to, CountShare, Summary};
use crate::data::Dataset;
use crate::error::Result;
use crate::registry::LoadedModel;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionMetrics {
    pub total_predictions: usize,
    pub class_distribution: BTreeMap<String, usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_confidence: Option<f64>,
}

/// Labels with optional probabilities and confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub predictions: Vec<String>,
    pub probabilities: Option<Vec<Vec<f64>>>,
    pub confidence: Option<Vec<f64>>,
    pub metrics: PredictionMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowPrediction {
    pub row_id: usize,
    pub prediction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<BTreeMap<String, f64>>,
}

/// Mean, std, min, max and median of the per-row confidence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceStats {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_samples: usize,
    pub predictions_by_class: BTreeMap<String, CountShare>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_stats: Option<ConfidenceStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedPrediction {
    pub predictions_detail: Vec<RowPrediction>,
    pub summary: BatchSummary,
    pub metrics: PredictionMetrics,
}

/// Raw output of one pipeline run, shared by the prediction and analytics
/// paths
#[derive(Debug, Clone)]
pub struct RawPrediction {
    pub labels: Vec<String>,
    pub probabilities: Option<Array2<f64>>,
}

/// Stateless runner over a loaded model
#[derive(Debug, Clone, Copy, Default)]
pub struct PredictionEngine;

impl PredictionEngine {
    pub fn new() -> Self {
        Self
    }

    /// Align `data` to the model's schema and predict every row.
    ///
    /// Probabilities are `None` when the estimator cannot produce them.
    pub fn run(&self, model: &LoadedModel, data: &Dataset) -> Result<RawPrediction> {
        let start = Instant::now();
        let aligned = model.schema.align(data)?;
        let x = model.pipeline.features(&aligned)?;
        let labels = model
            .pipeline
            .predict_indices(&x)?
            .into_iter()
            .map(|i| model.pipeline.label(i))
            .collect::<Result<Vec<_>>>()?;
        let probabilities = model.pipeline.predict_proba(&x);

        debug!(
            model = %model.name,
            rows = labels.len(),
            probabilities = probabilities.is_some(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "Prediction complete"
        );
        Ok(RawPrediction { labels, probabilities })
    }

    pub fn predict(&self, model: &LoadedModel, data: &Dataset) -> Result<PredictionResult> {
        let RawPrediction { labels, probabilities } = self.run(model, data)?;
        let confidence = probabilities.as_ref().map(confidences);
        let metrics = Self::metrics(&labels, confidence.as_deref());

        Ok(PredictionResult {
            predictions: labels,
            probabilities: probabilities.map(|p| p.rows().into_iter().map(|r| r.to_vec()).collect()),
            confidence,
            metrics,
        })
    }

    pub fn predict_detailed(&self, model: &LoadedModel, data: &Dataset) -> Result<DetailedPrediction> {
        let RawPrediction { labels, probabilities } = self.run(model, data)?;
        let confidence = probabilities.as_ref().map(confidences);
        let classes = &model.pipeline.classes;

        let predictions_detail = labels
            .iter()
            .enumerate()
            .map(|(row_id, label)| RowPrediction {
                row_id,
                prediction: label.clone(),
                confidence: confidence.as_ref().map(|c| c[row_id]),
                probabilities: probabilities.as_ref().map(|p| {
                    classes.iter().cloned().zip(p.row(row_id).iter().copied()).collect()
                }),
            })
            .collect();

        let summary = BatchSummary {
            total_samples: labels.len(),
            predictions_by_class: distribution(&labels),
            confidence_stats: confidence
                .as_deref()
                .and_then(Summary::of)
                .map(|s| s.rounded(4))
                .map(|s| ConfidenceStats { mean: s.mean, std: s.std, min: s.min, max: s.max, median: s.median }),
        };
        let metrics = Self::metrics(&labels, confidence.as_deref());

        Ok(DetailedPrediction { predictions_detail, summary, metrics })
    }

    fn metrics(labels: &[String], confidence: Option<&[f64]>) -> PredictionMetrics {
        let class_distribution = distribution(labels)
            .into_iter()
            .map(|(label, share)| (label, share.count))
            .collect();
        let average_confidence = confidence
            .filter(|c| !c.is_empty())
            .map(|c| round_to(c.iter().sum::<f64>() / c.len() as f64, 4));
        PredictionMetrics { total_predictions: labels.len(), class_distribution, average_confidence }
    }
}
