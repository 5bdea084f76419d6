//! Analytics over prediction results: statistics, chart data and the
//! combined report served by the analytics endpoint

pub mod charts;
pub mod statistics;

pub use charts::{ChartType, Charts};
pub use statistics::{statistics, StatsReport};

use crate::data::Dataset;
use crate::error::Result;
use crate::inference::{PredictionEngine, RawPrediction};
use crate::registry::LoadedModel;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub total_samples: usize,
    pub predictions_generated: usize,
    pub charts_generated: usize,
    pub has_ground_truth: bool,
    pub model_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteAnalytics {
    pub statistics: StatsReport,
    pub charts: Charts,
    pub summary: AnalyticsSummary,
}

/// Predict `data` with `model` and compute statistics against the optional
/// ground truth
pub fn prediction_statistics(
    model: &LoadedModel,
    data: &Dataset,
    ground_truth: Option<&[String]>,
) -> Result<StatsReport> {
    let RawPrediction { labels, probabilities } = PredictionEngine::new().run(model, data)?;
    statistics(&labels, probabilities.as_ref(), ground_truth)
}

/// Statistics plus every chart the inputs allow
pub fn complete_analytics(
    model: &LoadedModel,
    data: &Dataset,
    ground_truth: Option<&[String]>,
) -> Result<CompleteAnalytics> {
    let RawPrediction { labels: predictions, probabilities } = PredictionEngine::new().run(model, data)?;
    let stats = statistics(&predictions, probabilities.as_ref(), ground_truth)?;

    let labels = if model.pipeline.classes.is_empty() {
        statistics::label_set(&predictions, &[])
    } else {
        model.pipeline.classes.clone()
    };

    let mut charts = Charts {
        class_distribution: Some(charts::class_distribution(&predictions, &labels)),
        ..Charts::default()
    };
    if let Some(truth) = ground_truth {
        charts.confusion_matrix = Some(charts::confusion_matrix(truth, &predictions, &labels));
        if let Some(proba) = &probabilities {
            charts.roc_curves = Some(charts::roc_curves(truth, proba, &labels));
        }
    }
    if let Some(proba) = &probabilities {
        charts.confidence_distribution = charts::confidence_distribution(proba);
        charts.probability_heatmap = Some(charts::probability_heatmap(proba, &labels));
        charts.class_probability_comparison = Some(charts::class_probability_comparison(proba, &labels));
    }
    if let Some(importances) = model.pipeline.estimator.feature_importances() {
        charts.feature_importance =
            charts::feature_importance(&model.pipeline.output_feature_names(), &importances);
    }

    let summary = AnalyticsSummary {
        total_samples: data.n_rows(),
        predictions_generated: predictions.len(),
        charts_generated: charts.count(),
        has_ground_truth: ground_truth.is_some(),
        model_name: model.pipeline.family.to_string(),
    };
    info!(
        model = %summary.model_name,
        rows = summary.total_samples,
        charts = summary.charts_generated,
        "Analytics generated"
    );

    Ok(CompleteAnalytics { statistics: stats, charts, summary })
}
