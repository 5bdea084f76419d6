//! Distributional statistics over prediction results

use crate::error::{ExoError, Result};
use crate::training::metrics::{self, ClassMetrics};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const HIGH_CONFIDENCE: f64 = 0.8;
pub const MEDIUM_CONFIDENCE: f64 = 0.6;

/// Round half away from zero to `places` decimals
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Linearly interpolated quantile of an ascending slice
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
        }
    }
}

/// Highest class probability per row
pub fn confidences(probabilities: &Array2<f64>) -> Vec<f64> {
    probabilities
        .rows()
        .into_iter()
        .map(|row| row.iter().copied().fold(f64::NEG_INFINITY, f64::max))
        .collect()
}

/// Summary of a sample, unrounded; population standard deviation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub q1: f64,
    pub q3: f64,
}

impl Summary {
    /// `None` for an empty sample
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len() as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Some(Self {
            mean,
            std: variance.sqrt(),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            median: quantile(&sorted, 0.5),
            q1: quantile(&sorted, 0.25),
            q3: quantile(&sorted, 0.75),
        })
    }

    pub fn rounded(&self, places: i32) -> Self {
        Self {
            mean: round_to(self.mean, places),
            std: round_to(self.std, places),
            min: round_to(self.min, places),
            max: round_to(self.max, places),
            median: round_to(self.median, places),
            q1: round_to(self.q1, places),
            q3: round_to(self.q3, places),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CountShare {
    pub count: usize,
    /// Percent of all rows, 2 decimals
    pub percentage: f64,
}

impl CountShare {
    pub fn new(count: usize, total: usize) -> Self {
        let percentage = if total == 0 { 0.0 } else { round_to(count as f64 / total as f64 * 100.0, 2) };
        Self { count, percentage }
    }
}

/// Count and share of every distinct label, keyed by label
pub fn distribution(labels: &[String]) -> BTreeMap<String, CountShare> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for label in labels {
        *counts.entry(label.clone()).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(label, count)| (label, CountShare::new(count, labels.len())))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceRanges {
    #[serde(rename = "high (>= 0.8)")]
    pub high: CountShare,
    #[serde(rename = "medium (0.6-0.8)")]
    pub medium: CountShare,
    #[serde(rename = "low (< 0.6)")]
    pub low: CountShare,
}

impl ConfidenceRanges {
    pub fn of(confidences: &[f64]) -> Self {
        let n = confidences.len();
        let high = confidences.iter().filter(|&&c| c >= HIGH_CONFIDENCE).count();
        let medium = confidences
            .iter()
            .filter(|&&c| (MEDIUM_CONFIDENCE..HIGH_CONFIDENCE).contains(&c))
            .count();
        Self {
            high: CountShare::new(high, n),
            medium: CountShare::new(medium, n),
            low: CountShare::new(n - high - medium, n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub accuracy: f64,
    pub precision_macro: f64,
    pub recall_macro: f64,
    pub f1_macro: f64,
}

/// Statistics over one batch of predictions; optional sections are present
/// only when their input was supplied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    pub total_predictions: usize,
    pub unique_classes: usize,
    pub class_distribution: BTreeMap<String, CountShare>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_statistics: Option<Summary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_ranges: Option<ConfidenceRanges>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance_metrics: Option<PerformanceMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_class_metrics: Option<BTreeMap<String, ClassMetrics>>,
}

/// Sorted union of two label sequences
pub fn label_set(a: &[String], b: &[String]) -> Vec<String> {
    let mut labels: Vec<String> = a.iter().chain(b).cloned().collect();
    labels.sort();
    labels.dedup();
    labels
}

/// Positions of `values` in the sorted `labels`
pub fn encode(values: &[String], labels: &[String]) -> Vec<usize> {
    values
        .iter()
        .map(|v| labels.binary_search(v).unwrap_or(labels.len()))
        .collect()
}

pub fn statistics(
    predictions: &[String],
    probabilities: Option<&Array2<f64>>,
    ground_truth: Option<&[String]>,
) -> Result<StatsReport> {
    let class_distribution = distribution(predictions);
    let mut report = StatsReport {
        total_predictions: predictions.len(),
        unique_classes: class_distribution.len(),
        class_distribution,
        confidence_statistics: None,
        confidence_ranges: None,
        performance_metrics: None,
        per_class_metrics: None,
    };

    if let Some(probabilities) = probabilities {
        if probabilities.nrows() != predictions.len() {
            return Err(ExoError::ShapeError {
                expected: format!("{} probability rows", predictions.len()),
                actual: probabilities.nrows().to_string(),
            });
        }
        let conf = confidences(probabilities);
        report.confidence_statistics = Summary::of(&conf).map(|s| s.rounded(4));
        report.confidence_ranges = Some(ConfidenceRanges::of(&conf));
    }

    if let Some(truth) = ground_truth {
        if truth.len() != predictions.len() {
            return Err(ExoError::InvalidInput(format!(
                "ground truth has {} rows but there are {} predictions",
                truth.len(),
                predictions.len()
            )));
        }
        let labels = label_set(truth, predictions);
        let y_true = encode(truth, &labels);
        let y_pred = encode(predictions, &labels);

        let scores = metrics::evaluate(&y_true, &y_pred, labels.len());
        report.performance_metrics = Some(PerformanceMetrics {
            accuracy: round_to(scores.accuracy, 4),
            precision_macro: round_to(scores.precision_macro, 4),
            recall_macro: round_to(scores.recall_macro, 4),
            f1_macro: round_to(scores.f1_macro, 4),
        });

        let per_class = metrics::classification_report(&y_true, &y_pred, &labels)
            .classes
            .into_iter()
            .map(|(label, m)| {
                let rounded = ClassMetrics {
                    precision: round_to(m.precision, 4),
                    recall: round_to(m.recall, 4),
                    f1_score: round_to(m.f1_score, 4),
                    support: m.support,
                };
                (label, rounded)
            })
            .collect();
        report.per_class_metrics = Some(per_class);
    }

    Ok(report)
}
