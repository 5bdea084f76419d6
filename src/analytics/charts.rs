//! Chart data for the analytics endpoints
//!
//! Each chart is emitted as plain arrays; rendering is left to the client.

use super::statistics::{confidences, encode, label_set, round_to, Summary};
use crate::training::metrics;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

pub const HISTOGRAM_BINS: usize = 30;
pub const HEATMAP_MAX_ROWS: usize = 50;
pub const TOP_FEATURES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    ClassDistribution,
    ConfusionMatrix,
    ConfidenceDistribution,
    ProbabilityHeatmap,
    RocCurves,
    FeatureImportance,
    ClassProbabilityComparison,
}

impl ChartType {
    pub const ALL: [ChartType; 7] = [
        ChartType::ClassDistribution,
        ChartType::ConfusionMatrix,
        ChartType::ConfidenceDistribution,
        ChartType::ProbabilityHeatmap,
        ChartType::RocCurves,
        ChartType::FeatureImportance,
        ChartType::ClassProbabilityComparison,
    ];

    pub fn description(&self) -> &'static str {
        match self {
            ChartType::ClassDistribution => "Count of predictions per class",
            ChartType::ConfusionMatrix => "True versus predicted classes (requires ground truth)",
            ChartType::ConfidenceDistribution => "Histogram and box statistics of prediction confidence",
            ChartType::ProbabilityHeatmap => "Class probabilities for a sample of rows",
            ChartType::RocCurves => "One-vs-rest ROC curves (requires ground truth)",
            ChartType::FeatureImportance => "Most important model features",
            ChartType::ClassProbabilityComparison => "Probability spread for each class",
        }
    }

    pub fn requires_ground_truth(&self) -> bool {
        matches!(self, ChartType::ConfusionMatrix | ChartType::RocCurves)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDistributionChart {
    pub labels: Vec<String>,
    pub counts: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrixChart {
    pub labels: Vec<String>,
    /// `matrix[true][predicted]`
    pub matrix: Vec<Vec<usize>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxStats {
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

impl From<Summary> for BoxStats {
    fn from(s: Summary) -> Self {
        Self { min: s.min, q1: s.q1, median: s.median, q3: s.q3, max: s.max }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceDistributionChart {
    /// `HISTOGRAM_BINS + 1` ascending edges
    pub bin_edges: Vec<f64>,
    pub counts: Vec<usize>,
    pub mean: f64,
    pub median: f64,
    pub box_plot: BoxStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityHeatmapChart {
    pub classes: Vec<String>,
    pub row_indices: Vec<usize>,
    pub values: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocCurve {
    pub label: String,
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    pub auc: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportanceChart {
    pub features: Vec<String>,
    pub importances: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassProbabilities {
    pub label: String,
    pub values: Vec<f64>,
    pub quartiles: BoxStats,
}

/// Every chart that could be built from the available inputs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Charts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_distribution: Option<ClassDistributionChart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confusion_matrix: Option<ConfusionMatrixChart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roc_curves: Option<Vec<RocCurve>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_distribution: Option<ConfidenceDistributionChart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability_heatmap: Option<ProbabilityHeatmapChart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_probability_comparison: Option<Vec<ClassProbabilities>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_importance: Option<FeatureImportanceChart>,
}

impl Charts {
    pub fn count(&self) -> usize {
        [
            self.class_distribution.is_some(),
            self.confusion_matrix.is_some(),
            self.roc_curves.is_some(),
            self.confidence_distribution.is_some(),
            self.probability_heatmap.is_some(),
            self.class_probability_comparison.is_some(),
            self.feature_importance.is_some(),
        ]
        .iter()
        .filter(|&&built| built)
        .count()
    }
}

/// Counts per class, in `labels` order
pub fn class_distribution(predictions: &[String], labels: &[String]) -> ClassDistributionChart {
    let counts = labels
        .iter()
        .map(|label| predictions.iter().filter(|p| *p == label).count())
        .collect();
    ClassDistributionChart { labels: labels.to_vec(), counts }
}

pub fn confusion_matrix(truth: &[String], predictions: &[String], labels: &[String]) -> ConfusionMatrixChart {
    let labels = label_set(labels, truth);
    let y_true = encode(truth, &labels);
    let y_pred = encode(predictions, &labels);
    ConfusionMatrixChart { matrix: metrics::confusion_matrix(&y_true, &y_pred, labels.len()), labels }
}

/// Equal-width histogram over the observed confidence range
pub fn confidence_distribution(probabilities: &Array2<f64>) -> Option<ConfidenceDistributionChart> {
    let conf = confidences(probabilities);
    let summary = Summary::of(&conf)?;

    let (lo, hi) = (summary.min, summary.max);
    let width = if hi > lo { (hi - lo) / HISTOGRAM_BINS as f64 } else { 1.0 / HISTOGRAM_BINS as f64 };
    let bin_edges = (0..=HISTOGRAM_BINS).map(|i| lo + width * i as f64).collect();
    let mut counts = vec![0usize; HISTOGRAM_BINS];
    for c in &conf {
        let bin = (((c - lo) / width) as usize).min(HISTOGRAM_BINS - 1);
        counts[bin] += 1;
    }

    let rounded = summary.rounded(4);
    Some(ConfidenceDistributionChart {
        bin_edges,
        counts,
        mean: rounded.mean,
        median: rounded.median,
        box_plot: rounded.into(),
    })
}

/// At most `HEATMAP_MAX_ROWS` evenly spaced rows
pub fn probability_heatmap(probabilities: &Array2<f64>, labels: &[String]) -> ProbabilityHeatmapChart {
    let n = probabilities.nrows();
    let row_indices: Vec<usize> = if n <= HEATMAP_MAX_ROWS {
        (0..n).collect()
    } else {
        (0..HEATMAP_MAX_ROWS).map(|i| i * n / HEATMAP_MAX_ROWS).collect()
    };
    let values = row_indices.iter().map(|&i| probabilities.row(i).to_vec()).collect();
    ProbabilityHeatmapChart { classes: labels.to_vec(), row_indices, values }
}

/// ROC points for one binary problem, one point per distinct score
fn roc_points(is_positive: &[bool], scores: &[f64]) -> Option<(Vec<f64>, Vec<f64>)> {
    let positives = is_positive.iter().filter(|&&p| p).count();
    let negatives = is_positive.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let (mut fpr, mut tpr) = (vec![0.0], vec![0.0]);
    let (mut tp, mut fp) = (0usize, 0usize);
    for (k, &i) in order.iter().enumerate() {
        if is_positive[i] {
            tp += 1;
        } else {
            fp += 1;
        }
        let last_of_score = order.get(k + 1).map_or(true, |&next| scores[next] != scores[i]);
        if last_of_score {
            fpr.push(fp as f64 / negatives as f64);
            tpr.push(tp as f64 / positives as f64);
        }
    }
    Some((fpr, tpr))
}

fn trapezoid(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| (xs[1] - xs[0]) * (ys[0] + ys[1]) / 2.0)
        .sum()
}

/// One-vs-rest curves; classes absent from (or covering all of) the truth
/// are skipped
pub fn roc_curves(truth: &[String], probabilities: &Array2<f64>, labels: &[String]) -> Vec<RocCurve> {
    labels
        .iter()
        .enumerate()
        .filter(|(j, _)| *j < probabilities.ncols())
        .filter_map(|(j, label)| {
            let positive: Vec<bool> = truth.iter().map(|t| t == label).collect();
            let scores = probabilities.column(j).to_vec();
            let (fpr, tpr) = roc_points(&positive, &scores)?;
            let auc = round_to(trapezoid(&fpr, &tpr), 4);
            Some(RocCurve { label: label.clone(), fpr, tpr, auc })
        })
        .collect()
}

/// Top features by importance; `None` when names and values disagree in length
pub fn feature_importance(names: &[String], importances: &[f64]) -> Option<FeatureImportanceChart> {
    if names.is_empty() || names.len() != importances.len() {
        return None;
    }
    let mut order: Vec<usize> = (0..names.len()).collect();
    order.sort_by(|&a, &b| importances[b].total_cmp(&importances[a]));
    order.truncate(TOP_FEATURES);
    Some(FeatureImportanceChart {
        features: order.iter().map(|&i| names[i].clone()).collect(),
        importances: order.iter().map(|&i| round_to(importances[i], 4)).collect(),
    })
}

pub fn class_probability_comparison(probabilities: &Array2<f64>, labels: &[String]) -> Vec<ClassProbabilities> {
    labels
        .iter()
        .enumerate()
        .filter(|(j, _)| *j < probabilities.ncols())
        .filter_map(|(j, label)| {
            let values = probabilities.column(j).to_vec();
            let summary = Summary::of(&values)?.rounded(4);
            Some(ClassProbabilities { label: label.clone(), values, quartiles: summary.into() })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn labels(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_perfect_roc_has_unit_auc() {
        let truth = labels(&["a", "a", "b", "b"]);
        let proba = array![[0.9, 0.1], [0.8, 0.2], [0.3, 0.7], [0.1, 0.9]];
        let curves = roc_curves(&truth, &proba, &labels(&["a", "b"]));
        assert_eq!(curves.len(), 2);
        assert!(curves.iter().all(|c| c.auc == 1.0));
        assert_eq!(curves[0].fpr.first(), Some(&0.0));
        assert_eq!(curves[0].tpr.last(), Some(&1.0));
    }

    #[test]
    fn test_roc_skips_single_sided_class() {
        let truth = labels(&["a", "a"]);
        let proba = array![[0.9, 0.1], [0.6, 0.4]];
        assert!(roc_curves(&truth, &proba, &labels(&["a", "b"])).is_empty());
    }

    #[test]
    fn test_histogram_counts_every_row() {
        let proba = array![[0.5, 0.5], [0.9, 0.1], [0.3, 0.7], [0.99, 0.01]];
        let chart = confidence_distribution(&proba).unwrap();
        assert_eq!(chart.bin_edges.len(), HISTOGRAM_BINS + 1);
        assert_eq!(chart.counts.iter().sum::<usize>(), 4);
        assert_eq!(*chart.counts.last().unwrap(), 1);
    }

    #[test]
    fn test_heatmap_samples_evenly() {
        let proba = Array2::from_elem((200, 3), 1.0 / 3.0);
        let chart = probability_heatmap(&proba, &labels(&["a", "b", "c"]));
        assert_eq!(chart.row_indices.len(), HEATMAP_MAX_ROWS);
        assert_eq!(chart.row_indices[1], 4);
        assert_eq!(chart.values[0].len(), 3);
    }

    #[test]
    fn test_feature_importance_top_n() {
        let names: Vec<String> = (0..25).map(|i| format!("f{}", i)).collect();
        let imp: Vec<f64> = (0..25).map(|i| i as f64).collect();
        let chart = feature_importance(&names, &imp).unwrap();
        assert_eq!(chart.features.len(), TOP_FEATURES);
        assert_eq!(chart.features[0], "f24");
        assert!(feature_importance(&names, &imp[..3]).is_none());
    }

    #[test]
    fn test_confusion_matrix_includes_truth_labels() {
        let chart = confusion_matrix(&labels(&["a", "c"]), &labels(&["a", "a"]), &labels(&["a", "b"]));
        assert_eq!(chart.labels, labels(&["a", "b", "c"]));
        assert_eq!(chart.matrix[2][0], 1);
    }
}
