//! Classification metrics over class indices
//!
//! Macro averages weight every class equally; a class with no predicted (or
//! no true) rows contributes 0 rather than NaN.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

/// Headline metrics recorded for every trained model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub f1_macro: f64,
    pub precision_macro: f64,
    pub recall_macro: f64,
}

/// Precision/recall/F1 of a single class (or an average row)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    #[serde(rename = "f1-score")]
    pub f1_score: f64,
    pub support: usize,
}

/// Per-class report with `accuracy`, `macro avg` and `weighted avg` rows.
///
/// Serialized as a flat map keyed by class label followed by the aggregate
/// rows.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "BTreeMap<String, ReportEntry>")]
pub struct ClassificationReport {
    pub classes: Vec<(String, ClassMetrics)>,
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ReportEntry {
    Row(ClassMetrics),
    Scalar(f64),
}

const ACCURACY_KEY: &str = "accuracy";
const MACRO_KEY: &str = "macro avg";
const WEIGHTED_KEY: &str = "weighted avg";

impl Serialize for ClassificationReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.classes.len() + 3))?;
        for (label, metrics) in &self.classes {
            map.serialize_entry(label, metrics)?;
        }
        map.serialize_entry(ACCURACY_KEY, &self.accuracy)?;
        map.serialize_entry(MACRO_KEY, &self.macro_avg)?;
        map.serialize_entry(WEIGHTED_KEY, &self.weighted_avg)?;
        map.end()
    }
}

impl From<BTreeMap<String, ReportEntry>> for ClassificationReport {
    fn from(entries: BTreeMap<String, ReportEntry>) -> Self {
        let empty = ClassMetrics { precision: 0.0, recall: 0.0, f1_score: 0.0, support: 0 };
        let mut report = ClassificationReport {
            classes: Vec::new(),
            accuracy: 0.0,
            macro_avg: empty,
            weighted_avg: empty,
        };
        for (key, entry) in entries {
            match (key.as_str(), entry) {
                (ACCURACY_KEY, ReportEntry::Scalar(v)) => report.accuracy = v,
                (MACRO_KEY, ReportEntry::Row(m)) => report.macro_avg = m,
                (WEIGHTED_KEY, ReportEntry::Row(m)) => report.weighted_avg = m,
                (_, ReportEntry::Row(m)) => report.classes.push((key, m)),
                (_, ReportEntry::Scalar(_)) => {}
            }
        }
        report
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    }
}

/// `matrix[true][predicted]` counts
pub fn confusion_matrix(y_true: &[usize], y_pred: &[usize], n_classes: usize) -> Vec<Vec<usize>> {
    let mut matrix = vec![vec![0usize; n_classes]; n_classes];
    for (&t, &p) in y_true.iter().zip(y_pred) {
        if t < n_classes && p < n_classes {
            matrix[t][p] += 1;
        }
    }
    matrix
}

pub fn accuracy(y_true: &[usize], y_pred: &[usize]) -> f64 {
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    ratio(correct, y_true.len())
}

/// Per-class metrics for classes `0..n_classes`
pub fn per_class(y_true: &[usize], y_pred: &[usize], n_classes: usize) -> Vec<ClassMetrics> {
    let matrix = confusion_matrix(y_true, y_pred, n_classes);
    (0..n_classes)
        .map(|c| {
            let tp = matrix[c][c];
            let predicted: usize = matrix.iter().map(|row| row[c]).sum();
            let support: usize = matrix[c].iter().sum();
            let precision = ratio(tp, predicted);
            let recall = ratio(tp, support);
            ClassMetrics { precision, recall, f1_score: f1(precision, recall), support }
        })
        .collect()
}

fn macro_average(rows: &[ClassMetrics]) -> ClassMetrics {
    let n = rows.len().max(1) as f64;
    ClassMetrics {
        precision: rows.iter().map(|m| m.precision).sum::<f64>() / n,
        recall: rows.iter().map(|m| m.recall).sum::<f64>() / n,
        f1_score: rows.iter().map(|m| m.f1_score).sum::<f64>() / n,
        support: rows.iter().map(|m| m.support).sum(),
    }
}

fn weighted_average(rows: &[ClassMetrics]) -> ClassMetrics {
    let total: usize = rows.iter().map(|m| m.support).sum();
    let weigh = |f: fn(&ClassMetrics) -> f64| -> f64 {
        if total == 0 {
            0.0
        } else {
            rows.iter().map(|m| f(m) * m.support as f64).sum::<f64>() / total as f64
        }
    };
    ClassMetrics {
        precision: weigh(|m| m.precision),
        recall: weigh(|m| m.recall),
        f1_score: weigh(|m| m.f1_score),
        support: total,
    }
}

/// Classes that occur in either the truth or the predictions, ascending
fn observed_classes(y_true: &[usize], y_pred: &[usize]) -> Vec<usize> {
    let mut seen: Vec<usize> = y_true.iter().chain(y_pred).copied().collect();
    seen.sort_unstable();
    seen.dedup();
    seen
}

/// Accuracy and macro scores averaged over the classes that were observed
pub fn evaluate(y_true: &[usize], y_pred: &[usize], n_classes: usize) -> ClassificationMetrics {
    let rows = per_class(y_true, y_pred, n_classes);
    let observed: Vec<ClassMetrics> = observed_classes(y_true, y_pred)
        .into_iter()
        .filter(|&c| c < n_classes)
        .map(|c| rows[c])
        .collect();
    let avg = macro_average(&observed);
    ClassificationMetrics {
        accuracy: accuracy(y_true, y_pred),
        f1_macro: avg.f1_score,
        precision_macro: avg.precision,
        recall_macro: avg.recall,
    }
}

/// Full report over the observed classes, labelled with `labels[class]`
pub fn classification_report(y_true: &[usize], y_pred: &[usize], labels: &[String]) -> ClassificationReport {
    let rows = per_class(y_true, y_pred, labels.len());
    let classes: Vec<(String, ClassMetrics)> = observed_classes(y_true, y_pred)
        .into_iter()
        .filter(|&c| c < labels.len())
        .map(|c| (labels[c].clone(), rows[c]))
        .collect();
    let observed: Vec<ClassMetrics> = classes.iter().map(|(_, m)| *m).collect();

    ClassificationReport {
        accuracy: accuracy(y_true, y_pred),
        macro_avg: macro_average(&observed),
        weighted_avg: weighted_average(&observed),
        classes,
    }
}
