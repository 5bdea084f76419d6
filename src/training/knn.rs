//! K-Nearest Neighbors classifier

use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::{ExoError, Result};

/// Weighting scheme for neighbors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightScheme {
    /// All neighbors have equal weight
    #[default]
    Uniform,
    /// Closer neighbors have more weight (inverse distance)
    Distance,
}

/// Neighbor search strategy requested by the caller.
///
/// Every strategy returns the exact k nearest neighbors; the search here is
/// always an exhaustive heap scan, so the choice does not change results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchAlgorithm {
    #[default]
    Auto,
    BallTree,
    KdTree,
    Brute,
}

/// KNN configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNConfig {
    /// Number of neighbors
    pub n_neighbors: usize,
    /// Weighting scheme
    pub weights: WeightScheme,
    pub algorithm: SearchAlgorithm,
    /// Score query rows on the rayon pool
    pub parallel: bool,
}

impl Default for KNNConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            weights: WeightScheme::Uniform,
            algorithm: SearchAlgorithm::Auto,
            parallel: true,
        }
    }
}

/// K-Nearest Neighbors Classifier with Euclidean distance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNClassifier {
    config: KNNConfig,
    x_train: Option<Array2<f64>>,
    y_train: Vec<usize>,
    n_classes: usize,
}

impl KNNClassifier {
    pub fn new(config: KNNConfig) -> Self {
        Self { config, x_train: None, y_train: Vec::new(), n_classes: 0 }
    }

    /// Create with default config and specified k
    pub fn with_k(k: usize) -> Self {
        Self::new(KNNConfig { n_neighbors: k, ..Default::default() })
    }

    pub fn config(&self) -> &KNNConfig {
        &self.config
    }

    /// Fit the classifier (stores training data)
    pub fn fit(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(ExoError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if self.config.n_neighbors == 0 {
            return Err(ExoError::invalid_param("n_neighbors", 0, "must be positive"));
        }
        if self.config.n_neighbors > x.nrows() {
            return Err(ExoError::invalid_param(
                "n_neighbors",
                self.config.n_neighbors,
                format!("exceeds the {} training samples", x.nrows()),
            ));
        }
        self.x_train = Some(x.clone());
        self.y_train = y.to_vec();
        self.n_classes = n_classes;
        Ok(())
    }

    /// Predict class probabilities
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let x_train = self.x_train.as_ref().ok_or(ExoError::ModelNotFitted)?;
        if x.ncols() != x_train.ncols() {
            return Err(ExoError::ShapeError {
                expected: format!("{} features", x_train.ncols()),
                actual: format!("{} features", x.ncols()),
            });
        }

        let score_row = |i: usize| {
            let neighbors = find_k_nearest(x.row(i), x_train, self.config.n_neighbors);
            self.class_probs(&neighbors)
        };
        let rows: Vec<Vec<f64>> = if self.config.parallel {
            (0..x.nrows()).into_par_iter().map(score_row).collect()
        } else {
            (0..x.nrows()).map(score_row).collect()
        };

        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        Ok(Array2::from_shape_vec((x.nrows(), self.n_classes), flat)?)
    }

    /// Predict class indices
    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.rows().into_iter().map(|row| super::argmax(&row)).collect())
    }

    fn class_probs(&self, neighbors: &[Neighbor]) -> Vec<f64> {
        let mut probs = vec![0.0; self.n_classes];
        let exact: Vec<&Neighbor> = neighbors.iter().filter(|n| n.dist == 0.0).collect();

        match self.config.weights {
            // Exact matches take all the weight under inverse-distance voting
            WeightScheme::Distance if !exact.is_empty() => {
                for n in exact {
                    probs[self.y_train[n.idx]] += 1.0;
                }
            }
            WeightScheme::Distance => {
                for n in neighbors {
                    probs[self.y_train[n.idx]] += 1.0 / n.dist;
                }
            }
            WeightScheme::Uniform => {
                for n in neighbors {
                    probs[self.y_train[n.idx]] += 1.0;
                }
            }
        }

        let total: f64 = probs.iter().sum();
        if total > 0.0 {
            for p in &mut probs {
                *p /= total;
            }
        }
        probs
    }
}

/// Max-heap entry; ties on distance prefer the lower training index
#[derive(Debug, Clone, Copy)]
struct Neighbor {
    dist: f64,
    idx: usize,
}

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist.total_cmp(&other.dist).then(self.idx.cmp(&other.idx))
    }
}

/// k nearest training rows using a bounded max-heap, O(n log k)
fn find_k_nearest(point: ArrayView1<f64>, x_train: &Array2<f64>, k: usize) -> Vec<Neighbor> {
    let mut heap = BinaryHeap::with_capacity(k + 1);

    for (idx, row) in x_train.rows().into_iter().enumerate() {
        let dist = point
            .iter()
            .zip(row.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt();
        let candidate = Neighbor { dist, idx };
        if heap.len() < k {
            heap.push(candidate);
        } else if heap.peek().map_or(false, |top| candidate < *top) {
            heap.pop();
            heap.push(candidate);
        }
    }

    heap.into_sorted_vec()
}
