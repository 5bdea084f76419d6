//! Random Forest classifier
//!
//! Bootstrap-aggregated Gini trees with per-split feature subsampling.
//! Class probabilities are the mean of the trees' leaf class fractions.

use super::decision_tree::{Criterion, DecisionTree};
use crate::error::{ExoError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// How many candidate features each split looks at
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxFeatures {
    Sqrt,
    Log2,
    All,
}

impl MaxFeatures {
    /// Candidate count for `n_features` inputs, at least one
    fn resolve(self, n_features: usize) -> usize {
        let n = n_features as f64;
        let k = match self {
            MaxFeatures::Sqrt => n.sqrt() as usize,
            MaxFeatures::Log2 => n.log2() as usize,
            MaxFeatures::All => n_features,
        };
        k.clamp(1, n_features.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub random_state: Option<u64>,
    trees: Vec<DecisionTree>,
    n_classes: usize,
    importances: Option<Array1<f64>>,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new(100)
    }
}

impl RandomForest {
    pub fn new(n_estimators: usize) -> Self {
        Self {
            n_estimators,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            random_state: None,
            trees: Vec::new(),
            n_classes: 0,
            importances: None,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Unfitted tree sharing this forest's growth limits
    fn blank_tree(&self, max_features: usize, seed: u64) -> DecisionTree {
        let tree = DecisionTree::new_classifier()
            .with_criterion(Criterion::Gini)
            .with_min_samples_split(self.min_samples_split)
            .with_min_samples_leaf(self.min_samples_leaf)
            .with_max_features(max_features)
            .with_random_state(seed);
        match self.max_depth {
            Some(depth) => tree.with_max_depth(depth),
            None => tree,
        }
    }

    /// Grow one tree from its own seeded stream
    fn grow(&self, x: &Array2<f64>, y: &[usize], n_classes: usize, max_features: usize, seed: u64) -> Result<DecisionTree> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let n = x.nrows();
        let mut tree = self.blank_tree(max_features, rng.gen());

        if self.bootstrap {
            let rows: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            let labels: Vec<usize> = rows.iter().map(|&r| y[r]).collect();
            tree.fit_classifier(&x.select(Axis(0), &rows), &labels, n_classes)?;
        } else {
            tree.fit_classifier(x, y, n_classes)?;
        }
        Ok(tree)
    }

    /// Fit every tree in parallel. Tree `i` is seeded with `random_state + i`,
    /// so the result is independent of thread scheduling.
    pub fn fit(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize) -> Result<&mut Self> {
        if x.nrows() != y.len() {
            return Err(ExoError::ShapeError {
                expected: format!("{} labels", x.nrows()),
                actual: format!("{} labels", y.len()),
            });
        }
        if self.n_estimators == 0 {
            return Err(ExoError::invalid_param("n_estimators", 0, "must be positive"));
        }

        let max_features = self.max_features.resolve(x.ncols());
        let base = self.random_state.unwrap_or(super::DEFAULT_RANDOM_STATE);
        let trees = (0..self.n_estimators as u64)
            .into_par_iter()
            .map(|i| self.grow(x, y, n_classes, max_features, base.wrapping_add(i)))
            .collect::<Result<Vec<_>>>()?;

        self.importances = Some(mean_importances(&trees, x.ncols()));
        self.trees = trees;
        self.n_classes = n_classes;
        Ok(self)
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.trees.is_empty() {
            return Err(ExoError::ModelNotFitted);
        }
        let shape = (x.nrows(), self.n_classes);
        let sum = self
            .trees
            .par_iter()
            .map(|tree| tree.predict_proba(x))
            .try_reduce(|| Array2::zeros(shape), |acc, p| Ok(acc + p))?;
        Ok(sum / self.trees.len() as f64)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.rows().into_iter().map(|row| super::argmax(&row)).collect())
    }

    /// Impurity decrease summed over trees, normalized to one
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.importances.as_ref()
    }
}

fn mean_importances(trees: &[DecisionTree], n_features: usize) -> Array1<f64> {
    let summed = trees
        .iter()
        .filter_map(DecisionTree::feature_importances)
        .fold(Array1::zeros(n_features), |acc, imp| acc + imp);
    let total = summed.sum();
    if total > 0.0 {
        summed / total
    } else {
        summed
    }
}
