//! Decision tree implementation

use crate::error::{ExoError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node; `distribution` holds class fractions for classifiers
    Leaf {
        value: f64,
        distribution: Vec<f64>,
        n_samples: usize,
    },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
    },
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Criterion {
    /// Gini impurity (classification)
    Gini,
    /// Shannon entropy in bits (classification)
    Entropy,
    /// Mean squared error (regression)
    MSE,
}

/// Training targets seen by the split search
#[derive(Clone, Copy)]
enum Target<'a> {
    Classes(&'a [usize]),
    Values(&'a Array1<f64>),
}

/// Sufficient statistics of a node, updated incrementally during the sweep
#[derive(Debug, Clone)]
struct NodeStats {
    counts: Vec<f64>,
    sum: f64,
    sq_sum: f64,
    n: usize,
}

impl NodeStats {
    fn empty(n_classes: usize) -> Self {
        Self { counts: vec![0.0; n_classes], sum: 0.0, sq_sum: 0.0, n: 0 }
    }

    fn add(&mut self, target: Target<'_>, idx: usize) {
        self.n += 1;
        match target {
            Target::Classes(y) => self.counts[y[idx]] += 1.0,
            Target::Values(y) => {
                self.sum += y[idx];
                self.sq_sum += y[idx] * y[idx];
            }
        }
    }

    fn remove(&mut self, target: Target<'_>, idx: usize) {
        self.n -= 1;
        match target {
            Target::Classes(y) => self.counts[y[idx]] -= 1.0,
            Target::Values(y) => {
                self.sum -= y[idx];
                self.sq_sum -= y[idx] * y[idx];
            }
        }
    }
}

/// Result of the best split search at one node
struct BestSplit {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
}

/// CART decision tree; classification over class indices, regression over values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Tree root
    root: Option<TreeNode>,
    /// Maximum depth
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Number of features drawn at random per split; all when `None`
    pub max_features: Option<usize>,
    /// Impurity criterion
    pub criterion: Criterion,
    /// Seed for feature sampling
    pub random_state: Option<u64>,
    n_features: usize,
    /// Zero for regression trees
    n_classes: usize,
    feature_importances: Option<Array1<f64>>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new_classifier()
    }
}

impl DecisionTree {
    /// Create a new classifier tree
    pub fn new_classifier() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            criterion: Criterion::Gini,
            random_state: None,
            n_features: 0,
            n_classes: 0,
            feature_importances: None,
        }
    }

    /// Create a new regressor tree
    pub fn new_regressor() -> Self {
        Self { criterion: Criterion::MSE, ..Self::new_classifier() }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    /// Set criterion
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Consider only `n` randomly drawn features at each split
    pub fn with_max_features(mut self, n: usize) -> Self {
        self.max_features = Some(n.max(1));
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Fit a classification tree; `y` holds class indices below `n_classes`
    pub fn fit_classifier(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize) -> Result<&mut Self> {
        if self.criterion == Criterion::MSE {
            return Err(ExoError::invalid_param("criterion", "MSE", "not valid for classification"));
        }
        check_samples(x, y.len())?;
        if let Some(&bad) = y.iter().find(|&&c| c >= n_classes) {
            return Err(ExoError::InvalidInput(format!(
                "class index {} out of range for {} classes",
                bad, n_classes
            )));
        }
        self.n_classes = n_classes;
        self.grow(x, Target::Classes(y));
        Ok(self)
    }

    /// Fit a regression tree on continuous targets
    pub fn fit_regressor(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        check_samples(x, y.len())?;
        self.criterion = Criterion::MSE;
        self.n_classes = 0;
        self.grow(x, Target::Values(y));
        Ok(self)
    }

    fn grow(&mut self, x: &Array2<f64>, target: Target<'_>) {
        let n_features = x.ncols();
        self.n_features = n_features;
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state.unwrap_or(0));
        let mut importances = vec![0.0; n_features];

        let indices: Vec<usize> = (0..x.nrows()).collect();
        self.root = Some(self.build_tree(x, target, &indices, 0, &mut importances, &mut rng));

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }
        self.feature_importances = Some(Array1::from_vec(importances));
    }

    fn node_stats(&self, target: Target<'_>, indices: &[usize]) -> NodeStats {
        let mut stats = NodeStats::empty(self.n_classes);
        for &i in indices {
            stats.add(target, i);
        }
        stats
    }

    fn build_tree(
        &self,
        x: &Array2<f64>,
        target: Target<'_>,
        indices: &[usize],
        depth: usize,
        importances: &mut [f64],
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let n_samples = indices.len();
        let stats = self.node_stats(target, indices);
        let impurity = self.impurity(&stats);

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || impurity <= 1e-12;

        if should_stop {
            return self.leaf(&stats);
        }

        let features = self.candidate_features(rng);
        let Some(best) = self.find_best_split(x, target, indices, &features, &stats, impurity) else {
            return self.leaf(&stats);
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, best.feature_idx]] <= best.threshold);

        importances[best.feature_idx] += n_samples as f64 * best.gain;

        let left = Box::new(self.build_tree(x, target, &left_indices, depth + 1, importances, rng));
        let right = Box::new(self.build_tree(x, target, &right_indices, depth + 1, importances, rng));

        TreeNode::Split {
            feature_idx: best.feature_idx,
            threshold: best.threshold,
            left,
            right,
            n_samples,
            impurity,
        }
    }

    fn candidate_features(&self, rng: &mut ChaCha8Rng) -> Vec<usize> {
        match self.max_features {
            Some(k) if k < self.n_features => {
                let mut picked = rand::seq::index::sample(rng, self.n_features, k).into_vec();
                picked.sort_unstable();
                picked
            }
            _ => (0..self.n_features).collect(),
        }
    }

    /// Sort-and-sweep search; each candidate feature is scanned in parallel
    fn find_best_split(
        &self,
        x: &Array2<f64>,
        target: Target<'_>,
        indices: &[usize],
        features: &[usize],
        parent: &NodeStats,
        parent_impurity: f64,
    ) -> Option<BestSplit> {
        let n = indices.len() as f64;

        let per_feature: Vec<Option<BestSplit>> = features
            .par_iter()
            .map(|&feature_idx| {
                let mut order = indices.to_vec();
                order.sort_by(|&a, &b| x[[a, feature_idx]].total_cmp(&x[[b, feature_idx]]));

                let mut left = NodeStats::empty(self.n_classes);
                let mut right = parent.clone();
                let mut best: Option<BestSplit> = None;

                for pos in 0..order.len().saturating_sub(1) {
                    let idx = order[pos];
                    left.add(target, idx);
                    right.remove(target, idx);

                    let value = x[[idx, feature_idx]];
                    let next = x[[order[pos + 1], feature_idx]];
                    if next <= value {
                        continue;
                    }
                    if left.n < self.min_samples_leaf || right.n < self.min_samples_leaf {
                        continue;
                    }

                    let weighted = (left.n as f64 * self.impurity(&left)
                        + right.n as f64 * self.impurity(&right))
                        / n;
                    let gain = parent_impurity - weighted;
                    if gain > best.as_ref().map_or(1e-12, |b| b.gain) {
                        let mid = (value + next) / 2.0;
                        let threshold = if mid < next { mid } else { value };
                        best = Some(BestSplit { feature_idx, threshold, gain });
                    }
                }
                best
            })
            .collect();

        // Sequential reduction keeps the lowest feature index on ties
        per_feature.into_iter().flatten().fold(None, |acc: Option<BestSplit>, cand| match acc {
            Some(cur) if cur.gain >= cand.gain => Some(cur),
            _ => Some(cand),
        })
    }

    fn impurity(&self, stats: &NodeStats) -> f64 {
        if stats.n == 0 {
            return 0.0;
        }
        let n = stats.n as f64;
        match self.criterion {
            Criterion::Gini => 1.0 - stats.counts.iter().map(|&c| (c / n).powi(2)).sum::<f64>(),
            Criterion::Entropy => -stats
                .counts
                .iter()
                .filter(|&&c| c > 0.0)
                .map(|&c| {
                    let p = c / n;
                    p * p.log2()
                })
                .sum::<f64>(),
            // Var = E[X²] - E[X]²
            Criterion::MSE => (stats.sq_sum / n - (stats.sum / n).powi(2)).max(0.0),
        }
    }

    fn leaf(&self, stats: &NodeStats) -> TreeNode {
        let n = stats.n.max(1) as f64;
        if self.n_classes > 0 {
            let distribution: Vec<f64> = stats.counts.iter().map(|&c| c / n).collect();
            TreeNode::Leaf {
                value: super::argmax(&distribution) as f64,
                distribution,
                n_samples: stats.n,
            }
        } else {
            TreeNode::Leaf {
                value: stats.sum / n,
                distribution: Vec::new(),
                n_samples: stats.n,
            }
        }
    }

    fn find_leaf<'a>(&'a self, mut node: &'a TreeNode, sample: ArrayView1<f64>) -> &'a TreeNode {
        loop {
            match node {
                TreeNode::Leaf { .. } => return node,
                TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                    node = if sample[*feature_idx] <= *threshold { &**left } else { &**right };
                }
            }
        }
    }

    fn check_input(&self, x: &Array2<f64>) -> Result<&TreeNode> {
        let root = self.root.as_ref().ok_or(ExoError::ModelNotFitted)?;
        if x.ncols() != self.n_features {
            return Err(ExoError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(root)
    }

    /// Leaf values: class index for classifiers, mean target for regressors
    pub fn predict_values(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.check_input(x)?;
        Ok(x.rows()
            .into_iter()
            .map(|row| match self.find_leaf(root, row) {
                TreeNode::Leaf { value, .. } => *value,
                TreeNode::Split { .. } => 0.0,
            })
            .collect())
    }

    /// Predicted class indices
    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        if self.n_classes == 0 {
            return Err(ExoError::InvalidInput("regression tree has no classes".to_string()));
        }
        Ok(self.predict_values(x)?.iter().map(|&v| v as usize).collect())
    }

    /// Class fractions of the reached leaf, one row per sample
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let root = self.check_input(x)?;
        if self.n_classes == 0 {
            return Err(ExoError::InvalidInput("regression tree has no classes".to_string()));
        }
        let mut proba = Array2::zeros((x.nrows(), self.n_classes));
        for (i, row) in x.rows().into_iter().enumerate() {
            if let TreeNode::Leaf { distribution, .. } = self.find_leaf(root, row) {
                for (j, &p) in distribution.iter().enumerate() {
                    proba[[i, j]] = p;
                }
            }
        }
        Ok(proba)
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Get tree depth
    pub fn get_depth(&self) -> usize {
        fn depth(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => 1 + depth(left).max(depth(right)),
            }
        }
        self.root.as_ref().map_or(0, depth)
    }
}

fn check_samples(x: &Array2<f64>, n_targets: usize) -> Result<()> {
    if x.nrows() != n_targets {
        return Err(ExoError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", n_targets),
        });
    }
    if x.nrows() == 0 {
        return Err(ExoError::InvalidInput("cannot fit on zero samples".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classifier_simple() {
        let x = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
        let y = vec![0, 0, 1, 1];

        let mut tree = DecisionTree::new_classifier();
        tree.fit_classifier(&x, &y, 2).unwrap();

        assert_eq!(tree.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_regressor_simple() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![1.0, 2.0, 3.0, 4.0, 5.0];

        let mut tree = DecisionTree::new_regressor();
        tree.fit_regressor(&x, &y).unwrap();

        let predictions = tree.predict_values(&x).unwrap();
        let mse: f64 = predictions
            .iter()
            .zip(y.iter())
            .map(|(p, a)| (p - a).powi(2))
            .sum::<f64>()
            / y.len() as f64;
        assert!(mse < 1.0, "MSE too high: {}", mse);
    }

    #[test]
    fn test_max_depth() {
        let x = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0], [4.0, 4.0]];
        let y = vec![0, 1, 0, 1];

        let mut tree = DecisionTree::new_classifier().with_max_depth(2);
        tree.fit_classifier(&x, &y, 2).unwrap();

        assert!(tree.get_depth() <= 3);
    }

    #[test]
    fn test_feature_importances() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0]];
        let y = vec![0, 0, 1, 1];

        let mut tree = DecisionTree::new_classifier();
        tree.fit_classifier(&x, &y, 2).unwrap();

        let importances = tree.feature_importances().unwrap();
        assert_eq!(importances[0], 1.0);
        assert_eq!(importances[1], 0.0);
    }

    #[test]
    fn test_predict_proba_covers_unseen_classes() {
        let x = array![[0.0], [1.0]];
        let y = vec![0, 2];

        let mut tree = DecisionTree::new_classifier().with_criterion(Criterion::Entropy);
        tree.fit_classifier(&x, &y, 3).unwrap();

        let proba = tree.predict_proba(&x).unwrap();
        assert_eq!(proba.dim(), (2, 3));
        assert_eq!(proba.row(0).to_vec(), vec![1.0, 0.0, 0.0]);
        assert_eq!(proba.row(1).to_vec(), vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_rejects_out_of_range_class() {
        let x = array![[0.0], [1.0]];
        let mut tree = DecisionTree::new_classifier();
        assert!(tree.fit_classifier(&x, &[0, 5], 2).is_err());
    }
}
