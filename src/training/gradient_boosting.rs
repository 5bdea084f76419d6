//! Gradient boosted decision trees for classification
//!
//! Binary problems boost a single log-odds score; multi-class problems boost
//! one score per class under a softmax link. Each round fits a regression
//! tree to the negative gradient of the log loss.

use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use super::decision_tree::DecisionTree;
use crate::error::{ExoError, Result};

/// Gradient Boosting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingConfig {
    /// Number of boosting rounds
    pub n_estimators: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Minimum samples per leaf
    pub min_samples_leaf: usize,
    /// Row subsample ratio for each round
    pub subsample: f64,
    /// Random seed
    pub random_state: Option<u64>,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            subsample: 1.0,
            random_state: Some(42),
        }
    }
}

/// Gradient Boosting Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    config: GradientBoostingConfig,
    /// `rounds[r][k]` is the tree for score `k` in round `r`
    rounds: Vec<Vec<DecisionTree>>,
    initial_scores: Vec<f64>,
    n_classes: usize,
    feature_importances: Vec<f64>,
}

impl GradientBoostingClassifier {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            rounds: Vec::new(),
            initial_scores: Vec::new(),
            n_classes: 0,
            feature_importances: Vec::new(),
        }
    }

    pub fn config(&self) -> &GradientBoostingConfig {
        &self.config
    }

    /// Number of boosted scores: one for binary, one per class otherwise
    fn n_scores(&self) -> usize {
        if self.n_classes <= 2 { 1 } else { self.n_classes }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize) -> Result<()> {
        let n_samples = x.nrows();
        let n_features = x.ncols();
        if n_samples != y.len() {
            return Err(ExoError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(ExoError::InvalidInput("cannot fit on zero samples".to_string()));
        }
        if !(self.config.subsample > 0.0 && self.config.subsample <= 1.0) {
            return Err(ExoError::invalid_param(
                "subsample",
                self.config.subsample,
                "must be in (0, 1]",
            ));
        }

        self.n_classes = n_classes;
        let n_scores = self.n_scores();

        // Prior scores from class frequencies
        let mut priors = vec![0.0; n_classes.max(2)];
        for &c in y {
            priors[c] += 1.0 / n_samples as f64;
        }
        self.initial_scores = if n_scores == 1 {
            let p = priors[1].clamp(1e-10, 1.0 - 1e-10);
            vec![(p / (1.0 - p)).ln()]
        } else {
            priors.iter().map(|&p| p.max(1e-10).ln()).collect()
        };

        let mut scores = Array2::from_shape_fn((n_samples, n_scores), |(_, k)| self.initial_scores[k]);

        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        self.feature_importances = vec![0.0; n_features];
        self.rounds.clear();

        for _ in 0..self.config.n_estimators {
            let proba = self.scores_to_proba(&scores);
            let sample_indices = self.subsample_indices(n_samples, &mut rng);
            let x_sub = x.select(Axis(0), &sample_indices);

            let mut round = Vec::with_capacity(n_scores);
            for k in 0..n_scores {
                // Negative gradient of the log loss
                let residuals: Array1<f64> = sample_indices
                    .iter()
                    .map(|&i| {
                        let target_class = if n_scores == 1 { 1 } else { k };
                        let indicator = if y[i] == target_class { 1.0 } else { 0.0 };
                        indicator - proba[[i, if n_scores == 1 { 1 } else { k }]]
                    })
                    .collect();

                let mut tree = DecisionTree::new_regressor()
                    .with_max_depth(self.config.max_depth)
                    .with_min_samples_leaf(self.config.min_samples_leaf);
                tree.fit_regressor(&x_sub, &residuals)?;

                let update = tree.predict_values(x)?;
                for i in 0..n_samples {
                    scores[[i, k]] += self.config.learning_rate * update[i];
                }

                if let Some(importance) = tree.feature_importances() {
                    for (acc, &v) in self.feature_importances.iter_mut().zip(importance.iter()) {
                        *acc += v;
                    }
                }
                round.push(tree);
            }
            self.rounds.push(round);
        }

        let total: f64 = self.feature_importances.iter().sum();
        if total > 0.0 {
            for imp in &mut self.feature_importances {
                *imp /= total;
            }
        }

        Ok(())
    }

    fn raw_scores(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.rounds.is_empty() {
            return Err(ExoError::ModelNotFitted);
        }
        let n = x.nrows();
        let mut scores = Array2::from_shape_fn((n, self.n_scores()), |(_, k)| self.initial_scores[k]);
        for round in &self.rounds {
            for (k, tree) in round.iter().enumerate() {
                let update = tree.predict_values(x)?;
                for i in 0..n {
                    scores[[i, k]] += self.config.learning_rate * update[i];
                }
            }
        }
        Ok(scores)
    }

    fn scores_to_proba(&self, scores: &Array2<f64>) -> Array2<f64> {
        let n = scores.nrows();
        if self.n_scores() == 1 {
            let mut proba = Array2::zeros((n, 2));
            for i in 0..n {
                let p = 1.0 / (1.0 + (-scores[[i, 0]]).exp());
                proba[[i, 0]] = 1.0 - p;
                proba[[i, 1]] = p;
            }
            proba
        } else {
            let mut proba = scores.clone();
            for mut row in proba.rows_mut() {
                let max = row.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
                row.mapv_inplace(|s| (s - max).exp());
                let sum = row.sum();
                row.mapv_inplace(|e| e / sum);
            }
            proba
        }
    }

    /// Predict class probabilities
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let scores = self.raw_scores(x)?;
        let proba = self.scores_to_proba(&scores);
        if self.n_classes == 1 {
            // Degenerate single-class fit
            return Ok(Array2::ones((x.nrows(), 1)));
        }
        Ok(proba)
    }

    /// Predict class indices
    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.rows().into_iter().map(|row| super::argmax(&row)).collect())
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    fn subsample_indices(&self, n: usize, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
        if self.config.subsample >= 1.0 {
            return (0..n).collect();
        }
        let sample_size = ((n as f64) * self.config.subsample).ceil().max(1.0) as usize;
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(rng);
        indices.truncate(sample_size);
        indices.sort_unstable();
        indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_classification_data() -> (Array2<f64>, Vec<usize>) {
        let x = Array2::from_shape_vec((100, 2), (0..200).map(|i| i as f64 * 0.1).collect()).unwrap();
        let y = x
            .rows()
            .into_iter()
            .map(|row| usize::from(row[0] + row[1] > 10.0))
            .collect();
        (x, y)
    }

    #[test]
    fn test_binary_classifier() {
        let (x, y) = create_classification_data();
        let config = GradientBoostingConfig { n_estimators: 50, ..Default::default() };

        let mut model = GradientBoostingClassifier::new(config);
        model.fit(&x, &y, 2).unwrap();

        let predictions = model.predict(&x).unwrap();
        let correct = predictions.iter().zip(&y).filter(|(p, a)| p == a).count();
        let accuracy = correct as f64 / y.len() as f64;
        assert!(accuracy > 0.9, "Accuracy ({}) should be above 90%", accuracy);
    }

    #[test]
    fn test_multiclass_probabilities() {
        let x = Array2::from_shape_fn((90, 1), |(i, _)| i as f64);
        let y: Vec<usize> = (0..90).map(|i| i / 30).collect();
        let config = GradientBoostingConfig { n_estimators: 20, subsample: 0.8, ..Default::default() };

        let mut model = GradientBoostingClassifier::new(config);
        model.fit(&x, &y, 3).unwrap();

        let proba = model.predict_proba(&x).unwrap();
        assert_eq!(proba.dim(), (90, 3));
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
        assert_eq!(model.predict(&x).unwrap()[85], 2);
    }

    #[test]
    fn test_feature_importances_normalized() {
        let (x, y) = create_classification_data();
        let mut model = GradientBoostingClassifier::new(GradientBoostingConfig {
            n_estimators: 5,
            ..Default::default()
        });
        model.fit(&x, &y, 2).unwrap();

        let sum: f64 = model.feature_importances().iter().sum();
        assert!((sum - 1.0).abs() < 1e-6, "Sum of importances ({}) should be ~1", sum);
    }
}
