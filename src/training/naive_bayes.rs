//! Gaussian Naive Bayes classifier

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::{ExoError, Result};

/// Gaussian Naive Bayes Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianNaiveBayes {
    /// `means[class][feature]`
    means: Vec<Vec<f64>>,
    /// `variances[class][feature]`, smoothed
    variances: Vec<Vec<f64>>,
    /// Prior per class; zero for classes absent from the fit data
    class_prior: Vec<f64>,
    /// Portion of the largest feature variance added to every variance
    var_smoothing: f64,
    is_fitted: bool,
}

impl Default for GaussianNaiveBayes {
    fn default() -> Self {
        Self::new()
    }
}

impl GaussianNaiveBayes {
    pub fn new() -> Self {
        Self {
            means: Vec::new(),
            variances: Vec::new(),
            class_prior: Vec::new(),
            var_smoothing: 1e-9,
            is_fitted: false,
        }
    }

    /// Set variance smoothing parameter
    pub fn with_var_smoothing(mut self, smoothing: f64) -> Self {
        self.var_smoothing = smoothing;
        self
    }

    pub fn var_smoothing(&self) -> f64 {
        self.var_smoothing
    }

    /// Fit the classifier
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

        // Smoothing is relative to the widest feature
        let max_var = x
            .columns()
            .into_iter()
            .map(|col| col.var(0.0))
            .fold(0.0f64, f64::max);
        let epsilon = self.var_smoothing * max_var.max(f64::MIN_POSITIVE);

        self.means = vec![vec![0.0; n_features]; n_classes];
        self.variances = vec![vec![0.0; n_features]; n_classes];
        let mut counts = vec![0usize; n_classes];
        let mut m2 = vec![vec![0.0; n_features]; n_classes];

        // Single-pass Welford's algorithm for mean and variance
        for (row, &class) in x.rows().into_iter().zip(y) {
            counts[class] += 1;
            let count = counts[class] as f64;
            for (j, &val) in row.iter().enumerate() {
                let delta = val - self.means[class][j];
                self.means[class][j] += delta / count;
                m2[class][j] += delta * (val - self.means[class][j]);
            }
        }

        for class in 0..n_classes {
            let n_class = counts[class].max(1) as f64;
            for j in 0..n_features {
                self.variances[class][j] = m2[class][j] / n_class + epsilon;
            }
        }

        self.class_prior = counts.iter().map(|&c| c as f64 / n_samples as f64).collect();
        self.is_fitted = true;
        Ok(())
    }

    /// Normalized log posterior per class
    pub fn predict_log_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(ExoError::ModelNotFitted);
        }
        let n_classes = self.class_prior.len();
        let mut log_probs = Array2::from_elem((x.nrows(), n_classes), f64::NEG_INFINITY);

        for (i, row) in x.rows().into_iter().enumerate() {
            for class in 0..n_classes {
                let prior = self.class_prior[class];
                if prior == 0.0 {
                    continue;
                }
                let log_likelihood: f64 = row
                    .iter()
                    .zip(&self.means[class])
                    .zip(&self.variances[class])
                    .map(|((&xi, &mean), &var)| {
                        -0.5 * ((xi - mean).powi(2) / var + var.ln() + (2.0 * PI).ln())
                    })
                    .sum();
                log_probs[[i, class]] = prior.ln() + log_likelihood;
            }
        }

        // Normalize (log-sum-exp trick)
        for mut row in log_probs.rows_mut() {
            let max_val = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            if !max_val.is_finite() {
                continue;
            }
            let log_sum = row.iter().map(|&v| (v - max_val).exp()).sum::<f64>().ln();
            row.mapv_inplace(|v| v - max_val - log_sum);
        }

        Ok(log_probs)
    }

    /// Predict probabilities
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        Ok(self.predict_log_proba(x)?.mapv(f64::exp))
    }

    /// Predict class indices
    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        let proba = self.predict_log_proba(x)?;
        Ok(proba.rows().into_iter().map(|row| super::argmax(&row)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_gaussian_nb() {
        let x = array![[1.0, 2.0], [1.5, 1.8], [1.2, 2.2], [5.0, 8.0], [6.0, 9.0], [5.5, 8.5]];
        let y = vec![0, 0, 0, 1, 1, 1];

        let mut nb = GaussianNaiveBayes::new();
        nb.fit(&x, &y, 2).unwrap();

        assert_eq!(nb.predict(&array![[1.1, 2.0], [5.8, 8.8]]).unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_probabilities_normalized() {
        let x = array![[0.0], [0.2], [3.0], [3.1]];
        let y = vec![0, 0, 1, 1];
        let mut nb = GaussianNaiveBayes::new().with_var_smoothing(1e-6);
        nb.fit(&x, &y, 2).unwrap();

        let proba = nb.predict_proba(&array![[1.5], [0.1]]).unwrap();
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
        assert!(proba[[1, 0]] > 0.99);
    }

    #[test]
    fn test_absent_class_gets_zero_probability() {
        let x = array![[0.0], [1.0]];
        let mut nb = GaussianNaiveBayes::new();
        nb.fit(&x, &[0, 0], 2).unwrap();

        let proba = nb.predict_proba(&array![[0.5]]).unwrap();
        assert_eq!(proba[[0, 1]], 0.0);
        assert!((proba[[0, 0]] - 1.0).abs() < 1e-12);
    }
}
