//! Multinomial logistic regression

use crate::error::{ExoError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Optimizer name accepted for compatibility with saved hyperparameter sets.
///
/// All variants train with the same full-batch gradient descent on the
/// L2-penalized softmax loss, so they reach the same optimum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Solver {
    #[default]
    Lbfgs,
    Liblinear,
    Saga,
}

/// Softmax regression with an L2 penalty of strength `1 / C`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// `n_features x n_classes`
    coefficients: Option<Array2<f64>>,
    intercepts: Option<Array1<f64>>,
    /// Inverse regularization strength
    pub c: f64,
    /// Maximum iterations
    pub max_iter: usize,
    /// Convergence tolerance on the gradient norm
    pub tol: f64,
    /// Learning rate
    pub learning_rate: f64,
    pub solver: Solver,
    /// Seed recorded for reproducibility; the batch solver is deterministic
    pub random_state: Option<u64>,
    n_iter: usize,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercepts: None,
            c: 1.0,
            max_iter: 500,
            tol: 1e-4,
            learning_rate: 0.5,
            solver: Solver::Lbfgs,
            random_state: None,
            n_iter: 0,
        }
    }

    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    /// Set maximum iterations
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set learning rate
    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_solver(mut self, solver: Solver) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Iterations used by the last fit
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    fn softmax_rows(mut scores: Array2<f64>) -> Array2<f64> {
        for mut row in scores.rows_mut() {
            let max = row.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
            row.mapv_inplace(|s| (s - max).exp());
            let sum = row.sum();
            row.mapv_inplace(|e| e / sum);
        }
        scores
    }

    /// Fit the model using gradient descent
    pub fn fit(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize) -> Result<&mut Self> {
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
        if self.c <= 0.0 {
            return Err(ExoError::invalid_param("C", self.c, "must be positive"));
        }

        let mut one_hot = Array2::<f64>::zeros((n_samples, n_classes));
        for (i, &c) in y.iter().enumerate() {
            one_hot[[i, c]] = 1.0;
        }

        let mut weights = Array2::<f64>::zeros((n_features, n_classes));
        let mut bias = Array1::<f64>::zeros(n_classes);
        let penalty = 1.0 / (self.c * n_samples as f64);
        let n = n_samples as f64;

        self.n_iter = self.max_iter;
        for iter in 0..self.max_iter {
            let proba = Self::softmax_rows(x.dot(&weights) + &bias);
            let errors = proba - &one_hot;

            let dw = x.t().dot(&errors) / n + &weights * penalty;
            let db = errors.sum_axis(Axis(0)) / n;

            let grad_norm = (dw.mapv(|v| v * v).sum() + db.mapv(|v| v * v).sum()).sqrt();
            if grad_norm < self.tol {
                self.n_iter = iter;
                break;
            }

            weights = weights - &dw * self.learning_rate;
            bias = bias - &db * self.learning_rate;
        }

        debug!(n_iter = self.n_iter, solver = ?self.solver, "Logistic regression converged");
        self.coefficients = Some(weights);
        self.intercepts = Some(bias);
        Ok(self)
    }

    /// Predict probabilities
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (Some(weights), Some(bias)) = (&self.coefficients, &self.intercepts) else {
            return Err(ExoError::ModelNotFitted);
        };
        if x.ncols() != weights.nrows() {
            return Err(ExoError::ShapeError {
                expected: format!("{} features", weights.nrows()),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(Self::softmax_rows(x.dot(weights) + bias))
    }

    /// Predict class indices
    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.rows().into_iter().map(|row| super::argmax(&row)).collect())
    }

    /// Absolute coefficients averaged over classes, normalized to sum to one
    pub fn coefficient_importances(&self) -> Option<Array1<f64>> {
        let weights = self.coefficients.as_ref()?;
        let magnitudes = weights.mapv(f64::abs).mean_axis(Axis(1))?;
        let total = magnitudes.sum();
        Some(if total > 0.0 { magnitudes / total } else { magnitudes })
    }
}
