//! Support vector classifier
//!
//! Binary machines are trained with a simplified SMO solver over a
//! precomputed kernel matrix. More than two classes are handled one-vs-rest.
//! Probabilities come from a Platt sigmoid fitted on each machine's decision
//! values over the training rows.

use crate::error::{ExoError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Beyond this the dense kernel matrix would not fit in memory
const MAX_KERNEL_MATRIX_SAMPLES: usize = 10_000;

/// Kernel function
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kernel {
    /// `x · y`
    Linear,
    /// `(γ x · y + coef0)^degree`
    Poly,
    /// `exp(-γ ||x - y||²)`
    #[default]
    Rbf,
    /// `tanh(γ x · y + coef0)`
    Sigmoid,
}

/// How the kernel coefficient is derived from the training matrix
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gamma {
    /// `1 / (n_features * X.var())`
    #[default]
    Scale,
    /// `1 / n_features`
    Auto,
}

impl Gamma {
    fn resolve(self, x: &Array2<f64>) -> f64 {
        let n_features = x.ncols().max(1) as f64;
        match self {
            Gamma::Auto => 1.0 / n_features,
            Gamma::Scale => {
                let var = x.var(0.0);
                if var > 0.0 { 1.0 / (n_features * var) } else { 1.0 }
            }
        }
    }
}

/// SVM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMConfig {
    /// Regularization parameter (C)
    pub c: f64,
    pub kernel: Kernel,
    pub gamma: Gamma,
    /// Polynomial degree
    pub degree: i32,
    pub coef0: f64,
    /// Tolerance for the KKT check
    pub tol: f64,
    /// Maximum SMO sweeps
    pub max_iter: usize,
    /// Fit Platt scaling so probabilities are available
    pub probability: bool,
    pub random_state: Option<u64>,
}

impl Default for SVMConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            kernel: Kernel::Rbf,
            gamma: Gamma::Scale,
            degree: 3,
            coef0: 0.0,
            tol: 1e-3,
            max_iter: 1000,
            probability: true,
            random_state: Some(42),
        }
    }
}

/// Kernel with its coefficients resolved against the training data
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct KernelFn {
    kind: Kernel,
    gamma: f64,
    degree: i32,
    coef0: f64,
}

impl KernelFn {
    fn eval(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match self.kind {
            Kernel::Linear => a.dot(&b),
            Kernel::Poly => (self.gamma * a.dot(&b) + self.coef0).powi(self.degree),
            Kernel::Rbf => {
                let dist_sq: f64 = a.iter().zip(b.iter()).map(|(u, v)| (u - v) * (u - v)).sum();
                (-self.gamma * dist_sq).exp()
            }
            Kernel::Sigmoid => (self.gamma * a.dot(&b) + self.coef0).tanh(),
        }
    }

    fn matrix(&self, x: &Array2<f64>) -> Array2<f64> {
        let n = x.nrows();
        let rows: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| (0..n).map(|j| self.eval(x.row(i), x.row(j))).collect())
            .collect();
        Array2::from_shape_fn((n, n), |(i, j)| rows[i][j])
    }
}

/// Sigmoid `P(y = 1 | f) = 1 / (1 + exp(a f + b))`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct PlattScaling {
    a: f64,
    b: f64,
}

impl PlattScaling {
    /// Newton fit with backtracking on the regularized targets
    fn fit(decision: &[f64], positive: &[bool]) -> Self {
        let n_pos = positive.iter().filter(|&&p| p).count() as f64;
        let n_neg = positive.len() as f64 - n_pos;
        let hi_target = (n_pos + 1.0) / (n_pos + 2.0);
        let lo_target = 1.0 / (n_neg + 2.0);
        let targets: Vec<f64> =
            positive.iter().map(|&p| if p { hi_target } else { lo_target }).collect();

        let objective = |a: f64, b: f64| -> f64 {
            decision
                .iter()
                .zip(&targets)
                .map(|(&f, &t)| {
                    let fab = f * a + b;
                    if fab >= 0.0 {
                        t * fab + (-fab).exp().ln_1p()
                    } else {
                        (t - 1.0) * fab + fab.exp().ln_1p()
                    }
                })
                .sum()
        };

        let mut a = 0.0;
        let mut b = ((n_neg + 1.0) / (n_pos + 1.0)).ln();
        let mut fval = objective(a, b);

        for _ in 0..100 {
            let (mut h11, mut h22, mut h21) = (1e-12, 1e-12, 0.0);
            let (mut g1, mut g2) = (0.0, 0.0);
            for (&f, &t) in decision.iter().zip(&targets) {
                let fab = f * a + b;
                let (p, q) = if fab >= 0.0 {
                    let e = (-fab).exp();
                    (e / (1.0 + e), 1.0 / (1.0 + e))
                } else {
                    let e = fab.exp();
                    (1.0 / (1.0 + e), e / (1.0 + e))
                };
                let d2 = p * q;
                h11 += f * f * d2;
                h22 += d2;
                h21 += f * d2;
                let d1 = t - p;
                g1 += f * d1;
                g2 += d1;
            }
            if g1.abs() < 1e-5 && g2.abs() < 1e-5 {
                break;
            }

            let det = h11 * h22 - h21 * h21;
            let da = -(h22 * g1 - h21 * g2) / det;
            let db = -(-h21 * g1 + h11 * g2) / det;
            let gd = g1 * da + g2 * db;

            let mut step = 1.0;
            while step >= 1e-10 {
                let (new_a, new_b) = (a + step * da, b + step * db);
                let new_f = objective(new_a, new_b);
                if new_f < fval + 1e-4 * step * gd {
                    a = new_a;
                    b = new_b;
                    fval = new_f;
                    break;
                }
                step /= 2.0;
            }
            if step < 1e-10 {
                break;
            }
        }

        Self { a, b }
    }

    fn probability(&self, f: f64) -> f64 {
        let fab = f * self.a + self.b;
        if fab >= 0.0 {
            (-fab).exp() / (1.0 + (-fab).exp())
        } else {
            1.0 / (1.0 + fab.exp())
        }
    }
}

/// One binary machine separating a positive class from the rest
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BinarySVM {
    support_vectors: Array2<f64>,
    /// `alpha_i * y_i` for each support vector
    dual_coef: Array1<f64>,
    bias: f64,
    platt: Option<PlattScaling>,
}

impl BinarySVM {
    fn decision(&self, kernel: &KernelFn, sample: ArrayView1<f64>) -> f64 {
        self.support_vectors
            .rows()
            .into_iter()
            .zip(self.dual_coef.iter())
            .map(|(sv, &coef)| coef * kernel.eval(sample, sv))
            .sum::<f64>()
            + self.bias
    }
}

/// Support Vector Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMClassifier {
    config: SVMConfig,
    kernel: Option<KernelFn>,
    /// One machine for binary problems, otherwise one per class; `None` for
    /// classes absent from the training rows
    machines: Vec<Option<BinarySVM>>,
    n_classes: usize,
}

impl SVMClassifier {
    pub fn new(config: SVMConfig) -> Self {
        Self { config, kernel: None, machines: Vec::new(), n_classes: 0 }
    }

    pub fn config(&self) -> &SVMConfig {
        &self.config
    }

    pub fn has_probability(&self) -> bool {
        self.config.probability
    }

    /// Fit one-vs-rest machines (a single machine for two classes)
    pub fn fit(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize) -> Result<()> {
        let n = x.nrows();
        if n != y.len() {
            return Err(ExoError::ShapeError {
                expected: format!("y length = {}", n),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n > MAX_KERNEL_MATRIX_SAMPLES {
            return Err(ExoError::InvalidInput(format!(
                "Dataset has {} samples, exceeding the maximum {} for the SVM kernel matrix",
                n, MAX_KERNEL_MATRIX_SAMPLES
            )));
        }
        if self.config.c <= 0.0 {
            return Err(ExoError::invalid_param("C", self.config.c, "must be positive"));
        }

        let mut present: Vec<usize> = y.to_vec();
        present.sort_unstable();
        present.dedup();
        if present.len() < 2 {
            return Err(ExoError::InvalidInput(
                "SVM requires at least 2 distinct classes".to_string(),
            ));
        }

        let kernel = KernelFn {
            kind: self.config.kernel,
            gamma: self.config.gamma.resolve(x),
            degree: self.config.degree,
            coef0: self.config.coef0,
        };
        let gram = kernel.matrix(x);

        let positives: Vec<usize> = if n_classes == 2 { vec![1] } else { (0..n_classes).collect() };
        let mut machines = Vec::with_capacity(positives.len());
        for positive in positives {
            if !present.contains(&positive) {
                machines.push(None);
                continue;
            }
            let labels: Vec<f64> = y.iter().map(|&c| if c == positive { 1.0 } else { -1.0 }).collect();
            machines.push(Some(self.train_binary(x, &gram, &labels)?));
        }

        debug!(
            kernel = ?kernel.kind,
            gamma = kernel.gamma,
            n_machines = machines.len(),
            "SVM fitted"
        );
        self.kernel = Some(kernel);
        self.machines = machines;
        self.n_classes = n_classes;
        Ok(())
    }

    fn train_binary(&self, x: &Array2<f64>, gram: &Array2<f64>, y: &[f64]) -> Result<BinarySVM> {
        let (alphas, bias) = self.smo(gram, y);

        let support: Vec<usize> = (0..y.len()).filter(|&i| alphas[i] > 1e-8).collect();
        let support_vectors = x.select(ndarray::Axis(0), &support);
        let dual_coef: Array1<f64> = support.iter().map(|&i| alphas[i] * y[i]).collect();

        let platt = if self.config.probability {
            let decision: Vec<f64> = (0..y.len())
                .map(|i| support.iter().map(|&s| alphas[s] * y[s] * gram[[s, i]]).sum::<f64>() + bias)
                .collect();
            let positive: Vec<bool> = y.iter().map(|&v| v > 0.0).collect();
            Some(PlattScaling::fit(&decision, &positive))
        } else {
            None
        };

        Ok(BinarySVM { support_vectors, dual_coef, bias, platt })
    }

    /// Simplified SMO with a random second multiplier
    fn smo(&self, k: &Array2<f64>, y: &[f64]) -> (Vec<f64>, f64) {
        let n = y.len();
        let c = self.config.c;
        let tol = self.config.tol;
        let mut alphas = vec![0.0; n];
        let mut bias = 0.0;

        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        let output = |alphas: &[f64], bias: f64, idx: usize| -> f64 {
            (0..n).map(|i| alphas[i] * y[i] * k[[i, idx]]).sum::<f64>() + bias
        };

        let max_passes = 5;
        let mut passes = 0;
        let mut sweeps = 0;
        while passes < max_passes && sweeps < self.config.max_iter && n > 1 {
            let mut changed = 0;
            for i in 0..n {
                let e_i = output(&alphas, bias, i) - y[i];
                let violates = (y[i] * e_i < -tol && alphas[i] < c) || (y[i] * e_i > tol && alphas[i] > 0.0);
                if !violates {
                    continue;
                }

                let j = loop {
                    let j = rng.gen_range(0..n);
                    if j != i {
                        break j;
                    }
                };
                let e_j = output(&alphas, bias, j) - y[j];
                let (ai_old, aj_old) = (alphas[i], alphas[j]);

                let (lo, hi) = if y[i] != y[j] {
                    ((aj_old - ai_old).max(0.0), (c + aj_old - ai_old).min(c))
                } else {
                    ((ai_old + aj_old - c).max(0.0), (ai_old + aj_old).min(c))
                };
                if (hi - lo).abs() < 1e-10 {
                    continue;
                }

                let eta = 2.0 * k[[i, j]] - k[[i, i]] - k[[j, j]];
                if eta >= 0.0 {
                    continue;
                }

                let aj = (aj_old - y[j] * (e_i - e_j) / eta).clamp(lo, hi);
                if (aj - aj_old).abs() < 1e-5 {
                    continue;
                }
                let ai = ai_old + y[i] * y[j] * (aj_old - aj);
                alphas[i] = ai;
                alphas[j] = aj;

                let b1 = bias - e_i - y[i] * (ai - ai_old) * k[[i, i]] - y[j] * (aj - aj_old) * k[[i, j]];
                let b2 = bias - e_j - y[i] * (ai - ai_old) * k[[i, j]] - y[j] * (aj - aj_old) * k[[j, j]];
                bias = if ai > 0.0 && ai < c {
                    b1
                } else if aj > 0.0 && aj < c {
                    b2
                } else {
                    (b1 + b2) / 2.0
                };
                changed += 1;
            }

            sweeps += 1;
            passes = if changed == 0 { passes + 1 } else { 0 };
        }

        (alphas, bias)
    }

    /// Raw decision values, one column per machine
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let kernel = self.kernel.as_ref().ok_or(ExoError::ModelNotFitted)?;
        let n_machines = self.machines.len();
        let mut scores = Array2::from_elem((x.nrows(), n_machines), f64::NEG_INFINITY);
        for (i, row) in x.rows().into_iter().enumerate() {
            for (m, machine) in self.machines.iter().enumerate() {
                if let Some(machine) = machine {
                    scores[[i, m]] = machine.decision(kernel, row);
                }
            }
        }
        Ok(scores)
    }

    /// Predict class indices
    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        let scores = self.decision_function(x)?;
        if self.n_classes == 2 {
            return Ok(scores.column(0).iter().map(|&s| usize::from(s >= 0.0)).collect());
        }
        Ok(scores.rows().into_iter().map(|row| super::argmax(&row)).collect())
    }

    /// Platt-scaled class probabilities
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.config.probability {
            return Err(ExoError::InvalidInput(
                "probability estimates are disabled for this SVM".to_string(),
            ));
        }
        let scores = self.decision_function(x)?;
        let calibrated = |m: usize, f: f64| -> f64 {
            match &self.machines[m] {
                Some(BinarySVM { platt: Some(platt), .. }) => platt.probability(f),
                _ => 0.0,
            }
        };

        let n = x.nrows();
        let mut proba = Array2::zeros((n, self.n_classes));
        for i in 0..n {
            if self.n_classes == 2 {
                let p = calibrated(0, scores[[i, 0]]);
                proba[[i, 0]] = 1.0 - p;
                proba[[i, 1]] = p;
                continue;
            }
            for k in 0..self.n_classes {
                proba[[i, k]] = calibrated(k, scores[[i, k]]);
            }
            let total: f64 = proba.row(i).sum();
            if total > 0.0 {
                proba.row_mut(i).mapv_inplace(|p| p / total);
            }
        }
        Ok(proba)
    }

    /// Number of support vectors across all machines
    pub fn n_support_vectors(&self) -> usize {
        self.machines.iter().flatten().map(|m| m.support_vectors.nrows()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn separable() -> (Array2<f64>, Vec<usize>) {
        let x = array![
            [1.0, 1.0], [1.5, 1.2], [2.0, 2.0], [1.2, 1.8], [0.8, 1.5],
            [5.0, 5.0], [5.5, 5.2], [6.0, 6.0], [5.2, 5.8], [4.8, 5.5]
        ];
        (x, vec![0, 0, 0, 0, 0, 1, 1, 1, 1, 1])
    }

    #[test]
    fn test_linear_kernel() {
        let (x, y) = separable();
        let mut svm = SVMClassifier::new(SVMConfig { kernel: Kernel::Linear, ..Default::default() });
        svm.fit(&x, &y, 2).unwrap();

        let predictions = svm.predict(&x).unwrap();
        let correct = predictions.iter().zip(&y).filter(|(p, t)| p == t).count();
        assert!(correct >= 8, "Expected at least 8/10 correct, got {}", correct);
        assert!(svm.n_support_vectors() > 0);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (x, y) = separable();
        let mut svm = SVMClassifier::new(SVMConfig::default());
        svm.fit(&x, &y, 2).unwrap();

        let proba = svm.predict_proba(&x).unwrap();
        assert_eq!(proba.dim(), (10, 2));
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
            assert!(row.iter().all(|&p| (0.0..=1.0).contains(&p)));
        }
    }

    #[test]
    fn test_multiclass() {
        let x = array![
            [1.0, 1.0], [1.5, 1.2], [2.0, 2.0], [1.2, 1.8], [0.8, 1.5],
            [5.0, 5.0], [5.5, 5.2], [6.0, 6.0], [5.2, 5.8], [4.8, 5.5],
            [1.0, 5.0], [1.5, 5.2], [2.0, 6.0], [1.2, 5.8], [0.8, 5.5]
        ];
        let y: Vec<usize> = (0..15).map(|i| i / 5).collect();
        let mut svm = SVMClassifier::new(SVMConfig { c: 10.0, ..Default::default() });
        svm.fit(&x, &y, 3).unwrap();

        let predictions = svm.predict(&x).unwrap();
        assert!(predictions.iter().all(|&p| p < 3));
        let proba = svm.predict_proba(&x).unwrap();
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_probability_disabled() {
        let (x, y) = separable();
        let mut svm = SVMClassifier::new(SVMConfig { probability: false, ..Default::default() });
        svm.fit(&x, &y, 2).unwrap();
        assert!(svm.predict_proba(&x).is_err());
        assert_eq!(svm.predict(&x).unwrap().len(), 10);
    }

    #[test]
    fn test_single_class_rejected() {
        let (x, _) = separable();
        let mut svm = SVMClassifier::new(SVMConfig::default());
        assert!(svm.fit(&x, &[0; 10], 2).is_err());
    }

    #[test]
    fn test_gamma_resolution() {
        let x = array![[0.0, 2.0], [2.0, 0.0]];
        assert_eq!(Gamma::Auto.resolve(&x), 0.5);
        // X.var() over all cells is 1.0
        assert_eq!(Gamma::Scale.resolve(&x), 0.5);
    }
}
