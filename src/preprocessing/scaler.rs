//! Feature scaling without centering

use crate::error::{ExoError, Result};
use serde::{Deserialize, Serialize};

/// Divides each column by its population standard deviation.
///
/// Values are not shifted, so zeros stay zeros when the output is
/// concatenated with one-hot columns. Constant columns keep scale 1.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scaler {
    scales: Vec<f64>,
    is_fitted: bool,
}

impl Scaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fit(&mut self, columns: &[Vec<f64>]) -> &mut Self {
        self.scales = columns
            .iter()
            .map(|col| {
                if col.is_empty() {
                    return 1.0;
                }
                let n = col.len() as f64;
                let mean = col.iter().sum::<f64>() / n;
                let var = col.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
                let std = var.sqrt();
                if std > f64::EPSILON { std } else { 1.0 }
            })
            .collect();
        self.is_fitted = true;
        self
    }

    pub fn transform(&self, columns: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        if !self.is_fitted {
            return Err(ExoError::ModelNotFitted);
        }
        if columns.len() != self.scales.len() {
            return Err(ExoError::ShapeError {
                expected: format!("{} columns", self.scales.len()),
                actual: format!("{} columns", columns.len()),
            });
        }
        Ok(columns
            .iter()
            .zip(&self.scales)
            .map(|(col, &scale)| col.iter().map(|x| x / scale).collect())
            .collect())
    }

    pub fn scales(&self) -> &[f64] {
        &self.scales
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_without_centering() {
        let mut scaler = Scaler::new();
        let cols = vec![vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]];
        scaler.fit(&cols);
        assert!((scaler.scales()[0] - 2.0).abs() < 1e-12);
        let out = scaler.transform(&cols).unwrap();
        assert_eq!(out[0][0], 1.0);
        assert_eq!(out[0][7], 4.5);
    }

    #[test]
    fn test_constant_column_keeps_values() {
        let mut scaler = Scaler::new();
        let cols = vec![vec![3.0, 3.0, 3.0]];
        scaler.fit(&cols);
        assert_eq!(scaler.transform(&cols).unwrap()[0], vec![3.0, 3.0, 3.0]);
    }
}
