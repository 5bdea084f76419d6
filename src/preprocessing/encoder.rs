//! One-hot encoding with unknown-category tolerance

use crate::error::{ExoError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One-hot encoder over already-imputed categorical columns.
///
/// Categories are the sorted distinct values seen at fit time. A value not
/// seen during fit encodes as all zeros for its column block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OneHotEncoder {
    categories: Vec<Vec<String>>,
    is_fitted: bool,
}

impl OneHotEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fit(&mut self, columns: &[Vec<String>]) -> &mut Self {
        self.categories = columns
            .iter()
            .map(|col| {
                col.iter()
                    .cloned()
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect()
            })
            .collect();
        self.is_fitted = true;
        self
    }

    /// Total number of output columns
    pub fn n_outputs(&self) -> usize {
        self.categories.iter().map(Vec::len).sum()
    }

    pub fn categories(&self) -> &[Vec<String>] {
        &self.categories
    }

    /// Encode into row-major rows of width [`Self::n_outputs`]
    pub fn transform(&self, columns: &[Vec<String>], n_rows: usize) -> Result<Vec<Vec<f64>>> {
        if !self.is_fitted {
            return Err(ExoError::ModelNotFitted);
        }
        if columns.len() != self.categories.len() {
            return Err(ExoError::ShapeError {
                expected: format!("{} columns", self.categories.len()),
                actual: format!("{} columns", columns.len()),
            });
        }

        let width = self.n_outputs();
        let mut rows = vec![vec![0.0; width]; n_rows];
        let mut offset = 0;
        for (col, cats) in columns.iter().zip(&self.categories) {
            for (row, value) in col.iter().enumerate() {
                if let Ok(pos) = cats.binary_search(value) {
                    rows[row][offset + pos] = 1.0;
                }
            }
            offset += cats.len();
        }
        Ok(rows)
    }

    /// Output names as `{column}_{category}`
    pub fn feature_names(&self, input_names: &[String]) -> Vec<String> {
        input_names
            .iter()
            .zip(&self.categories)
            .flat_map(|(name, cats)| cats.iter().map(move |c| format!("{}_{}", name, c)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_onehot_sorted_categories() {
        let mut enc = OneHotEncoder::new();
        let cols = vec![strings(&["red", "blue", "red"])];
        enc.fit(&cols);
        assert_eq!(enc.categories()[0], strings(&["blue", "red"]));
        let rows = enc.transform(&cols, 3).unwrap();
        assert_eq!(rows, vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_unknown_category_is_all_zero() {
        let mut enc = OneHotEncoder::new();
        enc.fit(&[strings(&["a", "b"])]);
        let rows = enc.transform(&[strings(&["c"])], 1).unwrap();
        assert_eq!(rows, vec![vec![0.0, 0.0]]);
    }

    #[test]
    fn test_feature_names() {
        let mut enc = OneHotEncoder::new();
        enc.fit(&[strings(&["x", "y"])]);
        assert_eq!(enc.feature_names(&strings(&["kind"])), strings(&["kind_x", "kind_y"]));
    }
}
