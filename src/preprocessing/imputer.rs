//! Missing value imputation

use crate::error::{ExoError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Placeholder used when a categorical column has no observed value at fit time
pub const MISSING_CATEGORY: &str = "missing";

/// Fills numeric gaps with the per-column median seen at fit time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MedianImputer {
    medians: Vec<f64>,
    is_fitted: bool,
}

impl MedianImputer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit on column-major cells
    pub fn fit(&mut self, columns: &[Vec<Option<f64>>]) -> &mut Self {
        self.medians = columns
            .iter()
            .map(|col| {
                let mut observed: Vec<f64> = col.iter().flatten().copied().collect();
                median(&mut observed).unwrap_or(0.0)
            })
            .collect();
        self.is_fitted = true;
        self
    }

    pub fn transform(&self, columns: &[Vec<Option<f64>>]) -> Result<Vec<Vec<f64>>> {
        if !self.is_fitted {
            return Err(ExoError::ModelNotFitted);
        }
        check_width(self.medians.len(), columns.len())?;
        Ok(columns
            .iter()
            .zip(&self.medians)
            .map(|(col, &fill)| col.iter().map(|v| v.unwrap_or(fill)).collect())
            .collect())
    }

    pub fn medians(&self) -> &[f64] {
        &self.medians
    }
}

/// Fills categorical gaps with the most frequent value seen at fit time.
/// Ties resolve to the lexicographically smallest value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MostFrequentImputer {
    modes: Vec<String>,
    is_fitted: bool,
}

impl MostFrequentImputer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fit(&mut self, columns: &[Vec<Option<String>>]) -> &mut Self {
        self.modes = columns
            .iter()
            .map(|col| {
                let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
                for v in col.iter().flatten() {
                    *counts.entry(v.as_str()).or_insert(0) += 1;
                }
                // BTreeMap iterates in key order, so the first maximum wins ties
                let mut best: Option<(&str, usize)> = None;
                for (value, count) in counts {
                    if best.map_or(true, |(_, c)| count > c) {
                        best = Some((value, count));
                    }
                }
                best.map_or_else(|| MISSING_CATEGORY.to_string(), |(v, _)| v.to_string())
            })
            .collect();
        self.is_fitted = true;
        self
    }

    pub fn transform(&self, columns: &[Vec<Option<String>>]) -> Result<Vec<Vec<String>>> {
        if !self.is_fitted {
            return Err(ExoError::ModelNotFitted);
        }
        check_width(self.modes.len(), columns.len())?;
        Ok(columns
            .iter()
            .zip(&self.modes)
            .map(|(col, fill)| {
                col.iter()
                    .map(|v| v.clone().unwrap_or_else(|| fill.clone()))
                    .collect()
            })
            .collect())
    }

    pub fn modes(&self) -> &[String] {
        &self.modes
    }
}

fn check_width(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(ExoError::ShapeError {
            expected: format!("{} columns", expected),
            actual: format!("{} columns", actual),
        });
    }
    Ok(())
}

/// Median of `values`, averaging the two middle values for even lengths
fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}
