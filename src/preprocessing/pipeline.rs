//! Column preprocessor: numeric and categorical branches concatenated

use super::{
    encoder::OneHotEncoder,
    imputer::{MedianImputer, MostFrequentImputer},
    scaler::Scaler,
};
use crate::data::Dataset;
use crate::error::{ExoError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

/// Split feature columns by storage type: numeric storage becomes a numeric
/// feature, everything else categorical.
pub fn infer_feature_types(features: &Dataset) -> (Vec<String>, Vec<String>) {
    let mut numeric = Vec::new();
    let mut categorical = Vec::new();
    for col in features.columns() {
        if col.data.is_numeric() {
            numeric.push(col.name.clone());
        } else {
            categorical.push(col.name.clone());
        }
    }
    (numeric, categorical)
}

/// Fitted preprocessing stage of a pipeline.
///
/// Numeric branch: median imputation then scaling without centering.
/// Categorical branch: most-frequent imputation then one-hot encoding.
/// Output columns are numeric outputs followed by the one-hot block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnPreprocessor {
    numeric_columns: Vec<String>,
    categorical_columns: Vec<String>,
    numeric_imputer: MedianImputer,
    scaler: Scaler,
    categorical_imputer: MostFrequentImputer,
    encoder: OneHotEncoder,
    is_fitted: bool,
}

impl ColumnPreprocessor {
    pub fn new(numeric_columns: Vec<String>, categorical_columns: Vec<String>) -> Self {
        Self {
            numeric_columns,
            categorical_columns,
            numeric_imputer: MedianImputer::new(),
            scaler: Scaler::new(),
            categorical_imputer: MostFrequentImputer::new(),
            encoder: OneHotEncoder::new(),
            is_fitted: false,
        }
    }

    pub fn numeric_columns(&self) -> &[String] {
        &self.numeric_columns
    }

    pub fn categorical_columns(&self) -> &[String] {
        &self.categorical_columns
    }

    /// Input columns in the order they are consumed
    pub fn input_columns(&self) -> Vec<String> {
        self.numeric_columns
            .iter()
            .chain(&self.categorical_columns)
            .cloned()
            .collect()
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    pub fn fit(&mut self, data: &Dataset) -> Result<&mut Self> {
        let start = Instant::now();
        let numeric = self.numeric_cells(data)?;
        self.numeric_imputer.fit(&numeric);
        let imputed = self.numeric_imputer.transform(&numeric)?;
        self.scaler.fit(&imputed);

        let categorical = self.categorical_cells(data)?;
        self.categorical_imputer.fit(&categorical);
        let filled = self.categorical_imputer.transform(&categorical)?;
        self.encoder.fit(&filled);

        self.is_fitted = true;
        debug!(
            numeric = self.numeric_columns.len(),
            categorical = self.categorical_columns.len(),
            outputs = self.n_output_features(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Fitted column preprocessor"
        );
        Ok(self)
    }

    /// Transform into the dense feature matrix consumed by estimators
    pub fn transform(&self, data: &Dataset) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(ExoError::ModelNotFitted);
        }
        let missing = data.missing_columns(&self.input_columns());
        if !missing.is_empty() {
            return Err(ExoError::SchemaMismatch { missing });
        }

        let n_rows = data.n_rows();
        let numeric = self.numeric_imputer.transform(&self.numeric_cells(data)?)?;
        let scaled = self.scaler.transform(&numeric)?;
        let categorical = self
            .categorical_imputer
            .transform(&self.categorical_cells(data)?)?;
        let encoded = self.encoder.transform(&categorical, n_rows)?;

        let n_numeric = scaled.len();
        let width = n_numeric + self.encoder.n_outputs();
        Ok(Array2::from_shape_fn((n_rows, width), |(i, j)| {
            if j < n_numeric {
                scaled[j][i]
            } else {
                encoded[i][j - n_numeric]
            }
        }))
    }

    pub fn fit_transform(&mut self, data: &Dataset) -> Result<Array2<f64>> {
        self.fit(data)?;
        self.transform(data)
    }

    pub fn n_output_features(&self) -> usize {
        self.numeric_columns.len() + self.encoder.n_outputs()
    }

    /// Names of the transformed columns, aligned with [`Self::transform`] output
    pub fn output_feature_names(&self) -> Vec<String> {
        let mut names = self.numeric_columns.clone();
        names.extend(self.encoder.feature_names(&self.categorical_columns));
        names
    }

    fn numeric_cells(&self, data: &Dataset) -> Result<Vec<Vec<Option<f64>>>> {
        self.numeric_columns
            .iter()
            .map(|name| {
                data.column(name)
                    .map(|c| c.data.to_numeric())
                    .ok_or_else(|| ExoError::SchemaMismatch { missing: vec![name.clone()] })
            })
            .collect()
    }

    fn categorical_cells(&self, data: &Dataset) -> Result<Vec<Vec<Option<String>>>> {
        self.categorical_columns
            .iter()
            .map(|name| {
                data.column(name)
                    .map(|c| c.data.to_labels())
                    .ok_or_else(|| ExoError::SchemaMismatch { missing: vec![name.clone()] })
            })
            .collect()
    }
}
