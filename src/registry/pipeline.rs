//! Fitted preprocessing + estimator unit persisted as a model artifact

use crate::data::Dataset;
use crate::error::{ExoError, Result};
use crate::preprocessing::ColumnPreprocessor;
use crate::training::{Estimator, ModelFamily};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Preprocessor and estimator fitted together, with the class labels the
/// estimator's indices refer to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedPipeline {
    pub family: ModelFamily,
    /// Sorted class labels; estimator output `i` means `classes[i]`
    pub classes: Vec<String>,
    pub preprocessor: Option<ColumnPreprocessor>,
    pub estimator: Estimator,
}

impl TrainedPipeline {
    pub fn new(classes: Vec<String>, preprocessor: Option<ColumnPreprocessor>, estimator: Estimator) -> Self {
        Self { family: estimator.family(), classes, preprocessor, estimator }
    }

    /// Feature matrix for the estimator.
    ///
    /// Without a preprocessor every column is read as a number in table
    /// order, with missing cells as 0.
    pub fn features(&self, data: &Dataset) -> Result<Array2<f64>> {
        match &self.preprocessor {
            Some(pre) => pre.transform(data),
            None => {
                let columns: Vec<Vec<Option<f64>>> =
                    data.columns().iter().map(|c| c.data.to_numeric()).collect();
                Ok(Array2::from_shape_fn((data.n_rows(), columns.len()), |(i, j)| {
                    columns[j][i].unwrap_or(0.0)
                }))
            }
        }
    }

    /// Predicted class index per row
    pub fn predict_indices(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        self.estimator.predict(x)
    }

    /// Class probabilities, or `None` when the estimator has no probability
    /// support or the computation fails
    pub fn predict_proba(&self, x: &Array2<f64>) -> Option<Array2<f64>> {
        match self.estimator.predict_proba(x)? {
            Ok(proba) if proba.ncols() == self.classes.len() => Some(proba),
            Ok(proba) => {
                warn!(
                    columns = proba.ncols(),
                    classes = self.classes.len(),
                    "Probability width does not match class count"
                );
                None
            }
            Err(e) => {
                warn!(error = %e, "Probability estimation failed");
                None
            }
        }
    }

    pub fn label(&self, index: usize) -> Result<String> {
        self.classes.get(index).cloned().ok_or_else(|| {
            ExoError::DataError(format!("predicted class index {} has no label", index))
        })
    }

    /// Names of the estimator's input features
    pub fn output_feature_names(&self) -> Vec<String> {
        self.preprocessor
            .as_ref()
            .map(ColumnPreprocessor::output_feature_names)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataColumn;
    use serde_json::Map;

    #[test]
    fn test_bare_pipeline_reads_columns_as_numbers() {
        let data = Dataset::new(vec![
            DataColumn::numeric("a", vec![Some(0.0), Some(0.2), Some(5.0), None]),
            DataColumn::categorical("b", vec![Some("1".into()), Some("x".into()), Some("4".into()), Some("5".into())]),
        ])
        .unwrap();

        let mut estimator = Estimator::build(ModelFamily::DecisionTree, &Map::new()).unwrap();
        let pipeline = TrainedPipeline::new(vec!["no".into(), "yes".into()], None, estimator.clone());
        let x = pipeline.features(&data).unwrap();
        assert_eq!(x.row(1).to_vec(), vec![0.2, 0.0]);
        assert_eq!(x.row(3).to_vec(), vec![0.0, 5.0]);

        estimator.fit(&x, &[0, 0, 1, 1], 2).unwrap();
        let pipeline = TrainedPipeline::new(vec!["no".into(), "yes".into()], None, estimator);
        assert!(pipeline.output_feature_names().is_empty());
        let predicted = pipeline.predict_indices(&x).unwrap();
        assert_eq!(pipeline.label(predicted[2]).unwrap(), "yes");
        assert!(pipeline.label(7).is_err());
    }
}
