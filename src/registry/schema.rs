//! Column roles recovered from a fitted pipeline

use super::pipeline::TrainedPipeline;
use crate::data::Dataset;
use crate::error::{ExoError, Result};
use serde::{Deserialize, Serialize};

/// Ordered numeric and categorical input columns of a pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub numeric: Vec<String>,
    pub categorical: Vec<String>,
    pub classes: Option<Vec<String>>,
}

impl FeatureSchema {
    /// Read the preprocessor's column lists and the class labels.
    ///
    /// A pipeline without a preprocessor yields empty feature lists.
    pub fn extract(pipeline: &TrainedPipeline) -> Self {
        let (numeric, categorical) = pipeline
            .preprocessor
            .as_ref()
            .map(|pre| (pre.numeric_columns().to_vec(), pre.categorical_columns().to_vec()))
            .unwrap_or_default();
        let classes = (!pipeline.classes.is_empty()).then(|| pipeline.classes.clone());
        Self { numeric, categorical, classes }
    }

    /// Numeric then categorical
    pub fn all(&self) -> Vec<String> {
        self.numeric.iter().chain(&self.categorical).cloned().collect()
    }

    pub fn n_features(&self) -> usize {
        self.numeric.len() + self.categorical.len()
    }

    /// Keep only schema columns, in schema order.
    ///
    /// Extra columns are dropped; any missing schema column is an error
    /// naming every missing column. An empty schema accepts the table as is.
    pub fn align(&self, data: &Dataset) -> Result<Dataset> {
        if self.n_features() == 0 {
            return Ok(data.clone());
        }
        let all = self.all();
        let missing = data.missing_columns(&all);
        if !missing.is_empty() {
            return Err(ExoError::SchemaMismatch { missing });
        }
        data.select(&all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataColumn;

    fn schema() -> FeatureSchema {
        FeatureSchema {
            numeric: vec!["a".into(), "b".into()],
            categorical: vec!["c".into()],
            classes: None,
        }
    }

    #[test]
    fn test_align_reorders_and_drops_extra() {
        let data = Dataset::new(vec![
            DataColumn::categorical("c", vec![Some("x".into())]),
            DataColumn::numeric("extra", vec![Some(9.0)]),
            DataColumn::numeric("b", vec![Some(2.0)]),
            DataColumn::numeric("a", vec![Some(1.0)]),
        ])
        .unwrap();

        let aligned = schema().align(&data).unwrap();
        assert_eq!(aligned.column_names(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_align_names_every_missing_column() {
        let data = Dataset::new(vec![DataColumn::numeric("b", vec![Some(2.0)])]).unwrap();
        match schema().align(&data) {
            Err(ExoError::SchemaMismatch { missing }) => assert_eq!(missing, vec!["a", "c"]),
            other => panic!("expected SchemaMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_all_orders_numeric_first() {
        assert_eq!(schema().all(), vec!["a", "b", "c"]);
    }
}
