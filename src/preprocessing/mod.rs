//! Data preprocessing module
//!
//! Provides the preprocessing stage of a trained pipeline:
//! - Missing value imputation (median for numeric, most frequent for categorical)
//! - Feature scaling without centering
//! - One-hot encoding that tolerates categories unseen at fit time

mod encoder;
mod imputer;
mod pipeline;
mod scaler;

pub use encoder::OneHotEncoder;
pub use imputer::{MedianImputer, MostFrequentImputer, MISSING_CATEGORY};
pub use pipeline::{infer_feature_types, ColumnPreprocessor};
pub use scaler::Scaler;
