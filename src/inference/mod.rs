//! Inference module
//!
//! Runs a loaded pipeline against new tabular input and shapes the results
//! for the single-shot and batch prediction endpoints.

mod engine;

pub use engine::{
    BatchSummary, ConfidenceStats, DetailedPrediction, PredictionEngine, PredictionMetrics,
    PredictionResult, RawPrediction, RowPrediction,
};
