//! Exoplanet classifier - tabular classification service
//!
//! Trains, stores and serves classifiers for exoplanet candidate
//! dispositions.
//!
//! # Modules
//!
//! - [`data`] - Typed tables and CSV ingestion
//! - [`preprocessing`] - Imputation, scaling and one-hot encoding
//! - [`training`] - Model families, metrics and the training orchestrator
//! - [`registry`] - Model artifacts, discovery and hot-swapping
//! - [`inference`] - Prediction over a loaded model
//! - [`analytics`] - Prediction statistics and chart data
//! - [`progress`] - Training progress fan-out
//! - [`server`] - HTTP and WebSocket API
//! - [`cli`] - Command-line interface

pub mod error;

pub mod data;
pub mod preprocessing;
pub mod training;

pub mod registry;
pub mod inference;
pub mod analytics;
pub mod progress;

pub mod server;
pub mod cli;

pub use error::{ExoError, Result};
