//! Exoplanet classifier CLI module
//!
//! Command-line interface for serving, training, prediction and model
//! inspection.

use clap::{Parser, Subcommand};
use colored::*;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::data::read_csv_path;
use crate::inference::PredictionEngine;
use crate::progress::ProgressHub;
use crate::registry::ModelRegistry;
use crate::server::{run_server, ServerConfig};
use crate::training::{ModelFamily, Trainer, TrainerConfig, TrainingRequest, DEFAULT_RANDOM_STATE};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString    { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn kv(key: &str, val: impl std::fmt::Display) {
    println!("  {:<18} {}", muted(key), val.to_string().white());
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "exo-classifier")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Exoplanet candidate classification service")]
#[command(long_about = None)]
pub struct Cli {
    /// Directory holding model artifacts
    #[arg(long, global = true, env = "MODELS_DIR", default_value = "./models")]
    pub models_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP and WebSocket server
    Serve {
        /// Server host
        #[arg(long, env = "API_HOST", default_value = "0.0.0.0")]
        host: String,

        /// Server port
        #[arg(short, long, env = "API_PORT", default_value = "8000")]
        port: u16,
    },

    /// Train a model on a CSV file
    Train {
        /// Training data (CSV)
        #[arg(short, long)]
        data: PathBuf,

        /// Target column name
        #[arg(short, long)]
        target: String,

        /// Model family
        #[arg(short, long, default_value = "RandomForest")]
        model: String,

        /// Held-out share of rows
        #[arg(long, default_value = "0.2")]
        test_size: f64,

        /// Hyperparameters as a JSON object
        #[arg(long)]
        params: Option<String>,

        /// Directory for training metadata records
        #[arg(long, env = "OUTPUT_DIR", default_value = "./output")]
        output_dir: PathBuf,
    },

    /// Predict a CSV file with a stored model
    Predict {
        /// Input data (CSV)
        #[arg(short, long)]
        data: PathBuf,

        /// Artifact or family name; newest default model when omitted
        #[arg(short, long)]
        model: Option<String>,

        /// Per-row output with class probabilities
        #[arg(long)]
        detailed: bool,
    },

    /// List stored models
    Models,

    /// Show the hyperparameters of a model family
    Hyperparameters {
        family: String,
    },

    /// Check a CSV file before training
    Validate {
        #[arg(short, long)]
        data: PathBuf,

        #[arg(short, long)]
        target: String,
    },
}

/// Dispatch a parsed command line
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let models_dir = cli.models_dir;
    match cli.command {
        Commands::Serve { host, port } => cmd_serve(host, port, models_dir).await,
        Commands::Train { data, target, model, test_size, params, output_dir } => {
            cmd_train(&data, &target, &model, test_size, params.as_deref(), models_dir, output_dir).await
        }
        Commands::Predict { data, model, detailed } => cmd_predict(&data, model.as_deref(), detailed, &models_dir),
        Commands::Models => cmd_models(&models_dir),
        Commands::Hyperparameters { family } => cmd_hyperparameters(&family),
        Commands::Validate { data, target } => cmd_validate(&data, &target),
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub async fn cmd_serve(host: String, port: u16, models_dir: PathBuf) -> anyhow::Result<()> {
    let config = ServerConfig { host, port, models_dir, ..ServerConfig::default() };
    section("Serve");
    kv("Address", format!("http://{}:{}", config.host, config.port));
    kv("Models", config.models_dir.display());
    println!();
    run_server(config).await
}

pub async fn cmd_train(
    data_path: &Path,
    target: &str,
    model: &str,
    test_size: f64,
    params: Option<&str>,
    models_dir: PathBuf,
    output_dir: PathBuf,
) -> anyhow::Result<()> {
    section("Train");

    let hyperparameters: Map<String, Value> = match params {
        Some(raw) => serde_json::from_str(raw)?,
        None => Map::new(),
    };

    step_run("Loading data");
    let start = Instant::now();
    let dataset = read_csv_path(data_path)?;
    step_done(&format!("{} rows × {} cols in {:?}", dataset.n_rows(), dataset.n_columns(), start.elapsed()));

    let config = TrainerConfig {
        models_dir,
        output_dir,
        random_state: DEFAULT_RANDOM_STATE,
        progress_delay: Duration::ZERO,
    };
    let trainer = Trainer::new(config, Arc::new(ProgressHub::new()));
    let request = TrainingRequest::new(target, model)
        .with_hyperparameters(hyperparameters)
        .with_test_size(test_size);

    step_run(&format!("Training {}", model.cyan()));
    let start = Instant::now();
    let outcome = trainer.train(dataset, request).await?;
    step_done(&format!("{:?}", start.elapsed()));

    let meta = &outcome.metadata;
    println!();
    kv("Accuracy", format!("{:.4}", meta.metrics.accuracy));
    kv("F1 (macro)", format!("{:.4}", meta.metrics.f1_macro));
    kv("Precision (macro)", format!("{:.4}", meta.metrics.precision_macro));
    kv("Recall (macro)", format!("{:.4}", meta.metrics.recall_macro));
    kv("Classes", meta.data_info.classes.join(", "));
    kv("Artifact", &meta.model_path);
    for warning in &meta.warnings {
        println!("  {} {}", "!".yellow(), warning.yellow());
    }
    println!();
    Ok(())
}

pub fn cmd_predict(data_path: &Path, model: Option<&str>, detailed: bool, models_dir: &Path) -> anyhow::Result<()> {
    section("Predict");

    let registry = ModelRegistry::new(models_dir, ModelFamily::RandomForest);
    step_run("Loading model");
    let loaded = registry.load(None, model)?;
    step_done(&loaded.name);

    step_run("Loading data");
    let dataset = read_csv_path(data_path)?;
    step_done(&format!("{} rows", dataset.n_rows()));

    let engine = PredictionEngine::new();
    println!();
    if detailed {
        let result = engine.predict_detailed(&loaded, &dataset)?;
        for row in &result.predictions_detail {
            let confidence = row.confidence.map(|c| format!("{:.3}", c)).unwrap_or_else(|| "-".to_string());
            println!("  {:>6}  {:<24} {}", dim(&row.row_id.to_string()), row.prediction.white(), muted(&confidence));
        }
        println!();
        for (class, share) in &result.summary.predictions_by_class {
            kv(class, format!("{} ({:.2}%)", share.count, share.percentage));
        }
    } else {
        let result = engine.predict(&loaded, &dataset)?;
        for (class, count) in &result.metrics.class_distribution {
            kv(class, count);
        }
        if let Some(avg) = result.metrics.average_confidence {
            kv("Avg confidence", format!("{:.4}", avg));
        }
    }
    println!();
    Ok(())
}

pub fn cmd_models(models_dir: &Path) -> anyhow::Result<()> {
    section("Models");
    let registry = ModelRegistry::new(models_dir, ModelFamily::RandomForest);
    let models = registry.list_available()?;
    if models.is_empty() {
        println!("  {}", muted("No models found"));
    }
    for model in models {
        let accuracy = model
            .metrics
            .map(|m| format!("acc {:.4}", m.accuracy))
            .unwrap_or_default();
        println!("  {:<48} {:<20} {}", model.name.white(), accent(&model.family), dim(&accuracy));
    }
    println!();
    Ok(())
}

pub fn cmd_hyperparameters(family: &str) -> anyhow::Result<()> {
    let spec = Trainer::hyperparameters(family)?;
    section(&format!("Hyperparameters · {}", family));
    println!("{}", serde_json::to_string_pretty(&spec)?);
    Ok(())
}

pub fn cmd_validate(data_path: &Path, target: &str) -> anyhow::Result<()> {
    section("Validate");
    let dataset = read_csv_path(data_path)?;
    let trainer = Trainer::new(TrainerConfig::default(), Arc::new(ProgressHub::new()));
    let report = trainer.validate_data(&dataset, target);

    kv("Samples", report.n_samples);
    kv("Features", report.n_features);
    let verdict = if report.valid { ok("valid") } else { "invalid".red() };
    kv("Status", verdict);
    for issue in &report.issues {
        println!("  {} {}", "✗".red(), issue);
    }
    for warning in &report.warnings {
        println!("  {} {}", "!".yellow(), warning.yellow());
    }
    println!();
    Ok(())
}
