//! Exoplanet classifier - main entry point

use clap::Parser;
use exo_classifier::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "exo_classifier=info,tower_http=info".into()),
        )
        .init();

    cli::run(Cli::parse()).await
}
