//! Pivot CLI - run task batches with adaptive execution strategies
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        reason = "Allow for tests"
    )
)]

use anyhow::Result;
use clap::Parser as _;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _};

mod cli;
mod handlers;
mod simulate;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pivot=info,pivot_engine=info,pivot_core=info".into()),
        )
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            handlers::handle_run(args).await?;
        }
        Commands::Score {
            batch,
            config,
            load,
            memory,
        } => {
            handlers::handle_score(&batch, config.as_deref(), load, memory)?;
        }
        Commands::Config { init, path } => {
            handlers::handle_config(init, path)?;
        }
    }

    Ok(())
}
