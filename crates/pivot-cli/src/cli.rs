use clap::{Args, Parser, Subcommand};
use pivot_core::StrategyKind;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pivot")]
#[command(about = "Run task batches with adaptive execution strategies", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run a batch against the simulated work primitive")]
    Run(RunArgs),

    #[command(about = "Score every strategy for a batch without running it")]
    Score {
        #[arg(help = "Batch descriptor (JSON)")]
        batch: PathBuf,

        #[arg(short, long, help = "Configuration file (defaults to ~/.pivot/config.toml)")]
        config: Option<PathBuf>,

        #[arg(long, help = "System load to score under (defaults to a host sample)")]
        load: Option<f64>,

        #[arg(long, help = "Memory usage to score under (defaults to a host sample)")]
        memory: Option<f64>,
    },

    #[command(about = "Show configuration")]
    Config {
        #[arg(long, help = "Write the default configuration if none exists")]
        init: bool,

        #[arg(short, long, help = "Configuration file (defaults to ~/.pivot/config.toml)")]
        path: Option<PathBuf>,
    },
}

#[derive(Args)]
pub struct RunArgs {
    #[arg(help = "Batch descriptor (JSON)")]
    pub batch: PathBuf,

    #[arg(short, long, help = "Configuration file (defaults to ~/.pivot/config.toml)")]
    pub config: Option<PathBuf>,

    #[arg(short, long, help = "Force a strategy instead of scoring")]
    pub strategy: Option<StrategyKind>,

    #[arg(long, value_delimiter = ',', help = "Batch positions whose tasks fail")]
    pub fail: Vec<usize>,

    #[arg(long, default_value_t = 10, help = "Simulated latency per task in milliseconds")]
    pub latency_ms: u64,

    #[arg(long, default_value = "cli", help = "Session name used in logs")]
    pub session: String,

    #[arg(long, help = "Sample live host metrics instead of assuming an idle host")]
    pub host_metrics: bool,

    #[arg(short, long, help = "Write the per-task outcomes to this file (JSON)")]
    pub output: Option<PathBuf>,
}
