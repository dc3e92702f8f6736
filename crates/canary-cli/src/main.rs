use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use canary_core::{DEFAULT_METRICS_ENDPOINT, Environment};

mod logging;
mod rollout;

#[derive(Parser, Debug)]
#[command(
    name = "canary",
    about = "Progressive canary deployment with automatic rollback",
    version
)]
pub struct Cli {
    /// Application (service) to roll out
    #[arg(long)]
    pub app: String,

    /// Target environment
    #[arg(long, value_enum, default_value_t = Environment::Dev)]
    pub env: Environment,

    /// Canary traffic percentage right after deploy
    #[arg(long, default_value_t = 5)]
    pub initial_traffic: u32,

    /// Percentage added at every ramp step
    #[arg(long, default_value_t = 10)]
    pub step: u32,

    /// Minutes to wait between ramp steps
    #[arg(long, default_value_t = 5)]
    pub interval: u64,

    /// Error rate (%) above which the canary is rolled back
    #[arg(long, default_value_t = 2.0)]
    pub rollback_threshold: f64,

    /// Prometheus instant-query endpoint
    #[arg(long, env = "METRICS_ENDPOINT", default_value = DEFAULT_METRICS_ENDPOINT)]
    pub metrics_endpoint: String,

    /// JSON config file laid over the defaults
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory for session logs, config snapshots, results and notifications
    #[arg(long, default_value = "logs")]
    pub log_dir: PathBuf,

    /// Console log format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Simulate the rollout without touching traffic or sending notifications
    #[arg(long)]
    pub dry_run: bool,

    /// Continue past failed prerequisites and health checks
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let session_log = logging::init(cli.log_format)?;
    rollout::run(cli, session_log).await
}
