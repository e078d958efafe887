//! CLI entry point.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use llamarun_cli::{Cli, run};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.default_log_level()));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    run(cli).await
}
