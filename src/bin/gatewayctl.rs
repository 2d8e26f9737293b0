use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use workbench_gateway::cli::{self, Cli};

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so `--json` output stays pipeable
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    match cli::run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("gatewayctl: {e:#}");
            ExitCode::FAILURE
        }
    }
}
