pub mod client;
pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};

use client::GatewayClient;

#[derive(Parser)]
#[command(name = "gatewayctl", version, about = "Manage backend targets on a running workbench gateway")]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = "GATEWAY_URL",
        default_value = "http://127.0.0.1:7601",
        help = "Gateway base URL"
    )]
    pub url: String,

    #[arg(long, global = true, env = "GATEWAY_TOKEN", help = "Bearer token for the gateway API")]
    pub token: Option<String>,

    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Backend target registration")]
    Target {
        #[command(subcommand)]
        cmd: commands::target::TargetCommands,
    },

    #[command(about = "Check gateway health from the /health endpoint")]
    Health,
}

/// How command results are printed; `--json` wins over `--text`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl Cli {
    pub fn output_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let format = cli.output_format();
    let client = GatewayClient::new(&cli.url, cli.token.clone())?;

    match cli.command {
        Commands::Target { cmd } => commands::target::handle(cmd, &client, format).await,
        Commands::Health => commands::health::handle(&client, format).await,
    }
}
