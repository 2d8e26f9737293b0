use clap::Subcommand;
use serde_json::json;

use crate::cli::client::{into_data, GatewayClient};
use crate::cli::utils::{output_success, output_targets};
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum TargetCommands {
    #[command(about = "Register a backend target, or update it by name")]
    Register {
        #[arg(help = "Target name")]
        name: String,
        #[arg(help = "Target base URL")]
        url: String,
        #[arg(long, short = 'p', required = true, help = "Owned path prefix (repeatable)")]
        prefix: Vec<String>,
        #[arg(long, default_value = "", help = "Target version")]
        version: String,
    },

    #[command(about = "List registered targets in registration order")]
    List,
}

pub async fn handle(cmd: TargetCommands, client: &GatewayClient, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        TargetCommands::Register {
            name,
            url,
            prefix,
            version,
        } => {
            let body = json!({
                "name": name,
                "url": url,
                "version": version,
                "prefixes": prefix,
            });
            let (status, response) = client.post("/api/gateway/targets", &body).await?;
            let target = into_data(status, response)?;
            output_success(output_format, &format!("Target '{}' registered", name), Some(target))
        }
        TargetCommands::List => {
            let (status, response) = client.get("/api/gateway/targets").await?;
            let targets = into_data(status, response)?;
            output_targets(output_format, &targets)
        }
    }
}
