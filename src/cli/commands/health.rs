use anyhow::bail;
use serde_json::Value;

use crate::cli::client::GatewayClient;
use crate::cli::OutputFormat;

pub async fn handle(client: &GatewayClient, output_format: OutputFormat) -> anyhow::Result<()> {
    let (status, body) = client.get("/health").await?;

    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&body)?),
        OutputFormat::Text => {
            let data = &body["data"];
            let field = |name: &str| data[name].as_str().map(str::to_string).unwrap_or_else(|| "-".to_string());
            println!("status:    {}", field("status"));
            println!("database:  {}", field("database"));
            println!("workbench: {}", field("workbench"));
            if let Some(targets) = data["targets"].as_u64() {
                println!("targets:   {}", targets);
            }
            if let Some(Value::String(err)) = data.get("database_error") {
                println!("error:     {}", err);
            }
        }
    }

    if status != 200 {
        bail!("gateway unhealthy ({})", status);
    }
    Ok(())
}
