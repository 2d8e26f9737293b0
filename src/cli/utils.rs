use serde_json::{json, Value};

use crate::cli::OutputFormat;

/// Print the outcome of a mutating command
pub fn output_success(format: OutputFormat, message: &str, data: Option<Value>) -> anyhow::Result<()> {
    if format == OutputFormat::Text {
        println!("✓ {}", message);
        return Ok(());
    }
    let mut out = json!({ "success": true, "message": message });
    if let Some(data) = data {
        out["data"] = data;
    }
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

/// Render registered targets as an aligned table
pub fn output_targets(format: OutputFormat, targets: &Value) -> anyhow::Result<()> {
    let rows = targets.as_array().cloned().unwrap_or_default();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({ "targets": rows }))?);
        }
        OutputFormat::Text if rows.is_empty() => {
            println!("No targets registered");
        }
        OutputFormat::Text => {
            println!("{:<20} {:<36} {:<12} PREFIXES", "NAME", "URL", "VERSION");
            for row in rows {
                let prefixes: Vec<&str> = row["prefixes"]
                    .as_array()
                    .map(|p| p.iter().filter_map(Value::as_str).collect())
                    .unwrap_or_default();
                println!(
                    "{:<20} {:<36} {:<12} {}",
                    row["name"].as_str().unwrap_or("-"),
                    row["url"].as_str().unwrap_or("-"),
                    row["version"].as_str().unwrap_or("-"),
                    prefixes.join(", ")
                );
            }
        }
    }
    Ok(())
}
