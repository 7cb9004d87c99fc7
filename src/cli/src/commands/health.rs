//! Health check command.
//!
//! Queries the `/health` endpoint and displays store and fan-out status.

use anyhow::Result;
use clap::Args;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct HealthArgs {
    /// Include fan-out pool statistics
    #[arg(short, long)]
    detailed: bool,
}

pub async fn execute(args: HealthArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: serde_json::Value = client.get_raw("/health").await?;

    if format != OutputFormat::Table {
        return output::print_item(&health, format);
    }

    let field = |key: &str| health.get(key).and_then(|v| v.as_str());
    let status = field("status").unwrap_or("unknown");

    output::print_header("System Health");
    output::print_detail("Status", status);
    output::print_detail("API URL", client.base_url());
    output::print_detail("Store", field("store").unwrap_or("unknown"));

    if let Some(version) = field("version") {
        output::print_detail("Version", version);
    }
    if let Some(ts) = field("timestamp") {
        output::print_detail("Timestamp", ts);
    }

    if args.detailed {
        if let Some(stats) = health.get("fanout").and_then(|v| v.as_object()) {
            output::print_header("Fan-out Pool");
            for (key, value) in stats {
                output::print_detail(key, &value.to_string());
            }
        }
    }

    if status == "healthy" {
        output::print_success("All systems operational");
    } else {
        output::print_error(&format!("System status: {}", status));
    }

    Ok(())
}
