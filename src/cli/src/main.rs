//! Atlas CLI - Command-line client for the Atlas experiment service.
//!
//! Provides experiment browsing, health, and configuration commands.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use commands::{config, experiment, health};
use output::OutputFormat;

const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Atlas - CRISPR experiment aggregation CLI
#[derive(Parser)]
#[command(
    name = "atlas",
    version,
    about = "Atlas - CRISPR experiment aggregation",
    long_about = "Browse experiments, their sequences, guide candidates and off-target sites.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format [default: table]
    #[arg(short, long, global = true)]
    output: Option<OutputFormat>,

    /// API server URL
    #[arg(long, global = true, env = "ATLAS_API_URL")]
    api_url: Option<String>,

    /// Principal to act as, sent in the X-Principal-Id header
    #[arg(long, global = true, env = "ATLAS_PRINCIPAL")]
    principal: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Experiment operations
    #[command(subcommand)]
    Experiment(experiment::ExperimentCommands),

    /// Check system health
    Health(health::HealthArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let saved = config::load();

    let format = cli
        .output
        .or_else(|| {
            saved
                .get("output")
                .and_then(|v| OutputFormat::from_str(v, true).ok())
        })
        .unwrap_or_default();

    let api_url = cli
        .api_url
        .or_else(|| saved.get("api-url").map(str::to_string))
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());

    let principal = cli
        .principal
        .or_else(|| saved.get("principal").map(str::to_string));

    let client = client::ApiClient::new(&api_url, principal)?;

    let result = match cli.command {
        Commands::Experiment(cmd) => experiment::execute(cmd, &client, format).await,
        Commands::Health(args) => health::execute(args, &client, format).await,
        Commands::Config(cmd) => config::execute(cmd, format).await,
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
