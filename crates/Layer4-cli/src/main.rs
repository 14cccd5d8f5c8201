//! Conductor CLI - Main entry point

mod cli;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Conductor - action orchestration core for AI coding assistants
#[derive(Parser, Debug)]
#[command(name = "conductor")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to conductor.toml (defaults to ~/.conductor/conductor.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to configured tool providers and print the aggregated operations
    Status {
        /// MCP config file(s) to load instead of the global/project ones
        #[arg(long = "mcp-config")]
        mcp_config: Vec<PathBuf>,
    },
    /// Validate an action plan and dispatch it
    Dispatch {
        /// Plan JSON file
        plan: PathBuf,
    },
    /// Submit an execution report and stream its summary
    Report {
        /// Report JSON file
        report: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging (stdout은 결과 출력용)
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = cli::load_config(args.config.as_deref(), args.debug)?;

    match args.command {
        Command::Status { mcp_config } => cli::status(&config, &mcp_config).await,
        Command::Dispatch { plan } => cli::dispatch(&config, &plan).await,
        Command::Report { report } => cli::report(&config, &report).await,
    }
}
