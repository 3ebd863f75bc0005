// Shroud - Anonymized shadow copies of production databases
// Copyright (c) 2025 Shroud Contributors
// Licensed under the MIT License

use clap::Parser;
use shroud::cli::{Cli, Commands};
use shroud::config::{load_config, LoggingConfig};
use shroud::logging::init_logging;
use std::process;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // The configuration is loaded again by the command; here it only feeds the
    // logging setup, so a missing or broken file falls back to console logging.
    let (file_level, logging_config) = match load_config(&cli.config) {
        Ok(config) => (Some(config.application.log_level), config.logging),
        Err(_) => (None, LoggingConfig::default()),
    };
    let log_level = cli
        .log_level
        .clone()
        .or(file_level)
        .unwrap_or_else(|| "info".to_string());

    let guard = match init_logging(&log_level, &logging_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(5);
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Shroud - Anonymized shadow copies of production databases"
    );

    let exit_code = match execute_command(&cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command execution failed");
            eprintln!("Error: {e}");
            5
        }
    };

    drop(guard);
    process::exit(exit_code);
}

/// Execute the CLI command
async fn execute_command(cli: &Cli) -> anyhow::Result<i32> {
    match &cli.command {
        Commands::Dump(args) => args.execute(&cli.config).await,
        Commands::ValidateConfig(args) => args.execute(&cli.config).await,
        Commands::Drop(args) => args.execute(&cli.config).await,
        Commands::Init(args) => args.execute().await,
        Commands::Transforms(args) => args.execute(&cli.config).await,
    }
}
