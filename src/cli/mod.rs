//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for Shroud using clap.
//!
//! Exit codes: `0` success, `2` configuration error, `4` connection or
//! provisioning error, `5` failure in a later pipeline stage.

pub mod commands;

use clap::{Parser, Subcommand};

/// Shroud - anonymized shadow copies of production databases
#[derive(Parser, Debug)]
#[command(name = "shroud")]
#[command(version, about, long_about = None)]
#[command(author = "Shroud Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "shroud.toml", env = "SHROUD_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "SHROUD_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Provision, copy, anonymize and export the shadow database
    Dump(commands::dump::DumpArgs),

    /// Validate configuration file and mapping
    ValidateConfig(commands::validate::ValidateArgs),

    /// Drop the shadow database
    Drop(commands::drop::DropArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),

    /// List registered transform identifiers
    Transforms(commands::transforms::TransformsArgs),
}
