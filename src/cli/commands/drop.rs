//! Drop command implementation
//!
//! Removes the shadow database, the recovery step after a failed run.

use crate::adapters::database::create_server;
use crate::config::load_config;
use crate::core::provision::DatabaseProvisioner;
use clap::Args;

/// Arguments for the drop command
#[derive(Args, Debug)]
pub struct DropArgs {
    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

impl DropArgs {
    /// Execute the drop command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("{e}");
                return Ok(2);
            }
        };
        let (source, shadow) = match (config.source_descriptor(), config.shadow_descriptor()) {
            (Ok(source), Ok(shadow)) => (source, shadow),
            (Err(e), _) | (_, Err(e)) => {
                eprintln!("Configuration validation failed: {e}");
                return Ok(2);
            }
        };

        if !self.yes {
            print!("Drop shadow database {}? [y/N]: ", shadow.safe_display());
            use std::io::{self, Write};
            io::stdout().flush()?;

            let mut input = String::new();
            io::stdin().read_line(&mut input)?;
            if !input.trim().eq_ignore_ascii_case("y") {
                println!("Drop cancelled.");
                return Ok(0);
            }
        }

        let server = match create_server(source.engine, &config) {
            Ok(server) => server,
            Err(e) => {
                eprintln!("{e}");
                return Ok(2);
            }
        };
        let provisioner = DatabaseProvisioner::new(server)
            .with_shadow_config(config.shadow.clone());

        match provisioner.drop_shadow_database(&source).await {
            Ok(true) => {
                println!("✅ Shadow database dropped: {}", shadow.safe_display());
                Ok(0)
            }
            Ok(false) => {
                println!("Shadow database does not exist: {}", shadow.safe_display());
                Ok(0)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to drop shadow database");
                println!("❌ Failed to drop shadow database");
                println!("   Error: {e}");
                Ok(4)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_config_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let code = DropArgs { yes: true }
            .execute(path.to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(code, 2);
    }
}
