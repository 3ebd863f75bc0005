//! Transforms command implementation
//!
//! Lists the transform identifiers a mapping may reference.

use crate::config::{load_config, AnonymizationConfig};
use crate::transform::TransformRegistry;
use clap::Args;
use std::path::Path;

/// Arguments for the transforms command
#[derive(Args, Debug)]
pub struct TransformsArgs {}

impl TransformsArgs {
    /// Execute the transforms command
    ///
    /// Constants declared in the configuration file are listed too when the
    /// file exists.
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let anonymization = if Path::new(config_path).exists() {
            match load_config(config_path) {
                Ok(config) => config.anonymization,
                Err(e) => {
                    eprintln!("{e}");
                    return Ok(2);
                }
            }
        } else {
            AnonymizationConfig::default()
        };

        println!("Registered transforms:");
        for id in registered_ids(&anonymization) {
            println!("  {id}");
        }
        Ok(0)
    }
}

fn registered_ids(config: &AnonymizationConfig) -> Vec<String> {
    TransformRegistry::from_config(config)
        .ids()
        .into_iter()
        .map(str::to_string)
        .collect()
}
