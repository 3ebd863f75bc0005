//! Validate config command implementation
//!
//! This module implements the `validate-config` command: the configuration
//! file is loaded and validated, and every transform named by the mapping is
//! checked against the registry.

use crate::config::{load_config, ShroudConfig};
use crate::domain::{Mapping, Result};
use crate::transform::TransformRegistry;
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => {
                println!("✅ Configuration file loaded successfully");
                c
            }
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        match validate_mapping(&config) {
            Ok(mapping) => {
                println!("✅ Mapping is valid");
                println!();
                print_summary(&config, &mapping);
                Ok(0)
            }
            Err(e) => {
                println!("❌ Mapping validation failed");
                println!("   Error: {e}");
                println!();
                Ok(2)
            }
        }
    }
}

/// Builds the mapping and checks it against a fresh registry
pub fn validate_mapping(config: &ShroudConfig) -> Result<Mapping> {
    let mapping = Mapping::from_config(&config.mapping)?;
    TransformRegistry::from_config(&config.anonymization).validate_mapping(&mapping)?;
    Ok(mapping)
}

fn print_summary(config: &ShroudConfig, mapping: &Mapping) {
    println!("Configuration Summary:");
    println!("  Log Level: {}", config.application.log_level);
    if let Ok(source) = config.source_descriptor() {
        println!("  Engine: {}", source.engine);
        println!("  Source: {}", source.safe_display());
    }
    if let Ok(shadow) = config.shadow_descriptor() {
        println!("  Shadow: {}", shadow.safe_display());
    }
    println!("  Copy Strategy: {}", config.copy.strategy);
    println!(
        "  Pagination: {}",
        if config.anonymization.pagination {
            format!("{} rows per page", config.anonymization.page_size)
        } else {
            "disabled".to_string()
        }
    );
    if config.export.enabled {
        println!("  Dump File: {}", config.export.dump_file);
    } else {
        println!("  Dump File: (export disabled)");
    }
    println!(
        "  Mapping: {} entities, {} fields",
        mapping.entities().len(),
        mapping.rule_count()
    );
    for entity in mapping.entities() {
        for (field, transform) in entity.fields() {
            println!("    {}.{} → {}", entity.entity(), field, transform);
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(mapping: &str) -> ShroudConfig {
        toml::from_str(&format!(
            r#"
[source]
user = "app"
database = "shop"

[anonymization.constants]
country_fr = "FR"

{mapping}
"#
        ))
        .unwrap()
    }

    #[test]
    fn test_known_transforms_pass() {
        let mapping = validate_mapping(&config(
            r#"
[mapping.User]
email = "unique_email"
country = "country_fr"
"#,
        ))
        .unwrap();
        assert_eq!(mapping.rule_count(), 2);
    }

    #[test]
    fn test_unknown_transform_fails() {
        let err = validate_mapping(&config(
            r#"
[mapping.User]
iban = "faker_iban"
"#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("User.iban → faker_iban"));
    }
}
