//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::ShroudConfig;
use crate::config::secret_string;
use crate::domain::errors::ShroudError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into ShroudConfig
/// 4. Applies environment variable overrides (SHROUD_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Every failure is reported as [`ShroudError::Configuration`].
///
/// # Examples
///
/// ```no_run
/// use shroud::config::loader::load_config;
///
/// let config = load_config("shroud.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<ShroudConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ShroudError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        ShroudError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    parse_config(&contents)
}

/// Parses, overrides and validates configuration text
pub fn parse_config(contents: &str) -> Result<ShroudConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: ShroudConfig = toml::from_str(&contents)
        .map_err(|e| ShroudError::Configuration(format!("Failed to parse TOML: {}", e)))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        ShroudError::Configuration(format!("Configuration validation failed: {}", e))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are copied untouched. All missing variables are reported at once.
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| ShroudError::Other(format!("Invalid substitution pattern: {e}")))?;
    let mut result = String::new();
    let mut missing_vars = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    let placeholder = format!("${{{}}}", var_name);
                    processed_line = processed_line.replace(&placeholder, &value);
                }
                Err(_) => {
                    if !missing_vars.contains(&var_name.to_string()) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        result.push_str(&processed_line);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(ShroudError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(val) => val.parse().map(Some).map_err(|e| {
            ShroudError::Configuration(format!("Invalid value for {name}: {e}"))
        }),
        Err(_) => Ok(None),
    }
}

/// Applies environment variable overrides using the SHROUD_* prefix
///
/// Environment variables follow the pattern: SHROUD_<SECTION>_<KEY>
/// For example: SHROUD_SOURCE_PASSWORD, SHROUD_ANONYMIZATION_PAGE_SIZE
fn apply_env_overrides(config: &mut ShroudConfig) -> Result<()> {
    // Application overrides
    if let Ok(val) = std::env::var("SHROUD_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }

    // Source overrides
    if let Ok(val) = std::env::var("SHROUD_SOURCE_URL") {
        config.source.url = Some(secret_string(val));
    }
    if let Some(engine) = parse_env("SHROUD_SOURCE_ENGINE")? {
        config.source.engine = engine;
    }
    if let Ok(val) = std::env::var("SHROUD_SOURCE_HOST") {
        config.source.host = val;
    }
    if let Some(port) = parse_env("SHROUD_SOURCE_PORT")? {
        config.source.port = Some(port);
    }
    if let Ok(val) = std::env::var("SHROUD_SOURCE_USER") {
        config.source.user = val;
    }
    if let Ok(val) = std::env::var("SHROUD_SOURCE_PASSWORD") {
        config.source.password = Some(secret_string(val));
    }
    if let Ok(val) = std::env::var("SHROUD_SOURCE_DATABASE") {
        config.source.database = Some(val);
    }

    // Shadow overrides
    if let Ok(val) = std::env::var("SHROUD_SHADOW_DATABASE") {
        config.shadow.database = Some(val);
    }

    // Provision overrides
    if let Some(flag) = parse_env("SHROUD_PROVISION_CONTINUE_ON_DROP_FAILURE")? {
        config.provision.continue_on_drop_failure = flag;
    }

    // Copy overrides
    if let Some(strategy) = parse_env("SHROUD_COPY_STRATEGY")? {
        config.copy.strategy = strategy;
    }
    if let Some(flag) = parse_env("SHROUD_COPY_BEST_EFFORT")? {
        config.copy.best_effort = flag;
    }
    if let Some(timeout) = parse_env("SHROUD_COPY_TIMEOUT_SECONDS")? {
        config.copy.timeout_seconds = timeout;
    }
    if let Ok(val) = std::env::var("SHROUD_COPY_BINARY_PATH") {
        config.copy.binary_path = Some(val);
    }

    // Anonymization overrides
    if let Some(flag) = parse_env("SHROUD_ANONYMIZATION_PAGINATION")? {
        config.anonymization.pagination = flag;
    }
    if let Some(size) = parse_env("SHROUD_ANONYMIZATION_PAGE_SIZE")? {
        config.anonymization.page_size = size;
    }
    if let Some(seed) = parse_env("SHROUD_ANONYMIZATION_SEED")? {
        config.anonymization.seed = Some(seed);
    }

    // Export overrides
    if let Ok(val) = std::env::var("SHROUD_EXPORT_DUMP_FILE") {
        config.export.dump_file = val;
    }

    // Logging overrides
    if let Some(flag) = parse_env("SHROUD_LOGGING_LOCAL_ENABLED")? {
        config.logging.local_enabled = flag;
    }
    if let Ok(val) = std::env::var("SHROUD_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }

    Ok(())
}
