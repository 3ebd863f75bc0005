//! Integration tests for configuration loading and validation
//!
//! Note: Tests that modify environment variables should be run with --test-threads=1
//! to avoid interference between tests.

use shroud::config::{load_config, CopyStrategy};
use shroud::domain::EngineKind;
use std::io::Write;
use std::sync::Mutex;
use tempfile::NamedTempFile;

// Mutex to serialize tests that modify environment variables
static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Helper function to clean up environment variables
fn cleanup_env_vars() {
    std::env::remove_var("SHROUD_APPLICATION_LOG_LEVEL");
    std::env::remove_var("SHROUD_SOURCE_PASSWORD");
    std::env::remove_var("SHROUD_SHADOW_DATABASE");
    std::env::remove_var("SHROUD_ANONYMIZATION_PAGE_SIZE");
    std::env::remove_var("SHROUD_COPY_STRATEGY");
    std::env::remove_var("TEST_SOURCE_PASSWORD");
}

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_complete_config() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();

    let file = write_config(
        r#"
[application]
log_level = "debug"

[source]
engine = "postgresql"
host = "db.internal"
port = 6543
user = "app"
password = "hunter2"
database = "shop"

[source.options]
sslmode = "require"

[shadow]
database = "shop_review"

[provision]
continue_on_drop_failure = true

[copy]
strategy = "row_copy"
best_effort = true
page_size = 500

[anonymization]
pagination = true
page_size = 250
seed = 7
validate_transforms = true

[anonymization.constants]
country_fr = "FR"

[mapping.User]
email = "unique_email"
nickname = "constant_croar"

[mapping.Address]
country = "country_fr"

[export]
dump_file = "out/anonymized.sql"
"#,
    );

    let config = load_config(file.path()).unwrap();

    assert_eq!(config.application.log_level, "debug");
    let source = config.source_descriptor().unwrap();
    assert_eq!(source.engine, EngineKind::PostgreSQL);
    assert_eq!(source.port, 6543);
    assert_eq!(source.password_str(), "hunter2");
    assert_eq!(source.options["sslmode"], "require");

    let shadow = config.shadow_descriptor().unwrap();
    assert_eq!(shadow.database.as_deref(), Some("shop_review"));
    assert_eq!(shadow.host, "db.internal");

    assert!(config.provision.continue_on_drop_failure);
    assert_eq!(config.copy.strategy, CopyStrategy::RowCopy);
    assert!(config.copy.best_effort);
    assert_eq!(config.anonymization.page_size, 250);
    assert_eq!(config.anonymization.seed, Some(7));

    let entities: Vec<_> = config.mapping.keys().cloned().collect();
    assert_eq!(entities, vec!["User", "Address"]);
    let user_fields: Vec<_> = config.mapping["User"].keys().cloned().collect();
    assert_eq!(user_fields, vec!["email", "nickname"]);
    assert_eq!(config.export.dump_file, "out/anonymized.sql");
}

#[test]
fn test_load_minimal_config_uses_defaults() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();

    let file = write_config(
        r#"
[source]
url = "mysql://root@localhost/shop"
"#,
    );

    let config = load_config(file.path()).unwrap();
    let shadow = config.shadow_descriptor().unwrap();

    assert_eq!(shadow.engine, EngineKind::MySql);
    assert_eq!(shadow.port, 3306);
    assert_eq!(shadow.database.as_deref(), Some("shop_anonymous"));
    assert_eq!(config.copy.strategy, CopyStrategy::DumpLoad);
    assert!(!config.anonymization.pagination);
    assert_eq!(config.anonymization.page_size, 100);
    assert!(config.mapping.is_empty());
}

#[test]
fn test_env_var_substitution() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();
    std::env::set_var("TEST_SOURCE_PASSWORD", "from-env");

    let file = write_config(
        r#"
# password = "${NOT_SET_ANYWHERE}"
[source]
user = "app"
password = "${TEST_SOURCE_PASSWORD}"
database = "shop"
"#,
    );

    let config = load_config(file.path()).unwrap();
    assert_eq!(config.source_descriptor().unwrap().password_str(), "from-env");

    cleanup_env_vars();
}

#[test]
fn test_missing_env_vars_are_reported_together() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();

    let file = write_config(
        r#"
[source]
user = "${MISSING_SOURCE_USER}"
password = "${MISSING_SOURCE_PASSWORD}"
database = "shop"
"#,
    );

    let err = load_config(file.path()).unwrap_err().to_string();
    assert!(err.contains("MISSING_SOURCE_USER"));
    assert!(err.contains("MISSING_SOURCE_PASSWORD"));
}

#[test]
fn test_env_overrides() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();
    std::env::set_var("SHROUD_APPLICATION_LOG_LEVEL", "warn");
    std::env::set_var("SHROUD_SOURCE_PASSWORD", "override");
    std::env::set_var("SHROUD_SHADOW_DATABASE", "shop_copy");
    std::env::set_var("SHROUD_ANONYMIZATION_PAGE_SIZE", "42");
    std::env::set_var("SHROUD_COPY_STRATEGY", "row_copy");

    let file = write_config(
        r#"
[source]
user = "app"
database = "shop"
"#,
    );

    let result = load_config(file.path());
    cleanup_env_vars();
    let config = result.unwrap();

    assert_eq!(config.application.log_level, "warn");
    assert_eq!(config.source_descriptor().unwrap().password_str(), "override");
    assert_eq!(
        config.shadow_descriptor().unwrap().database.as_deref(),
        Some("shop_copy")
    );
    assert_eq!(config.anonymization.page_size, 42);
    assert_eq!(config.copy.strategy, CopyStrategy::RowCopy);
}

#[test]
fn test_shadow_equal_to_source_rejected() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();

    let file = write_config(
        r#"
[source]
user = "app"
database = "shop"

[shadow]
database = "shop"
"#,
    );

    let err = load_config(file.path()).unwrap_err().to_string();
    assert!(err.contains("must differ from the source database"));
}

#[test]
fn test_zero_page_size_rejected() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();

    let file = write_config(
        r#"
[source]
user = "app"
database = "shop"

[anonymization]
page_size = 0
"#,
    );

    assert!(load_config(file.path()).is_err());
}

#[test]
fn test_missing_file() {
    let err = load_config("/nonexistent/shroud.toml").unwrap_err();
    assert!(err.to_string().contains("Configuration file not found"));
}
