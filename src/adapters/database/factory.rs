//! Database server factory
//!
//! This module creates the adapter matching the configured source engine.

use crate::adapters::database::traits::DatabaseServer;
use crate::adapters::postgresql::PostgresServer;
use crate::config::schema::ShroudConfig;
use crate::domain::{EngineKind, Result};
#[cfg(not(feature = "mysql"))]
use crate::domain::ShroudError;
use std::sync::Arc;

/// Create a database server adapter for the given engine
///
/// Pool limits and timeouts come from the `[source]` section; the
/// administrative database from `[provision]`. No connection is opened here.
///
/// # Errors
///
/// Returns a configuration error when the engine's driver is not compiled in.
pub fn create_server(
    engine: EngineKind,
    config: &ShroudConfig,
) -> Result<Arc<dyn DatabaseServer + Send + Sync>> {
    match engine {
        EngineKind::PostgreSQL => {
            tracing::info!("Creating PostgreSQL adapter");
            let server = PostgresServer::new(
                config.source.pool_settings(),
                config.provision.admin_database.clone(),
            );
            Ok(Arc::new(server) as Arc<dyn DatabaseServer + Send + Sync>)
        }
        #[cfg(feature = "mysql")]
        EngineKind::MySql => {
            tracing::info!("Creating MySQL adapter");
            let server = crate::adapters::mysql::MySqlServer::new(config.source.pool_settings());
            Ok(Arc::new(server) as Arc<dyn DatabaseServer + Send + Sync>)
        }
        #[cfg(not(feature = "mysql"))]
        EngineKind::MySql => Err(ShroudError::Configuration(
            "MySQL support is not compiled in; rebuild with `--features mysql`".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    const CONFIG: &str = r#"
[source]
engine = "postgresql"
user = "app"
database = "shop"
"#;

    #[test]
    fn test_postgres_server_created() {
        let config = parse_config(CONFIG).unwrap();
        let server = create_server(EngineKind::PostgreSQL, &config).unwrap();
        assert_eq!(server.engine(), EngineKind::PostgreSQL);
    }

    #[cfg(not(feature = "mysql"))]
    #[test]
    fn test_mysql_requires_feature() {
        let config = parse_config(CONFIG).unwrap();
        let err = create_server(EngineKind::MySql, &config).err().unwrap();
        assert!(err.to_string().contains("--features mysql"));
    }
}
