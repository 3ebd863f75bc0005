//! PostgreSQL client implementation
//!
//! This module builds the connection pool for one database and hands out the
//! dedicated session the adapter runs on.

use crate::config::PoolSettings;
use crate::domain::{ConnectionDescriptor, Result, ShroudError};
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use postgres_native_tls::MakeTlsConnector;
use tokio_postgres::config::SslMode;
use tokio_postgres::NoTls;

const APPLICATION_NAME: &str = "shroud";

/// PostgreSQL client for one database
///
/// Session settings (`session_replication_role`, disabled triggers) belong to
/// a physical connection, so callers keep the [`Object`] returned by
/// [`PostgresClient::session`] for as long as they rely on them.
pub struct PostgresClient {
    /// Connection pool
    pool: Pool,

    descriptor: ConnectionDescriptor,
}

impl PostgresClient {
    /// Create a new PostgreSQL client
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor carries an unsupported `sslmode` or
    /// the pool cannot be built.
    pub fn new(descriptor: &ConnectionDescriptor, settings: &PoolSettings) -> Result<Self> {
        let pg_config = pg_config(descriptor, settings)?;
        let manager_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let manager = match tls_connector(descriptor)? {
            Some(tls) => Manager::from_config(pg_config, tls, manager_config),
            None => Manager::from_config(pg_config, NoTls, manager_config),
        };

        let pool = Pool::builder(manager)
            .max_size(settings.max_connections)
            .wait_timeout(Some(settings.connection_timeout))
            .create_timeout(Some(settings.connection_timeout))
            .recycle_timeout(Some(settings.connection_timeout))
            .runtime(deadpool_postgres::Runtime::Tokio1)
            .build()
            .map_err(|e| {
                ShroudError::Connection(format!("Failed to create connection pool: {}", e))
            })?;

        Ok(Self {
            pool,
            descriptor: descriptor.clone(),
        })
    }

    /// Get a session from the pool
    ///
    /// # Errors
    ///
    /// Returns a connection error if the server cannot be reached.
    pub async fn session(&self) -> Result<Object> {
        self.pool.get().await.map_err(|e| {
            ShroudError::Connection(format!(
                "Failed to connect to {}: {}",
                self.descriptor.safe_display(),
                e
            ))
        })
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    /// Get the pool statistics
    pub fn pool_status(&self) -> deadpool_postgres::Status {
        self.pool.status()
    }

    /// Closes every pooled connection
    pub fn close(&self) {
        self.pool.close();
    }
}

fn pg_config(
    descriptor: &ConnectionDescriptor,
    settings: &PoolSettings,
) -> Result<tokio_postgres::Config> {
    let mut config = tokio_postgres::Config::new();
    config
        .host(&descriptor.host)
        .port(descriptor.port)
        .user(&descriptor.user)
        .application_name(APPLICATION_NAME)
        .connect_timeout(settings.connection_timeout)
        .ssl_mode(ssl_mode(descriptor)?);

    if descriptor.password.is_some() {
        config.password(descriptor.password_str());
    }
    if let Some(database) = &descriptor.database {
        config.dbname(database);
    }
    if let Some(timeout) = settings.statement_timeout {
        config.options(&format!("-c statement_timeout={}", timeout.as_millis()));
    }

    Ok(config)
}

fn sslmode(descriptor: &ConnectionDescriptor) -> &str {
    descriptor
        .options
        .get("sslmode")
        .map(String::as_str)
        .unwrap_or("prefer")
}

fn ssl_mode(descriptor: &ConnectionDescriptor) -> Result<SslMode> {
    match sslmode(descriptor) {
        "disable" => Ok(SslMode::Disable),
        "allow" | "prefer" => Ok(SslMode::Prefer),
        "require" | "verify-ca" | "verify-full" => Ok(SslMode::Require),
        other => Err(ShroudError::Configuration(format!(
            "Unsupported sslmode '{other}'"
        ))),
    }
}

/// TLS connector matching libpq's `sslmode` semantics
///
/// `require` encrypts without verifying, `verify-ca` checks the chain but not
/// the host name, `verify-full` checks both.
fn tls_connector(descriptor: &ConnectionDescriptor) -> Result<Option<MakeTlsConnector>> {
    let mode = sslmode(descriptor);
    if mode == "disable" {
        return Ok(None);
    }

    let mut builder = native_tls::TlsConnector::builder();
    match mode {
        "verify-full" => {}
        "verify-ca" => {
            builder.danger_accept_invalid_hostnames(true);
        }
        _ => {
            builder.danger_accept_invalid_certs(true);
        }
    }

    let connector = builder
        .build()
        .map_err(|e| ShroudError::Connection(format!("Failed to initialise TLS: {}", e)))?;
    Ok(Some(MakeTlsConnector::new(connector)))
}
