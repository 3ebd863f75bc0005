//! External dump and load tools
//!
//! The dump/load copy strategy shells out to the engine's own client tools:
//! `pg_dump`/`psql` for PostgreSQL and `mysqldump`/`mysql` for MySQL.
//! Credentials travel through a private temporary file, never on the command
//! line, and every tool runs under the configured timeout.

pub mod mysql;
pub mod postgres;
pub mod process;

pub use process::{run_tool, ProcessOutcome, ToolCommand};

use crate::config::CopyConfig;
use crate::domain::{ConnectionDescriptor, CopyError, EngineKind, Result, ShroudError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Writes a database to a dump file
#[async_trait]
pub trait DumpTool: Send + Sync {
    fn name(&self) -> &str;

    async fn dump_to_file(&self, descriptor: &ConnectionDescriptor, path: &Path) -> Result<()>;
}

/// Replays a dump file into a database
#[async_trait]
pub trait LoadTool: Send + Sync {
    fn name(&self) -> &str;

    async fn load_from_file(&self, descriptor: &ConnectionDescriptor, path: &Path) -> Result<()>;
}

/// Settings shared by every tool
#[derive(Debug, Clone)]
pub struct ToolSettings {
    /// Directory holding the binaries; `PATH` lookup when `None`
    pub binary_path: Option<PathBuf>,
    pub timeout: Duration,
    pub extra_options: Vec<String>,
    pub extra_options_after_database: Vec<String>,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self::from_config(&CopyConfig::default())
    }
}

impl ToolSettings {
    pub fn from_config(config: &CopyConfig) -> Self {
        Self {
            binary_path: config
                .binary_path
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(normalize_binary_path),
            timeout: config.timeout(),
            extra_options: config.extra_options.clone(),
            extra_options_after_database: config.extra_options_after_database.clone(),
        }
    }

    /// Full path of a binary, or its bare name for `PATH` lookup
    pub fn binary(&self, name: &str) -> PathBuf {
        match &self.binary_path {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }
}

/// `/usr/lib/postgresql/16/bin/` → `/usr/lib/postgresql/16/bin`
fn normalize_binary_path(path: &str) -> PathBuf {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        PathBuf::from("/")
    } else {
        PathBuf::from(trimmed)
    }
}

/// Dump and load tools of one engine
pub struct ToolKit {
    pub dump: Box<dyn DumpTool>,
    pub load: Box<dyn LoadTool>,
}

impl ToolKit {
    pub fn for_engine(engine: EngineKind, settings: &ToolSettings) -> Self {
        match engine {
            EngineKind::PostgreSQL => Self {
                dump: Box::new(postgres::PgDump::new(settings.clone())),
                load: Box::new(postgres::Psql::new(settings.clone())),
            },
            EngineKind::MySql => Self {
                dump: Box::new(mysql::MySqlDump::new(settings.clone())),
                load: Box::new(mysql::MySqlLoad::new(settings.clone())),
            },
        }
    }
}

impl std::fmt::Debug for ToolKit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolKit")
            .field("dump", &self.dump.name())
            .field("load", &self.load.name())
            .finish()
    }
}

/// Connection parameters every tool needs
pub(crate) struct ToolTarget<'a> {
    pub host: &'a str,
    pub user: &'a str,
    pub database: &'a str,
}

/// Rejects descriptors missing a host, user or database
pub(crate) fn require_parameters(descriptor: &ConnectionDescriptor) -> Result<ToolTarget<'_>> {
    let non_empty = |name: &str, value: &str| -> Result<()> {
        if value.trim().is_empty() {
            return Err(CopyError::MissingParameter(name.to_string()).into());
        }
        Ok(())
    };

    non_empty("host", &descriptor.host)?;
    non_empty("user", &descriptor.user)?;
    let database = descriptor
        .database
        .as_deref()
        .ok_or_else(|| ShroudError::from(CopyError::MissingParameter("database".to_string())))?;
    non_empty("database", database)?;

    Ok(ToolTarget {
        host: &descriptor.host,
        user: &descriptor.user,
        database,
    })
}

/// Fails unless `path` is an existing, non-empty file
pub fn check_dump_file(path: &Path) -> Result<()> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => metadata,
        _ => return Err(CopyError::DumpFileMissing(path.display().to_string()).into()),
    };
    if metadata.len() == 0 {
        return Err(CopyError::DumpFileEmpty(path.display().to_string()).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_path_normalised() {
        let config = CopyConfig {
            binary_path: Some("/usr/lib/postgresql/16/bin/".to_string()),
            ..CopyConfig::default()
        };
        let settings = ToolSettings::from_config(&config);
        assert_eq!(
            settings.binary("pg_dump"),
            PathBuf::from("/usr/lib/postgresql/16/bin/pg_dump")
        );

        let settings = ToolSettings::default();
        assert_eq!(settings.binary("psql"), PathBuf::from("psql"));
    }

    #[test]
    fn test_toolkit_per_engine() {
        let settings = ToolSettings::default();
        let pg = ToolKit::for_engine(EngineKind::PostgreSQL, &settings);
        assert_eq!((pg.dump.name(), pg.load.name()), ("pg_dump", "psql"));

        let my = ToolKit::for_engine(EngineKind::MySql, &settings);
        assert_eq!((my.dump.name(), my.load.name()), ("mysqldump", "mysql"));
    }

    #[test]
    fn test_require_parameters() {
        let descriptor = ConnectionDescriptor::from_url("postgresql://app@localhost/shop").unwrap();
        let target = require_parameters(&descriptor).unwrap();
        assert_eq!(target.database, "shop");

        let err = require_parameters(&descriptor.without_database())
            .err()
            .unwrap();
        assert!(err.to_string().contains("`database` cannot be empty"));

        let mut nameless = descriptor.clone();
        nameless.user = String::new();
        let err = require_parameters(&nameless).err().unwrap();
        assert!(err.to_string().contains("`user` cannot be empty"));
    }

    #[test]
    fn test_check_dump_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.sql");

        let err = check_dump_file(&path).unwrap_err();
        assert!(matches!(err, ShroudError::Copy(CopyError::DumpFileMissing(_))));

        std::fs::write(&path, "").unwrap();
        let err = check_dump_file(&path).unwrap_err();
        assert!(matches!(err, ShroudError::Copy(CopyError::DumpFileEmpty(_))));

        std::fs::write(&path, "CREATE TABLE t ();\n").unwrap();
        assert!(check_dump_file(&path).is_ok());
    }
}
