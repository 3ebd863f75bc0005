//! `pg_dump` / `psql`

use super::process::{run_tool, ToolCommand};
use super::{check_dump_file, require_parameters, DumpTool, LoadTool, ToolSettings, ToolTarget};
use crate::domain::{ConnectionDescriptor, Result, ShroudError};
use async_trait::async_trait;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Escapes one field of a `.pgpass` line
fn pgpass_escape(field: &str) -> String {
    field.replace('\\', "\\\\").replace(':', "\\:")
}

/// Private password file for `PGPASSFILE`, removed when dropped
fn write_pgpass(descriptor: &ConnectionDescriptor, target: &ToolTarget<'_>) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()
        .map_err(|e| ShroudError::Io(format!("Failed to create password file: {}", e)))?;
    writeln!(
        file,
        "{}:{}:*:{}:{}",
        pgpass_escape(target.host),
        descriptor.port,
        pgpass_escape(target.user),
        pgpass_escape(descriptor.password_str())
    )
    .and_then(|_| file.flush())
    .map_err(|e| ShroudError::Io(format!("Failed to write password file: {}", e)))?;
    Ok(file)
}

fn base_command(
    tool: &str,
    settings: &ToolSettings,
    descriptor: &ConnectionDescriptor,
    target: &ToolTarget<'_>,
    pgpass: &NamedTempFile,
) -> ToolCommand {
    let mut command = ToolCommand::new(tool, settings.binary(tool))
        .arg(format!("--host={}", target.host))
        .arg(format!("--port={}", descriptor.port))
        .arg(format!("--username={}", target.user))
        .arg("--no-password")
        .env("PGPASSFILE", pgpass.path().display().to_string())
        .env("PGDATABASE", target.database);
    if let Some(mode) = descriptor.options.get("sslmode") {
        command = command.env("PGSSLMODE", mode.clone());
    }
    command
}

/// PostgreSQL dump through `pg_dump` (plain SQL format)
pub struct PgDump {
    settings: ToolSettings,
}

impl PgDump {
    pub fn new(settings: ToolSettings) -> Self {
        Self { settings }
    }

    pub(crate) fn command(
        &self,
        descriptor: &ConnectionDescriptor,
        target: &ToolTarget<'_>,
        pgpass: &NamedTempFile,
        path: &Path,
    ) -> ToolCommand {
        base_command("pg_dump", &self.settings, descriptor, target, pgpass)
            .arg("--format=plain")
            .arg("--no-owner")
            .arg("--no-privileges")
            .arg(format!("--file={}", path.display()))
            .args(self.settings.extra_options.iter().cloned())
            .arg(target.database)
            .args(self.settings.extra_options_after_database.iter().cloned())
    }
}

#[async_trait]
impl DumpTool for PgDump {
    fn name(&self) -> &str {
        "pg_dump"
    }

    async fn dump_to_file(&self, descriptor: &ConnectionDescriptor, path: &Path) -> Result<()> {
        let target = require_parameters(descriptor)?;
        let pgpass = write_pgpass(descriptor, &target)?;
        let command = self.command(descriptor, &target, &pgpass, path);

        run_tool(&command, self.settings.timeout).await?;
        check_dump_file(path)?;
        tracing::info!(database = %target.database, file = %path.display(), "Database dumped");
        Ok(())
    }
}

/// PostgreSQL load through `psql`, stopping at the first error
pub struct Psql {
    settings: ToolSettings,
}

impl Psql {
    pub fn new(settings: ToolSettings) -> Self {
        Self { settings }
    }

    pub(crate) fn command(
        &self,
        descriptor: &ConnectionDescriptor,
        target: &ToolTarget<'_>,
        pgpass: &NamedTempFile,
        path: &Path,
    ) -> ToolCommand {
        base_command("psql", &self.settings, descriptor, target, pgpass)
            .arg("--quiet")
            .arg("--set=ON_ERROR_STOP=1")
            .arg(format!("--file={}", path.display()))
            .args(self.settings.extra_options.iter().cloned())
            .arg(target.database)
            .args(self.settings.extra_options_after_database.iter().cloned())
    }
}

#[async_trait]
impl LoadTool for Psql {
    fn name(&self) -> &str {
        "psql"
    }

    async fn load_from_file(&self, descriptor: &ConnectionDescriptor, path: &Path) -> Result<()> {
        check_dump_file(path)?;
        let target = require_parameters(descriptor)?;
        let pgpass = write_pgpass(descriptor, &target)?;
        let command = self.command(descriptor, &target, &pgpass, path);

        run_tool(&command, self.settings.timeout).await?;
        tracing::info!(database = %target.database, file = %path.display(), "Dump loaded");
        Ok(())
    }
}
