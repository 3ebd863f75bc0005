//! Shadow database provisioner

use super::events::{DatabaseEvent, EventDispatcher};
use crate::adapters::database::traits::{AdminConnection, DatabaseServer};
use crate::config::ShadowConfig;
use crate::domain::{ConnectionDescriptor, Result, ShroudError};
use crate::{log_stage_complete, log_stage_start};
use std::sync::Arc;
use std::time::Instant;

/// Creates and drops the shadow database
///
/// Every operation opens one administrative connection (no database selected)
/// and closes it again on every exit path.
pub struct DatabaseProvisioner {
    server: Arc<dyn DatabaseServer + Send + Sync>,
    shadow: ShadowConfig,
    events: EventDispatcher,
    continue_on_drop_failure: bool,
}

impl DatabaseProvisioner {
    pub fn new(server: Arc<dyn DatabaseServer + Send + Sync>) -> Self {
        Self {
            server,
            shadow: ShadowConfig::default(),
            events: EventDispatcher::new(),
            continue_on_drop_failure: false,
        }
    }

    /// Explicit shadow name and credential overrides
    pub fn with_shadow_config(mut self, shadow: ShadowConfig) -> Self {
        self.shadow = shadow;
        self
    }

    pub fn with_events(mut self, events: EventDispatcher) -> Self {
        self.events = events;
        self
    }

    /// Keep going when a stale shadow database cannot be dropped
    pub fn continue_on_drop_failure(mut self, enabled: bool) -> Self {
        self.continue_on_drop_failure = enabled;
        self
    }

    /// Descriptor of the shadow database for `source`
    pub fn shadow_descriptor(&self, source: &ConnectionDescriptor) -> Result<ConnectionDescriptor> {
        let mut shadow = source.shadow(self.shadow.database.as_deref())?;
        self.shadow.apply(&mut shadow);
        Ok(shadow)
    }

    /// Drops any stale shadow database, creates a fresh one and returns its descriptor
    ///
    /// # Errors
    ///
    /// [`ShroudError::Provisioning`] when the stale database cannot be dropped
    /// (unless `continue_on_drop_failure`) or the new one cannot be created.
    pub async fn ensure_shadow_database(
        &self,
        source: &ConnectionDescriptor,
    ) -> Result<ConnectionDescriptor> {
        let start = Instant::now();
        let shadow = self.shadow_descriptor(source)?;
        let name = shadow.database_name()?.to_string();
        log_stage_start!("provision", name);

        let mut admin = self.server.connect_admin(&shadow.without_database()).await?;
        let outcome = self.recreate(admin.as_mut(), &shadow, &name).await;
        if let Err(e) = admin.close().await {
            tracing::warn!(error = %e, "Failed to close administrative connection");
        }
        outcome?;

        log_stage_complete!("provision", start.elapsed());
        Ok(shadow)
    }

    /// Drops the shadow database of `source` if it exists
    ///
    /// Returns whether a database was dropped.
    pub async fn drop_shadow_database(&self, source: &ConnectionDescriptor) -> Result<bool> {
        let shadow = self.shadow_descriptor(source)?;
        let name = shadow.database_name()?.to_string();

        let mut admin = self.server.connect_admin(&shadow.without_database()).await?;
        let outcome = self.drop_if_exists(admin.as_mut(), &shadow, &name).await;
        if let Err(e) = admin.close().await {
            tracing::warn!(error = %e, "Failed to close administrative connection");
        }
        outcome
    }

    async fn recreate(
        &self,
        admin: &mut dyn AdminConnection,
        shadow: &ConnectionDescriptor,
        name: &str,
    ) -> Result<()> {
        if let Err(e) = self.drop_if_exists(admin, shadow, name).await {
            if !self.continue_on_drop_failure {
                return Err(e);
            }
            tracing::warn!(database = %name, error = %e, "Continuing despite failed drop");
        }

        match admin.can_create_database().await {
            Ok(true) => {}
            Ok(false) => tracing::error!(
                database = %name,
                user = %shadow.user,
                "Role lacks the privilege to create databases; creation will likely fail"
            ),
            Err(e) => tracing::warn!(error = %e, "Could not probe database creation privilege"),
        }

        admin.create_database(name).await.map_err(|e| {
            ShroudError::Provisioning(format!("Could not create shadow database {name}: {e}"))
        })?;
        tracing::info!(database = %name, "Shadow database created");

        self.events.dispatch(DatabaseEvent::created(shadow.clone())).await
    }

    async fn drop_if_exists(
        &self,
        admin: &mut dyn AdminConnection,
        shadow: &ConnectionDescriptor,
        name: &str,
    ) -> Result<bool> {
        let existing = admin.list_databases().await.map_err(|e| {
            ShroudError::Provisioning(format!("Could not list databases: {e}"))
        })?;
        if !existing.iter().any(|db| db == name) {
            return Ok(false);
        }

        tracing::info!(database = %name, "Dropping existing shadow database");
        admin.drop_database(name).await.map_err(|e| {
            ShroudError::Provisioning(format!(
                "Could not drop existing shadow database {name}: {e}"
            ))
        })?;
        self.events.dispatch(DatabaseEvent::dropped(shadow.clone())).await?;
        Ok(true)
    }
}
