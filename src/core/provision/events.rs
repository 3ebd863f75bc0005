//! Shadow database lifecycle events
//!
//! External collaborators (a schema installer, an audit hook) subscribe to the
//! provisioner through [`DatabaseEventListener`] and are told when the shadow
//! database has been created or dropped.

use crate::domain::{ConnectionDescriptor, Result, ShroudError};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// What happened to the shadow database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseEventKind {
    AfterCreated,
    AfterDropped,
}

impl fmt::Display for DatabaseEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseEventKind::AfterCreated => write!(f, "after-created"),
            DatabaseEventKind::AfterDropped => write!(f, "after-dropped"),
        }
    }
}

/// A lifecycle event with the descriptor of the affected database
#[derive(Debug, Clone)]
pub struct DatabaseEvent {
    pub kind: DatabaseEventKind,
    pub connection: ConnectionDescriptor,
}

impl DatabaseEvent {
    pub fn created(connection: ConnectionDescriptor) -> Self {
        Self {
            kind: DatabaseEventKind::AfterCreated,
            connection,
        }
    }

    pub fn dropped(connection: ConnectionDescriptor) -> Self {
        Self {
            kind: DatabaseEventKind::AfterDropped,
            connection,
        }
    }
}

/// Receives shadow database lifecycle events
#[async_trait]
pub trait DatabaseEventListener: Send + Sync {
    /// Called once per event; an error aborts provisioning
    async fn on_event(&self, event: &DatabaseEvent) -> Result<()>;
}

/// Fans events out to every subscribed listener, in subscription order
#[derive(Clone, Default)]
pub struct EventDispatcher {
    listeners: Vec<Arc<dyn DatabaseEventListener>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: Arc<dyn DatabaseEventListener>) {
        self.listeners.push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub async fn dispatch(&self, event: DatabaseEvent) -> Result<()> {
        tracing::info!(
            event = %event.kind,
            database = %event.connection.safe_display(),
            listeners = self.listeners.len(),
            "Shadow database event"
        );
        for listener in &self.listeners {
            listener.on_event(&event).await.map_err(|e| {
                ShroudError::Provisioning(format!("{} listener failed: {}", event.kind, e))
            })?;
        }
        Ok(())
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(DatabaseEventKind, Option<String>)>>,
    }

    #[async_trait]
    impl DatabaseEventListener for Recorder {
        async fn on_event(&self, event: &DatabaseEvent) -> Result<()> {
            self.seen
                .lock()
                .unwrap()
                .push((event.kind, event.connection.database.clone()));
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl DatabaseEventListener for Failing {
        async fn on_event(&self, _event: &DatabaseEvent) -> Result<()> {
            Err(ShroudError::Other("schema install failed".to_string()))
        }
    }

    fn shadow() -> ConnectionDescriptor {
        ConnectionDescriptor::from_url("postgresql://app@localhost/shop_anonymous").unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_reaches_every_listener() {
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        let mut dispatcher = EventDispatcher::new();
        dispatcher.subscribe(first.clone());
        dispatcher.subscribe(second.clone());

        dispatcher.dispatch(DatabaseEvent::created(shadow())).await.unwrap();

        for recorder in [first, second] {
            let seen = recorder.seen.lock().unwrap();
            assert_eq!(
                *seen,
                vec![(
                    DatabaseEventKind::AfterCreated,
                    Some("shop_anonymous".to_string())
                )]
            );
        }
    }

    #[tokio::test]
    async fn test_listener_failure_is_provisioning_error() {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.subscribe(Arc::new(Failing));
        let err = dispatcher
            .dispatch(DatabaseEvent::dropped(shadow()))
            .await
            .unwrap_err();
        assert!(matches!(err, ShroudError::Provisioning(_)));
        assert!(err.to_string().contains("after-dropped listener failed"));
    }
}
