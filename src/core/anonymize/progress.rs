//! Count-based progress of the walker
//!
//! The walker announces the row total of each entity and advances once per
//! row. Presentation is left to the sink.

use crate::domain::EntityName;

/// Receives progress of the anonymization walker
pub trait ProgressSink: Send {
    fn start(&mut self, entity: &EntityName, total_rows: u64);

    fn advance(&mut self, rows: u64);

    fn finish(&mut self);
}

/// Logs progress through `tracing` every tenth of an entity
#[derive(Debug, Default)]
pub struct LogProgress {
    entity: Option<String>,
    total: u64,
    done: u64,
    last_decile: u64,
}

impl LogProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressSink for LogProgress {
    fn start(&mut self, entity: &EntityName, total_rows: u64) {
        self.entity = Some(entity.to_string());
        self.total = total_rows;
        self.done = 0;
        self.last_decile = 0;
        tracing::info!(entity = %entity, total_rows, "Anonymizing entity");
    }

    fn advance(&mut self, rows: u64) {
        self.done += rows;
        if self.total == 0 {
            return;
        }
        let decile = (self.done * 10 / self.total).min(10);
        if decile > self.last_decile {
            self.last_decile = decile;
            tracing::debug!(
                entity = self.entity.as_deref().unwrap_or_default(),
                done = self.done,
                total = self.total,
                "{}%",
                decile * 10
            );
        }
    }

    fn finish(&mut self) {
        tracing::info!(
            entity = self.entity.as_deref().unwrap_or_default(),
            rows = self.done,
            "Entity anonymized"
        );
        self.entity = None;
    }
}

/// Discards progress
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn start(&mut self, _entity: &EntityName, _total_rows: u64) {}

    fn advance(&mut self, _rows: u64) {}

    fn finish(&mut self) {}
}
