//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in the sink.
//! Events implement the `InternalEvent` trait which emits the
//! corresponding metric through the `metrics` facade.

use metrics::{counter, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Event emitted when the target table is created (or confirmed).
pub struct TableCreated;

impl InternalEvent for TableCreated {
    fn emit(self) {
        trace!("Table created");
        counter!("snowdrift_tables_created_total").increment(1);
    }
}

/// Event emitted when an entity is appended to the in-flight batch.
pub struct EntityBuffered;

impl InternalEvent for EntityBuffered {
    fn emit(self) {
        trace!("Entity buffered");
        counter!("snowdrift_entities_buffered_total").increment(1);
    }
}

/// Event emitted when an entity is written directly (unbatched mode).
pub struct EntityWritten;

impl InternalEvent for EntityWritten {
    fn emit(self) {
        trace!("Entity written");
        counter!("snowdrift_entities_written_total").increment(1);
    }
}

/// Event emitted when a batch commit completes.
pub struct BatchCommitted {
    pub entities: u64,
    pub duration: Duration,
}

impl InternalEvent for BatchCommitted {
    fn emit(self) {
        trace!(
            entities = self.entities,
            duration_ms = self.duration.as_millis(),
            "Batch committed"
        );
        counter!("snowdrift_batch_commits_total").increment(1);
        counter!("snowdrift_entities_committed_total").increment(self.entities);
        histogram!("snowdrift_batch_commit_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// Event emitted when a batch commit fails and its entities are dropped.
pub struct BatchCommitFailed {
    pub entities_lost: u64,
}

impl InternalEvent for BatchCommitFailed {
    fn emit(self) {
        trace!(entities_lost = self.entities_lost, "Batch commit failed");
        counter!("snowdrift_batch_commit_failures_total").increment(1);
        counter!("snowdrift_entities_lost_total").increment(self.entities_lost);
    }
}

/// Stage at which an event was dropped.
#[derive(Debug, Clone, Copy)]
pub enum DropStage {
    Table,
    Keys,
    Entity,
    Write,
    Commit,
}

impl DropStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropStage::Table => "table",
            DropStage::Keys => "keys",
            DropStage::Entity => "entity",
            DropStage::Write => "write",
            DropStage::Commit => "commit",
        }
    }
}

/// Event emitted when a log event is dropped after a contained error.
pub struct EventDropped {
    pub stage: DropStage,
}

impl InternalEvent for EventDropped {
    fn emit(self) {
        trace!(stage = self.stage.as_str(), "Event dropped");
        counter!("snowdrift_events_dropped_total", "stage" => self.stage.as_str()).increment(1);
    }
}
