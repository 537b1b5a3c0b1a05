//! The table sink: per-event orchestration and error containment.
//!
//! For each incoming event the sink lazily creates the target table,
//! derives the partition key, rotates the batch if the key changed,
//! derives the row key, builds the entity, and hands it to the
//! accumulator (or writes it directly when batching is disabled).
//!
//! Everything fallible funnels through `Result<(), SinkError>`; the
//! public [`TableSink::emit`] contains every non-fatal error so that a
//! failure shipping logs never raises into the host application's
//! control flow. Shutdown signals from the store client are the one
//! exception: they always propagate.

use snafu::prelude::*;
use tracing::{debug, error};

use crate::batch::BatchAccumulator;
use crate::config::Config;
use crate::emit;
use crate::entity::EntityBuilder;
use crate::error::{
    AppendEntitySnafu, BuildEntitySnafu, CommitBatchSnafu, ConfigError, EnsureTableSnafu,
    PartitionKeySnafu, RowKeySnafu, SinkError, TableTemplateSnafu, WriteEntitySnafu,
};
use crate::event::{LogEvent, local_hostname};
use crate::keys::KeyFormatter;
use crate::metrics::events::{DropStage, EntityWritten, EventDropped, TableCreated};
use crate::store::StoreGateway;
use crate::template::Template;

/// A batching table sink over a [`StoreGateway`].
///
/// One sink instance assumes a single logical writer; callers with
/// concurrent producers must serialize access externally.
pub struct TableSink<G: StoreGateway> {
    store: G,
    table: String,
    ready: bool,
    keys: KeyFormatter,
    builder: EntityBuilder,
    accumulator: Option<BatchAccumulator>,
    rowno: u64,
}

impl<G: StoreGateway> TableSink<G> {
    /// Build a sink from configuration. All templates compile and
    /// validate here; nothing fails lazily at event time.
    ///
    /// Batching requires a configured batch size of at least 2 and a
    /// store that supports batch commits; otherwise every event becomes
    /// an immediate single-entity write.
    pub fn new(store: G, config: &Config) -> Result<Self, ConfigError> {
        let table = render_table_name(&config.table)?;
        let keys = KeyFormatter::new(&config.partition_key, &config.row_key)?;
        let builder = EntityBuilder::new(&config.extra_fields)?;

        let capacity = config.effective_batch_size();
        let accumulator = if capacity > 1 && store.supports_batching() {
            Some(BatchAccumulator::new(capacity))
        } else {
            None
        };

        debug!(
            table,
            batching = accumulator.is_some(),
            capacity,
            "Table sink configured"
        );

        Ok(Self {
            store,
            table,
            ready: false,
            keys,
            builder,
            accumulator,
            rowno: 0,
        })
    }

    /// Process one event, containing any non-fatal failure.
    ///
    /// An `Err` from this method means the process is shutting down;
    /// every other failure is logged through `tracing`, counted, and
    /// swallowed, with the event dropped.
    pub fn emit(&mut self, event: &LogEvent) -> Result<(), SinkError> {
        match self.handle(event) {
            Ok(()) => Ok(()),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                emit!(EventDropped {
                    stage: drop_stage(&err),
                });
                error!("Dropped log event: {}", snafu::Report::from_error(err));
                // A flush inside the failed path may have reset the
                // batch; keep the row sequence in step with it.
                if self.accumulator.as_ref().is_some_and(|acc| acc.is_empty()) {
                    self.rowno = 0;
                }
                Ok(())
            }
        }
    }

    /// Commit any buffered batch. No-op when nothing is buffered.
    ///
    /// Call on shutdown and on any host-driven timer. The row sequence
    /// restarts either way, matching the batch state reset.
    pub fn flush(&mut self) -> Result<(), SinkError> {
        let Some(acc) = &mut self.accumulator else {
            return Ok(());
        };
        let result = acc.flush(&mut self.store, &self.table);
        self.rowno = 0;
        result.context(CommitBatchSnafu)?;
        Ok(())
    }

    /// The rendered table name this sink writes to.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// True when events are buffered into batches.
    pub fn is_batching(&self) -> bool {
        self.accumulator.is_some()
    }

    /// Entities currently buffered.
    pub fn buffered(&self) -> usize {
        self.accumulator
            .as_ref()
            .map(BatchAccumulator::buffered)
            .unwrap_or(0)
    }

    /// Shared access to the underlying store.
    pub fn store(&self) -> &G {
        &self.store
    }

    /// Consume the sink, returning the store. Does not flush.
    pub fn into_store(self) -> G {
        self.store
    }

    /// The fallible per-event path.
    fn handle(&mut self, event: &LogEvent) -> Result<(), SinkError> {
        if !self.ready {
            self.store
                .ensure_table(&self.table)
                .context(EnsureTableSnafu)?;
            self.ready = true;
            emit!(TableCreated);
        }

        let partition_key = self.keys.partition_key(event).context(PartitionKeySnafu)?;

        // Rotate before deriving the row key so the sequence number
        // restarts with the new batch.
        if let Some(acc) = &mut self.accumulator
            && acc.needs_rotation(&partition_key)
        {
            acc.flush(&mut self.store, &self.table)
                .context(CommitBatchSnafu)?;
            self.rowno = 0;
        }

        let row_key = self
            .keys
            .row_key(event, self.rowno)
            .context(RowKeySnafu)?;
        let entity = self
            .builder
            .build(event, &partition_key, &row_key)
            .context(BuildEntitySnafu)?;

        match &mut self.accumulator {
            None => {
                self.store
                    .insert_entity(&self.table, entity)
                    .context(WriteEntitySnafu)?;
                emit!(EntityWritten);
            }
            Some(acc) => {
                let report = acc
                    .append(&mut self.store, &self.table, &partition_key, entity)
                    .context(AppendEntitySnafu)?;
                if report.flushed_after > 0 {
                    self.rowno = 0;
                } else {
                    self.rowno += 1;
                }
            }
        }

        Ok(())
    }
}

/// Render a table-name template against host metadata.
fn render_table_name(template: &str) -> Result<String, ConfigError> {
    let compiled = Template::parse(template).context(TableTemplateSnafu)?;
    compiled
        .render(|field| match field {
            "hostname" => Some(local_hostname()),
            "process" => Some(std::process::id().to_string()),
            _ => None,
        })
        .context(TableTemplateSnafu)
}

fn drop_stage(err: &SinkError) -> DropStage {
    match err {
        SinkError::EnsureTable { .. } => DropStage::Table,
        SinkError::PartitionKey { .. } | SinkError::RowKey { .. } => DropStage::Keys,
        SinkError::BuildEntity { .. } => DropStage::Entity,
        SinkError::WriteEntity { .. } => DropStage::Write,
        SinkError::AppendEntity { .. } | SinkError::CommitBatch { .. } => DropStage::Commit,
        SinkError::SinkShutdown => DropStage::Commit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Severity;
    use crate::store::MemoryTableStore;
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::HashMap;

    fn config(batch_size: usize) -> Config {
        Config {
            table: "logs".to_string(),
            batch_size,
            ..Config::default()
        }
    }

    fn event(minute: u32, n: usize) -> LogEvent {
        LogEvent {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 10, minute, 30).unwrap()
                + Duration::milliseconds(n as i64),
            level: Severity::Info,
            logger: "test".to_string(),
            message: format!("message #{n:02}"),
            hostname: "host1".to_string(),
            process: 4242,
            thread: "main".to_string(),
            backtrace: None,
            extra: HashMap::new(),
        }
    }

    #[test]
    fn test_table_created_lazily_once() {
        let store = MemoryTableStore::new();
        let mut sink = TableSink::new(store, &config(0)).unwrap();
        assert!(!sink.store().has_table("logs"));

        sink.emit(&event(15, 0)).unwrap();
        assert!(sink.store().has_table("logs"));
        sink.emit(&event(15, 1)).unwrap();
        assert_eq!(sink.store().table_names(), vec!["logs"]);
    }

    #[test]
    fn test_unbatched_mode_writes_immediately() {
        let store = MemoryTableStore::new();
        let mut sink = TableSink::new(store, &config(0)).unwrap();
        assert!(!sink.is_batching());

        for n in 0..3 {
            sink.emit(&event(15, n)).unwrap();
        }
        assert_eq!(sink.store().entities("logs").len(), 3);
        assert!(sink.store().commit_sizes().is_empty());
        assert_eq!(sink.store().batch_calls(), 0);
    }

    #[test]
    fn test_batch_size_one_disables_batching() {
        let store = MemoryTableStore::new();
        let sink = TableSink::new(store, &config(1)).unwrap();
        assert!(!sink.is_batching());
    }

    #[test]
    fn test_emulated_store_disables_batching() {
        let store = MemoryTableStore::emulated();
        let mut sink = TableSink::new(store, &config(10)).unwrap();
        assert!(!sink.is_batching());

        sink.emit(&event(15, 0)).unwrap();
        assert_eq!(sink.store().entities("logs").len(), 1);
        assert_eq!(sink.store().batch_calls(), 0);
    }

    #[test]
    fn test_batched_mode_buffers_until_capacity() {
        let store = MemoryTableStore::new();
        let mut sink = TableSink::new(store, &config(3)).unwrap();

        sink.emit(&event(15, 0)).unwrap();
        sink.emit(&event(15, 1)).unwrap();
        assert_eq!(sink.buffered(), 2);
        assert!(sink.store().entities("logs").is_empty());

        sink.emit(&event(15, 2)).unwrap();
        assert_eq!(sink.buffered(), 0);
        assert_eq!(sink.store().commit_sizes(), &[3]);
        assert_eq!(sink.store().entities("logs").len(), 3);
    }

    #[test]
    fn test_row_sequence_resets_after_flush() {
        let store = MemoryTableStore::new();
        let mut sink = TableSink::new(store, &config(2)).unwrap();

        for n in 0..4 {
            sink.emit(&event(15, n)).unwrap();
        }

        // Two cycles of sequence 00, 01.
        let suffixes: Vec<String> = sink
            .store()
            .entities("logs")
            .iter()
            .map(|e| e.row_key().rsplit('-').next().unwrap().to_string())
            .collect();
        assert_eq!(suffixes.iter().filter(|s| *s == "00").count(), 2);
        assert_eq!(suffixes.iter().filter(|s| *s == "01").count(), 2);
    }

    #[test]
    fn test_partition_change_rotates_batch() {
        let store = MemoryTableStore::new();
        let mut sink = TableSink::new(store, &config(10)).unwrap();

        sink.emit(&event(15, 0)).unwrap();
        sink.emit(&event(15, 1)).unwrap();
        // New minute, new partition key: previous two commit first.
        sink.emit(&event(16, 2)).unwrap();

        assert_eq!(sink.store().commit_sizes(), &[2]);
        assert_eq!(sink.buffered(), 1);
        // Sequence restarted with the new batch.
        let entities = sink.store().entities("logs");
        assert!(entities.iter().all(|e| e.partition_key() == "202403011015"));
    }

    #[test]
    fn test_store_failure_contained() {
        let mut store = MemoryTableStore::new();
        store.fail_next_commit("throttled");
        let mut sink = TableSink::new(store, &config(2)).unwrap();

        sink.emit(&event(15, 0)).unwrap();
        // This emit triggers the capacity flush, which fails. The error
        // must not reach the caller, and the batch is dropped.
        sink.emit(&event(15, 1)).unwrap();

        assert_eq!(sink.buffered(), 0);
        assert!(sink.store().entities("logs").is_empty());

        // The sink keeps working afterwards.
        sink.emit(&event(15, 2)).unwrap();
        sink.emit(&event(15, 3)).unwrap();
        assert_eq!(sink.store().entities("logs").len(), 2);
    }

    #[test]
    fn test_shutdown_propagates() {
        let mut store = MemoryTableStore::new();
        store.begin_shutdown();
        let mut sink = TableSink::new(store, &config(0)).unwrap();

        let err = sink.emit(&event(15, 0)).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_flush_resets_sequence() {
        let store = MemoryTableStore::new();
        let mut sink = TableSink::new(store, &config(10)).unwrap();

        sink.emit(&event(15, 0)).unwrap();
        sink.emit(&event(15, 1)).unwrap();
        sink.flush().unwrap();
        assert_eq!(sink.buffered(), 0);
        assert_eq!(sink.store().commit_sizes(), &[2]);

        sink.emit(&event(15, 2)).unwrap();
        assert_eq!(sink.buffered(), 1);
        sink.flush().unwrap();

        let entities = sink.store().entities("logs");
        // 3 distinct row keys total; the third restarted at sequence 00.
        assert_eq!(entities.len(), 3);
        assert_eq!(
            entities
                .iter()
                .filter(|e| e.row_key().ends_with("-00"))
                .count(),
            2
        );
    }

    #[test]
    fn test_flush_without_buffer_is_noop() {
        let store = MemoryTableStore::new();
        let mut sink = TableSink::new(store, &config(10)).unwrap();
        sink.flush().unwrap();
        assert_eq!(sink.store().batch_calls(), 0);
    }

    #[test]
    fn test_table_name_rendered_from_meta() {
        let store = MemoryTableStore::new();
        let config = Config {
            table: "logs_%(process)s".to_string(),
            ..Config::default()
        };
        let sink = TableSink::new(store, &config).unwrap();
        assert_eq!(sink.table(), &format!("logs_{}", std::process::id()));
    }
}
