//! In-memory entity store.
//!
//! Behaves like the table service the sink targets: insert-or-replace by
//! (partition key, row key), atomic batch commits with a per-batch entity
//! cap, and an emulated mode that reports no batch support. Used by the
//! test suite and wherever a process wants the sink's behavior without a
//! network dependency. Failure and shutdown injection make the sink's
//! error containment testable.

use std::collections::BTreeMap;

use tracing::trace;

use crate::batch::MAX_BATCH_SIZE;
use crate::entity::Entity;
use crate::error::StoreError;
use crate::store::StoreGateway;

type Table = BTreeMap<(String, String), Entity>;

/// In-memory [`StoreGateway`] implementation.
#[derive(Debug, Default)]
pub struct MemoryTableStore {
    tables: BTreeMap<String, Table>,
    open_batch: Option<Vec<Entity>>,
    commit_sizes: Vec<usize>,
    batch_calls: usize,
    emulated: bool,
    fail_next_commit: Option<String>,
    fail_next_batch_insert: Option<String>,
    shutting_down: bool,
}

impl MemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// An emulator-mode store: no batch support, everything else intact.
    pub fn emulated() -> Self {
        Self {
            emulated: true,
            ..Self::default()
        }
    }

    /// Make the next `commit_batch` fail with a service error.
    pub fn fail_next_commit(&mut self, message: impl Into<String>) {
        self.fail_next_commit = Some(message.into());
    }

    /// Make the next `insert_into_batch` fail with a service error.
    pub fn fail_next_batch_insert(&mut self, message: impl Into<String>) {
        self.fail_next_batch_insert = Some(message.into());
    }

    /// Make every subsequent call fail with [`StoreError::Shutdown`].
    pub fn begin_shutdown(&mut self) {
        self.shutting_down = true;
    }

    /// True if the table exists.
    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// Names of all tables, sorted.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    /// All entities in a table in (partition key, row key) order. Empty
    /// if the table does not exist.
    pub fn entities(&self, table: &str) -> Vec<&Entity> {
        self.tables
            .get(table)
            .map(|t| t.values().collect())
            .unwrap_or_default()
    }

    /// Sizes of the batch commits that succeeded, in order.
    pub fn commit_sizes(&self) -> &[usize] {
        &self.commit_sizes
    }

    /// Total batch operations issued (begin/insert/commit), for asserting
    /// that no-op flushes touch the store not at all.
    pub fn batch_calls(&self) -> usize {
        self.batch_calls
    }

    /// Entities buffered in the open batch, if one is open.
    pub fn open_batch_len(&self) -> usize {
        self.open_batch.as_ref().map(Vec::len).unwrap_or(0)
    }

    fn check_shutdown(&self) -> Result<(), StoreError> {
        if self.shutting_down {
            Err(StoreError::Shutdown)
        } else {
            Ok(())
        }
    }
}

impl StoreGateway for MemoryTableStore {
    fn ensure_table(&mut self, table: &str) -> Result<(), StoreError> {
        self.check_shutdown()?;
        self.tables.entry(table.to_string()).or_default();
        trace!(table, "Ensured table");
        Ok(())
    }

    fn insert_entity(&mut self, table: &str, entity: Entity) -> Result<(), StoreError> {
        self.check_shutdown()?;
        let table = self
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::Service {
                message: format!("table not found: {table}"),
            })?;
        let key = (
            entity.partition_key().to_string(),
            entity.row_key().to_string(),
        );
        table.insert(key, entity);
        Ok(())
    }

    fn begin_batch(&mut self) -> Result<(), StoreError> {
        self.check_shutdown()?;
        self.batch_calls += 1;
        self.open_batch = Some(Vec::new());
        Ok(())
    }

    fn insert_into_batch(&mut self, entity: Entity) -> Result<(), StoreError> {
        self.check_shutdown()?;
        self.batch_calls += 1;
        if let Some(message) = self.fail_next_batch_insert.take() {
            return Err(StoreError::Service { message });
        }
        match &mut self.open_batch {
            Some(batch) => {
                batch.push(entity);
                Ok(())
            }
            None => Err(StoreError::BatchNotOpen),
        }
    }

    fn commit_batch(&mut self, table: &str) -> Result<(), StoreError> {
        self.check_shutdown()?;
        self.batch_calls += 1;

        // The batch is consumed either way; a failed commit drops it.
        let batch = self.open_batch.take().ok_or(StoreError::BatchNotOpen)?;

        if let Some(message) = self.fail_next_commit.take() {
            return Err(StoreError::Service { message });
        }
        if batch.len() > MAX_BATCH_SIZE {
            return Err(StoreError::BatchTooLarge { count: batch.len() });
        }

        let count = batch.len();
        for entity in batch {
            self.insert_entity(table, entity)?;
        }
        self.commit_sizes.push(count);
        trace!(table, entities = count, "Committed batch");
        Ok(())
    }

    fn supports_batching(&self) -> bool {
        !self.emulated
    }
}
