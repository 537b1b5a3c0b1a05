//! Batch accumulation state machine.
//!
//! The accumulator tracks one in-flight batch: its partition key and how
//! many entities have been appended to the store-side batch since the
//! last commit. It moves between two states:
//!
//! ```text
//! EMPTY (buffered = 0, no partition key)
//!   --append-->
//! ACCUMULATING (1 <= buffered < capacity, partition key fixed)
//!   --flush--> EMPTY
//! ```
//!
//! A flush fires on a partition-key change (all members of a physical
//! batch must share one key, so the old batch commits before the new one
//! opens), on reaching capacity, or on an explicit request. After a commit
//! attempt the state always resets to `EMPTY`, success or failure: a batch
//! that failed to commit is dropped rather than resubmitted indefinitely.
//! The loss is counted and logged, never silent.

use std::time::Instant;

use tracing::debug;

use crate::emit;
use crate::entity::Entity;
use crate::error::StoreError;
use crate::metrics::events::{BatchCommitFailed, BatchCommitted, EntityBuffered};
use crate::store::StoreGateway;

/// Entity stores cap physical batches; capacities above this are clamped.
pub const MAX_BATCH_SIZE: usize = 100;

/// What an `append` call did besides buffering the entity.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppendReport {
    /// Entities committed before the append because the partition key
    /// changed.
    pub flushed_before: usize,
    /// Entities committed after the append because the batch reached
    /// capacity.
    pub flushed_after: usize,
}

/// The core batching state machine. One instance per sink; not
/// internally synchronized.
#[derive(Debug)]
pub struct BatchAccumulator {
    capacity: usize,
    current_partition_key: Option<String>,
    buffered: usize,
}

impl BatchAccumulator {
    /// Create an accumulator. Callers only construct one when batching is
    /// enabled, so `capacity` is expected to be at least 2 and is clamped
    /// to [`MAX_BATCH_SIZE`].
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.min(MAX_BATCH_SIZE),
            current_partition_key: None,
            buffered: 0,
        }
    }

    /// Partition key of the in-flight batch, if any.
    pub fn partition_key(&self) -> Option<&str> {
        self.current_partition_key.as_deref()
    }

    /// Number of entities buffered since the last commit.
    pub fn buffered(&self) -> usize {
        self.buffered
    }

    pub fn is_empty(&self) -> bool {
        self.buffered == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True if appending an entity with this partition key would commit
    /// the in-flight batch first.
    pub fn needs_rotation(&self, partition_key: &str) -> bool {
        self.buffered > 0
            && self
                .current_partition_key
                .as_deref()
                .is_some_and(|current| current != partition_key)
    }

    /// Append one entity, flushing around it as the state machine
    /// requires.
    ///
    /// On error the buffered count only reflects entities the store
    /// acknowledged; a failed insert is not counted.
    pub fn append(
        &mut self,
        store: &mut dyn StoreGateway,
        table: &str,
        partition_key: &str,
        entity: Entity,
    ) -> Result<AppendReport, StoreError> {
        let mut report = AppendReport::default();

        if self.needs_rotation(partition_key) {
            debug!(
                from = self.current_partition_key.as_deref().unwrap_or_default(),
                to = partition_key,
                "Partition key changed, flushing batch"
            );
            report.flushed_before = self.flush(store, table)?;
        }

        // The key is recorded only once the store accepts the first
        // entity, keeping it None exactly while the batch is empty.
        let opening = self.buffered == 0;
        if opening {
            store.begin_batch()?;
        }
        store.insert_into_batch(entity)?;
        if opening {
            self.current_partition_key = Some(partition_key.to_string());
        }
        self.buffered += 1;
        emit!(EntityBuffered);

        if self.buffered >= self.capacity {
            report.flushed_after = self.flush(store, table)?;
        }

        Ok(report)
    }

    /// Commit the buffered batch and reset to `EMPTY`.
    ///
    /// A no-op when nothing is buffered: no store calls are issued.
    /// Returns the number of entities committed. The reset happens even
    /// when the commit fails; the error still propagates so the caller
    /// can report it.
    pub fn flush(
        &mut self,
        store: &mut dyn StoreGateway,
        table: &str,
    ) -> Result<usize, StoreError> {
        if self.buffered == 0 {
            return Ok(0);
        }

        let count = self.buffered;
        let start = Instant::now();
        let result = store.commit_batch(table);

        self.buffered = 0;
        self.current_partition_key = None;

        match result {
            Ok(()) => {
                emit!(BatchCommitted {
                    entities: count as u64,
                    duration: start.elapsed(),
                });
                debug!(entities = count, "Committed batch");
                Ok(count)
            }
            Err(error) => {
                emit!(BatchCommitFailed {
                    entities_lost: count as u64,
                });
                Err(error)
            }
        }
    }
}
