//! The entity-store boundary.
//!
//! The sink talks to the remote table store exclusively through the
//! [`StoreGateway`] trait. Real deployments implement it over their table
//! service client; the client owns transport concerns (retry, backoff,
//! timeouts). The [`memory`] backend stands in for the local storage
//! emulator and backs the test suite.

pub mod memory;

pub use memory::MemoryTableStore;

use crate::entity::Entity;
use crate::error::StoreError;

/// Operations the sink needs from an entity store.
///
/// All methods block until the store acknowledges or fails the request;
/// there is no cancellation primitive. One gateway instance serves one
/// sink's writer at a time.
pub trait StoreGateway {
    /// Create the table if it does not exist. Idempotent: an
    /// already-existing table is success.
    fn ensure_table(&mut self, table: &str) -> Result<(), StoreError>;

    /// Insert or replace a single entity, bypassing batching.
    fn insert_entity(&mut self, table: &str, entity: Entity) -> Result<(), StoreError>;

    /// Open a fresh client-side batch.
    fn begin_batch(&mut self) -> Result<(), StoreError>;

    /// Add an entity to the open batch (insert-or-replace semantics on
    /// commit).
    fn insert_into_batch(&mut self, entity: Entity) -> Result<(), StoreError>;

    /// Atomically commit the open batch to the table.
    fn commit_batch(&mut self, table: &str) -> Result<(), StoreError>;

    /// Whether this store supports batch commits. Emulator-class stores
    /// return false, which force-disables batching in the sink.
    fn supports_batching(&self) -> bool {
        true
    }
}
