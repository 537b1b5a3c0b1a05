//! snowdrift: a batching table-storage sink for structured log records.
//!
//! This library groups log entries into partition-keyed batches and ships
//! them to a remote append-only entity store, trading latency for write
//! efficiency. The store itself stays behind the [`StoreGateway`] trait;
//! an in-memory backend is included for tests and emulator-style use.
//!
//! # Example
//!
//! ```ignore
//! use snowdrift::{Config, LogEvent, MemoryTableStore, Severity, TableSink};
//!
//! let config = Config::from_file("sink.yaml")?;
//! let mut sink = TableSink::new(MemoryTableStore::new(), &config)?;
//!
//! sink.emit(&LogEvent::new(Severity::Info, "app", "started"))?;
//! sink.flush()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod batch;
pub mod config;
pub mod entity;
pub mod error;
pub mod event;
pub mod keys;
pub mod metrics;
pub mod sink;
pub mod store;
pub mod template;

// Re-export main types
pub use batch::{BatchAccumulator, MAX_BATCH_SIZE};
pub use config::{Config, KeyConfig};
pub use entity::{Entity, EntityBuilder};
pub use error::{ConfigError, SinkError, StoreError};
pub use event::{LogEvent, Severity};
pub use keys::KeyFormatter;
pub use sink::TableSink;
pub use store::{MemoryTableStore, StoreGateway};
