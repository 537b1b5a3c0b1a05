//! Error types for snowdrift using snafu.
//!
//! This module defines structured error types with context selectors for
//! all error conditions in the codebase.

use snafu::prelude::*;

// ============ Template Errors ============

/// Errors that can occur while compiling or rendering a key/field template.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TemplateError {
    /// Template contains no text at all.
    #[snafu(display("Template cannot be empty"))]
    EmptyTemplate,

    /// A placeholder was opened but never closed.
    #[snafu(display("Unclosed placeholder in template: {template}"))]
    UnclosedPlaceholder { template: String },

    /// An extra-field spec must reference at least one field to derive
    /// its column name from.
    #[snafu(display("Template references no field: {template}"))]
    MissingFieldReference { template: String },

    /// The template references a field the event model does not provide.
    #[snafu(display("Unknown field in template: {field}"))]
    UnknownField { field: String },
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
///
/// All of these fire at setup time; a validated configuration never
/// fails template rendering at event time for built-in fields.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Table name template is empty.
    #[snafu(display("Table name cannot be empty"))]
    EmptyTableName,

    /// Table name template failed to compile.
    #[snafu(display("Invalid table name template"))]
    TableTemplate { source: TemplateError },

    /// Partition key template failed to compile.
    #[snafu(display("Invalid partition key template"))]
    PartitionKeyTemplate { source: TemplateError },

    /// Row key template failed to compile.
    #[snafu(display("Invalid row key template"))]
    RowKeyTemplate { source: TemplateError },

    /// An extra-field extraction spec failed to compile.
    #[snafu(display("Invalid extra field spec: {spec}"))]
    ExtraFieldSpec {
        spec: String,
        source: TemplateError,
    },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file"))]
    ReadFile { source: std::io::Error },
}

// ============ Store Errors ============

/// Errors surfaced by `StoreGateway` implementations.
///
/// The gateway owns transport concerns (retry, backoff, timeouts); by the
/// time an error reaches the sink it is either a terminal service failure
/// or a shutdown signal.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// The entity store rejected or failed the request.
    #[snafu(display("Store request failed: {message}"))]
    Service { message: String },

    /// A batch operation was issued without an open batch.
    #[snafu(display("No batch is open"))]
    BatchNotOpen,

    /// The batch exceeds the store's per-commit entity limit.
    #[snafu(display("Batch too large: {count} entities"))]
    BatchTooLarge { count: usize },

    /// The store client observed process termination. Never contained;
    /// always propagates so the host can shut down cleanly.
    #[snafu(display("Store client shutting down"))]
    Shutdown,
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },
}

// ============ Sink Error (top-level) ============

/// Per-event errors on the sink's handling path.
///
/// `TableSink::emit` contains every non-fatal variant internally so that
/// logging never raises into the host application's control flow.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SinkError {
    /// Lazy table creation failed.
    #[snafu(display("Failed to ensure table exists"))]
    EnsureTable { source: StoreError },

    /// Single-entity write failed (unbatched mode).
    #[snafu(display("Failed to write entity"))]
    WriteEntity { source: StoreError },

    /// Appending an entity to the open batch failed.
    #[snafu(display("Failed to append entity to batch"))]
    AppendEntity { source: StoreError },

    /// Committing the buffered batch failed. The batch state has been
    /// reset; the buffered entities are dropped.
    #[snafu(display("Failed to commit batch"))]
    CommitBatch { source: StoreError },

    /// Partition key derivation failed.
    #[snafu(display("Failed to derive partition key"))]
    PartitionKey { source: TemplateError },

    /// Row key derivation failed.
    #[snafu(display("Failed to derive row key"))]
    RowKey { source: TemplateError },

    /// Entity construction failed.
    #[snafu(display("Failed to build entity"))]
    BuildEntity { source: TemplateError },

    /// Process termination observed. Always propagates.
    #[snafu(display("Sink shutting down"))]
    SinkShutdown,
}

impl SinkError {
    /// True if this error must propagate to the caller instead of being
    /// contained by `emit`.
    pub fn is_fatal(&self) -> bool {
        match self {
            SinkError::SinkShutdown => true,
            SinkError::EnsureTable { source }
            | SinkError::WriteEntity { source }
            | SinkError::AppendEntity { source }
            | SinkError::CommitBatch { source } => matches!(source, StoreError::Shutdown),
            _ => false,
        }
    }
}
