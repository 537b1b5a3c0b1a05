//! Configuration parsing and validation.
//!
//! Handles loading sink configuration from YAML with environment variable
//! interpolation, and validates the whole surface up front: key and field
//! templates compile (or fail) here, never per event.

mod vars;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::path::Path;

use crate::batch::MAX_BATCH_SIZE;
use crate::entity::EntityBuilder;
use crate::error::{
    ConfigError, EmptyTableNameSnafu, EnvInterpolationSnafu, ReadFileSnafu, TableTemplateSnafu,
    YamlParseSnafu,
};
use crate::keys::{
    DEFAULT_PARTITION_DATEFMT, DEFAULT_PARTITION_TEMPLATE, DEFAULT_ROW_DATEFMT,
    DEFAULT_ROW_TEMPLATE, KeyFormatter,
};
use crate::template::Template;

/// Main configuration for a table sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Table name template. May reference `hostname` and `process`,
    /// rendered once at sink construction.
    #[serde(default = "default_table")]
    pub table: String,

    /// Number of entities to buffer per batch commit. 0 or 1 disables
    /// batching; values above 100 are clamped to the store's per-batch
    /// limit.
    #[serde(default)]
    pub batch_size: usize,

    /// Partition key template and date format.
    #[serde(default = "KeyConfig::default_partition_key")]
    pub partition_key: KeyConfig,

    /// Row key template and date format.
    #[serde(default = "KeyConfig::default_row_key")]
    pub row_key: KeyConfig,

    /// Extra-field extraction specs, e.g. `"%(levelname)s"`. Each spec
    /// projects one event field into an entity column named after the
    /// spec's first field reference.
    #[serde(default)]
    pub extra_fields: Vec<String>,

    /// Metrics configuration (optional, enabled by default).
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            table: default_table(),
            batch_size: 0,
            partition_key: KeyConfig::default_partition_key(),
            row_key: KeyConfig::default_row_key(),
            extra_fields: Vec::new(),
            metrics: MetricsConfig::default(),
        }
    }
}

fn default_table() -> String {
    "logs".to_string()
}

/// A key template plus the date format its `asctime` field renders with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyConfig {
    pub template: String,
    #[serde(default = "default_datefmt")]
    pub datefmt: String,
}

fn default_datefmt() -> String {
    DEFAULT_PARTITION_DATEFMT.to_string()
}

impl KeyConfig {
    /// Default partition key: event time at minute resolution.
    pub fn default_partition_key() -> Self {
        Self {
            template: DEFAULT_PARTITION_TEMPLATE.to_string(),
            datefmt: DEFAULT_PARTITION_DATEFMT.to_string(),
        }
    }

    /// Default row key: millisecond timestamp, host, pid, sequence.
    pub fn default_row_key() -> Self {
        Self {
            template: DEFAULT_ROW_TEMPLATE.to_string(),
            datefmt: DEFAULT_ROW_DATEFMT.to_string(),
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

impl Config {
    /// Load configuration from a YAML file with env var interpolation.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).context(ReadFileSnafu)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let content = vars::interpolate(content).map_err(|errors| {
            EnvInterpolationSnafu {
                message: errors.join("\n"),
            }
            .build()
        })?;

        let config: Config = serde_yaml::from_str(&content).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration: non-empty table, and every template
    /// compiles against the event model. Fail-fast; a validated config
    /// cannot fail template compilation later.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.table.is_empty(), EmptyTableNameSnafu);
        Template::parse(&self.table)
            .and_then(|t| {
                t.validate(|field| field == "hostname" || field == "process")?;
                Ok(t)
            })
            .context(TableTemplateSnafu)?;
        KeyFormatter::new(&self.partition_key, &self.row_key)?;
        EntityBuilder::new(&self.extra_fields)?;
        Ok(())
    }

    /// Batch size clamped to the store's per-batch entity limit.
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.min(MAX_BATCH_SIZE)
    }
}
