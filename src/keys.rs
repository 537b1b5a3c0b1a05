//! Partition and row key derivation.
//!
//! Every entity needs a partition key (the grouping key all members of a
//! physical batch must share) and a row key (unique within the partition).
//! Both are rendered from templates compiled at configuration time, so key
//! derivation at event time is pure: the same event and sequence number
//! always produce the same keys, which the batch-grouping logic relies on.

use crate::config::KeyConfig;
use crate::error::{ConfigError, PartitionKeyTemplateSnafu, RowKeyTemplateSnafu, TemplateError};
use crate::event::{BUILTIN_FIELDS, FormatContext, LogEvent};
use crate::template::Template;
use snafu::prelude::*;

/// Default partition key: event time truncated to the minute.
pub const DEFAULT_PARTITION_TEMPLATE: &str = "%(asctime)s";
pub const DEFAULT_PARTITION_DATEFMT: &str = "%Y%m%d%H%M";

/// Default row key: millisecond timestamp, host, pid and a two-digit
/// sequence number joined by `-`.
pub const DEFAULT_ROW_TEMPLATE: &str = "%(asctime)s%(msecs)03d-%(hostname)s-%(process)d-%(rowno)02d";
pub const DEFAULT_ROW_DATEFMT: &str = "%Y%m%d%H%M%S";

/// Compiled partition/row key formatter.
#[derive(Debug, Clone)]
pub struct KeyFormatter {
    partition: Template,
    partition_datefmt: String,
    row: Template,
    row_datefmt: String,
}

impl KeyFormatter {
    /// Compile and validate the key templates. Malformed templates fail
    /// here, at configuration time, never per event.
    pub fn new(partition: &KeyConfig, row: &KeyConfig) -> Result<Self, ConfigError> {
        let partition_template = Template::parse(&partition.template)
            .and_then(|t| {
                t.validate(known_field)?;
                Ok(t)
            })
            .context(PartitionKeyTemplateSnafu)?;
        let row_template = Template::parse(&row.template)
            .and_then(|t| {
                t.validate(known_field)?;
                Ok(t)
            })
            .context(RowKeyTemplateSnafu)?;

        Ok(Self {
            partition: partition_template,
            partition_datefmt: partition.datefmt.clone(),
            row: row_template,
            row_datefmt: row.datefmt.clone(),
        })
    }

    /// Derive the partition key for an event.
    pub fn partition_key(&self, event: &LogEvent) -> Result<String, TemplateError> {
        let ctx = FormatContext::new(event, &self.partition_datefmt, 0);
        self.partition.render(|field| ctx.resolve(field))
    }

    /// Derive the row key for an event with the given sequence number.
    pub fn row_key(&self, event: &LogEvent, rowno: u64) -> Result<String, TemplateError> {
        let ctx = FormatContext::new(event, &self.row_datefmt, rowno);
        self.row.render(|field| ctx.resolve(field))
    }
}

fn known_field(field: &str) -> bool {
    BUILTIN_FIELDS.contains(&field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Severity;
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::HashMap;

    fn default_formatter() -> KeyFormatter {
        KeyFormatter::new(&KeyConfig::default_partition_key(), &KeyConfig::default_row_key())
            .unwrap()
    }

    fn event_at_fixed_instant() -> LogEvent {
        LogEvent {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 30).unwrap()
                + Duration::milliseconds(125),
            level: Severity::Info,
            logger: "test".to_string(),
            message: "msg".to_string(),
            hostname: "host1".to_string(),
            process: 4242,
            thread: "main".to_string(),
            backtrace: None,
            extra: HashMap::new(),
        }
    }

    #[test]
    fn test_default_partition_key_is_minute_resolution() {
        let formatter = default_formatter();
        let event = event_at_fixed_instant();
        assert_eq!(formatter.partition_key(&event).unwrap(), "202403011015");
    }

    #[test]
    fn test_default_row_key_layout() {
        let formatter = default_formatter();
        let event = event_at_fixed_instant();
        let key = formatter.row_key(&event, 3).unwrap();
        assert_eq!(key, "20240301101530125-host1-4242-03");
        assert!(key.starts_with("20240301101530125-"));
    }

    #[test]
    fn test_row_keys_distinct_within_cycle() {
        let formatter = default_formatter();
        let event = event_at_fixed_instant();
        let keys: Vec<String> = (0..10)
            .map(|rowno| formatter.row_key(&event, rowno).unwrap())
            .collect();
        let unique: std::collections::HashSet<&String> = keys.iter().collect();
        assert_eq!(unique.len(), keys.len());
    }

    #[test]
    fn test_key_derivation_is_deterministic() {
        let formatter = default_formatter();
        let event = event_at_fixed_instant();
        assert_eq!(
            formatter.partition_key(&event).unwrap(),
            formatter.partition_key(&event).unwrap()
        );
        assert_eq!(
            formatter.row_key(&event, 5).unwrap(),
            formatter.row_key(&event, 5).unwrap()
        );
    }

    #[test]
    fn test_custom_templates() {
        let partition = KeyConfig {
            template: "batch-%(hostname)s".to_string(),
            datefmt: DEFAULT_PARTITION_DATEFMT.to_string(),
        };
        let formatter = KeyFormatter::new(&partition, &KeyConfig::default_row_key()).unwrap();
        let event = event_at_fixed_instant();
        assert_eq!(formatter.partition_key(&event).unwrap(), "batch-host1");
    }

    #[test]
    fn test_malformed_template_fails_at_setup() {
        let partition = KeyConfig {
            template: "%(asctime".to_string(),
            datefmt: DEFAULT_PARTITION_DATEFMT.to_string(),
        };
        let result = KeyFormatter::new(&partition, &KeyConfig::default_row_key());
        assert!(matches!(
            result,
            Err(ConfigError::PartitionKeyTemplate { .. })
        ));
    }

    #[test]
    fn test_unknown_field_fails_at_setup() {
        let row = KeyConfig {
            template: "%(no_such_field)s".to_string(),
            datefmt: DEFAULT_ROW_DATEFMT.to_string(),
        };
        let result = KeyFormatter::new(&KeyConfig::default_partition_key(), &row);
        assert!(matches!(result, Err(ConfigError::RowKeyTemplate { .. })));
    }
}
