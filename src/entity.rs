//! Flat entity records and the builder that projects events into them.
//!
//! An `Entity` is one stored row: partition key, row key, the rendered
//! message and any configured extra fields, all as strings. Entities are
//! built once per event and never mutated afterwards. Exception payloads
//! are deliberately excluded to keep entities flat and storage-cheap.

use std::collections::BTreeMap;

use snafu::prelude::*;

use crate::error::{ConfigError, ExtraFieldSpecSnafu, TemplateError};
use crate::event::{BUILTIN_FIELDS, FormatContext, LogEvent};
use crate::template::Template;

/// Date format used when an extra-field spec references `asctime`.
const EXTRA_FIELD_DATEFMT: &str = "%Y-%m-%d %H:%M:%S";

/// One flat record as handed to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    partition_key: String,
    row_key: String,
    fields: BTreeMap<String, String>,
}

impl Entity {
    fn new(partition_key: String, row_key: String, fields: BTreeMap<String, String>) -> Self {
        Self {
            partition_key,
            row_key,
            fields,
        }
    }

    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    pub fn row_key(&self) -> &str {
        &self.row_key
    }

    /// The rendered message text.
    pub fn message(&self) -> &str {
        self.fields.get("message").map(String::as_str).unwrap_or("")
    }

    /// A named field, if present.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// All named fields (message plus projected extras), sorted by name.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

/// A compiled extra-field extraction spec: the template plus the entity
/// column name derived from its first field reference.
#[derive(Debug, Clone)]
struct FieldSpec {
    name: String,
    template: Template,
}

/// Builds entities from events.
#[derive(Debug, Clone)]
pub struct EntityBuilder {
    extra: Vec<FieldSpec>,
}

impl EntityBuilder {
    /// Compile the extra-field specs. A spec referencing a field the
    /// event model does not provide is a configuration error.
    pub fn new(specs: &[String]) -> Result<Self, ConfigError> {
        let mut extra = Vec::with_capacity(specs.len());
        for spec in specs {
            let compiled = Template::parse(spec)
                .and_then(|template| {
                    template.validate(|field| BUILTIN_FIELDS.contains(&field))?;
                    Ok(template)
                })
                .context(ExtraFieldSpecSnafu { spec })?;
            let name = compiled
                .first_field()
                .context(ExtraFieldSpecSnafu { spec })?
                .to_string();
            extra.push(FieldSpec {
                name,
                template: compiled,
            });
        }
        Ok(Self { extra })
    }

    /// Build the entity for one event. The event is only read; extraction
    /// goes through an immutable formatting context.
    pub fn build(
        &self,
        event: &LogEvent,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Entity, TemplateError> {
        let ctx = FormatContext::new(event, EXTRA_FIELD_DATEFMT, 0);
        let mut fields = BTreeMap::new();
        for spec in &self.extra {
            let value = spec.template.render(|field| ctx.resolve(field))?;
            fields.insert(spec.name.clone(), value);
        }
        fields.insert("message".to_string(), event.message.clone());
        Ok(Entity::new(
            partition_key.to_string(),
            row_key.to_string(),
            fields,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Severity;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;

    fn event() -> LogEvent {
        LogEvent {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 30).unwrap(),
            level: Severity::Warning,
            logger: "app.db".to_string(),
            message: "WARNING connection slow".to_string(),
            hostname: "host1".to_string(),
            process: 4242,
            thread: "worker-1".to_string(),
            backtrace: Some("trace".to_string()),
            extra: HashMap::new(),
        }
    }

    #[test]
    fn test_build_minimal_entity() {
        let builder = EntityBuilder::new(&[]).unwrap();
        let entity = builder.build(&event(), "202403011015", "row-00").unwrap();

        assert_eq!(entity.partition_key(), "202403011015");
        assert_eq!(entity.row_key(), "row-00");
        assert_eq!(entity.message(), "WARNING connection slow");
        assert_eq!(entity.fields().count(), 1);
    }

    #[test]
    fn test_extra_fields_projected() {
        let specs = vec![
            "%(levelname)s".to_string(),
            "%(levelno)d".to_string(),
            "%(name)s".to_string(),
            "%(process)d".to_string(),
            "%(thread)s".to_string(),
        ];
        let builder = EntityBuilder::new(&specs).unwrap();
        let entity = builder.build(&event(), "pk", "rk").unwrap();

        assert_eq!(entity.field("levelname").unwrap(), "WARNING");
        assert_eq!(entity.field("levelno").unwrap(), "30");
        assert_eq!(entity.field("name").unwrap(), "app.db");
        assert_eq!(entity.field("process").unwrap(), "4242");
        assert_eq!(entity.field("thread").unwrap(), "worker-1");
    }

    #[test]
    fn test_mixed_spec_styles() {
        let specs = vec!["{levelname}".to_string(), "$name".to_string()];
        let builder = EntityBuilder::new(&specs).unwrap();
        let entity = builder.build(&event(), "pk", "rk").unwrap();
        assert_eq!(entity.field("levelname").unwrap(), "WARNING");
        assert_eq!(entity.field("name").unwrap(), "app.db");
    }

    #[test]
    fn test_backtrace_excluded() {
        let builder = EntityBuilder::new(&[]).unwrap();
        let entity = builder.build(&event(), "pk", "rk").unwrap();
        assert!(entity.field("backtrace").is_none());
        for (_, value) in entity.fields() {
            assert!(!value.contains("trace"));
        }
    }

    #[test]
    fn test_unknown_extraction_field_is_config_error() {
        let specs = vec!["%(no_such_attr)s".to_string()];
        assert!(matches!(
            EntityBuilder::new(&specs),
            Err(ConfigError::ExtraFieldSpec { .. })
        ));
    }

    #[test]
    fn test_spec_without_field_reference_is_config_error() {
        let specs = vec!["plain".to_string()];
        assert!(matches!(
            EntityBuilder::new(&specs),
            Err(ConfigError::ExtraFieldSpec { .. })
        ));
    }

    #[test]
    fn test_build_does_not_mutate_event() {
        let original = event();
        let builder = EntityBuilder::new(&["%(levelname)s".to_string()]).unwrap();
        let _ = builder.build(&original, "pk", "rk").unwrap();
        assert_eq!(original.message, "WARNING connection slow");
        assert!(original.extra.is_empty());
    }
}
