//! Log event model and the formatting context used by templates.
//!
//! A `LogEvent` is produced by the logging front-end and is read-only to
//! the sink. Key and field templates never touch the event directly; they
//! resolve fields through a `FormatContext`, an immutable per-call overlay
//! that adds derived values (formatted timestamp, row sequence number)
//! without mutating the shared event.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Severity of a log event, with the classic numeric levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// Upper-case level name as stored in entities.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        }
    }

    /// Numeric level (10..=50).
    pub fn number(&self) -> u8 {
        match self {
            Severity::Debug => 10,
            Severity::Info => 20,
            Severity::Warning => 30,
            Severity::Error => 40,
            Severity::Critical => 50,
        }
    }
}

/// An immutable structured log record handed to the sink.
#[derive(Debug, Clone)]
pub struct LogEvent {
    /// Event timestamp (UTC).
    pub timestamp: DateTime<Utc>,
    /// Severity level.
    pub level: Severity,
    /// Name of the logger that produced the event.
    pub logger: String,
    /// Fully rendered message text.
    pub message: String,
    /// Host identifier. Hosts containing the `-` key separator make the
    /// default row key ambiguous on parse; callers own that tradeoff.
    pub hostname: String,
    /// Process id.
    pub process: u32,
    /// Thread identifier.
    pub thread: String,
    /// Exception/backtrace payload, if any. Stripped from all formatting
    /// output; entities stay flat.
    pub backtrace: Option<String>,
    /// Open-ended extra named fields.
    pub extra: HashMap<String, String>,
}

impl LogEvent {
    /// Create an event stamped with the current time and process metadata.
    pub fn new(level: Severity, logger: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            logger: logger.into(),
            message: message.into(),
            hostname: local_hostname(),
            process: std::process::id(),
            thread: current_thread_name(),
            backtrace: None,
            extra: HashMap::new(),
        }
    }

    /// Attach an extra named field.
    pub fn with_extra(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }
}

/// Best-effort local hostname, falling back to `localhost`.
pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

fn current_thread_name() -> String {
    let current = std::thread::current();
    match current.name() {
        Some(name) => name.to_string(),
        None => format!("{:?}", current.id()),
    }
}

/// Per-call field resolver overlaying derived values on a borrowed event.
///
/// `asctime` is rendered with the date format configured for the template
/// being evaluated, so partition and row keys can use different time
/// resolutions against the same event.
pub struct FormatContext<'a> {
    event: &'a LogEvent,
    datefmt: &'a str,
    rowno: u64,
}

impl<'a> FormatContext<'a> {
    pub fn new(event: &'a LogEvent, datefmt: &'a str, rowno: u64) -> Self {
        Self {
            event,
            datefmt,
            rowno,
        }
    }

    /// Resolve a field name to its unpadded string value.
    ///
    /// Returns `None` for unknown fields and for `backtrace`, which is
    /// excluded from formatting by design.
    pub fn resolve(&self, field: &str) -> Option<String> {
        match field {
            "asctime" => Some(self.event.timestamp.format(self.datefmt).to_string()),
            "msecs" => Some(self.event.timestamp.timestamp_subsec_millis().to_string()),
            "hostname" => Some(self.event.hostname.clone()),
            "process" => Some(self.event.process.to_string()),
            "thread" => Some(self.event.thread.clone()),
            "name" => Some(self.event.logger.clone()),
            "levelname" => Some(self.event.level.as_str().to_string()),
            "levelno" => Some(self.event.level.number().to_string()),
            "message" => Some(self.event.message.clone()),
            "rowno" => Some(self.rowno.to_string()),
            "backtrace" => None,
            other => self.event.extra.get(other).cloned(),
        }
    }
}

/// Built-in fields resolvable on every event, used for fail-fast template
/// validation at configuration time.
pub const BUILTIN_FIELDS: &[&str] = &[
    "asctime",
    "msecs",
    "hostname",
    "process",
    "thread",
    "name",
    "levelname",
    "levelno",
    "message",
    "rowno",
];
