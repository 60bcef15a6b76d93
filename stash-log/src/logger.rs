//! The injectable logger capability.

use crate::Level;
use parking_lot::Mutex;
use std::fmt::Display;
use std::sync::Arc;

/// A named, pre-rendered context value attached to a [`Record`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field name, e.g. `key` or `exception`
    pub name: &'static str,
    /// Rendered value
    pub value: String,
}

impl Field {
    /// Create a field from anything displayable.
    pub fn new(name: &'static str, value: impl Display) -> Self {
        Self {
            name,
            value: value.to_string(),
        }
    }
}

/// A single log event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Severity
    pub level: Level,
    /// Logical origin, e.g. `stash::pool`
    pub target: String,
    /// Human readable message
    pub message: String,
    /// Structured context, in insertion order
    pub fields: Vec<Field>,
}

impl Record {
    /// Create a record without fields.
    pub fn new(level: Level, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            target: target.into(),
            message: message.into(),
            fields: Vec::new(),
        }
    }

    /// Shorthand for a `Warn` record.
    pub fn warning(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Level::Warn, target, message)
    }

    /// Shorthand for a `Debug` record.
    pub fn debug(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Level::Debug, target, message)
    }

    /// Attach a field.
    pub fn with_field(mut self, name: &'static str, value: impl Display) -> Self {
        self.fields.push(Field::new(name, value));
        self
    }

    /// Look up the first field with the given name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}

/// Logging capability handed to components at construction.
pub trait Logger: Send + Sync {
    /// Handle one record.
    fn log(&self, record: &Record);

    /// Whether records at `level` would be kept. Callers may skip building
    /// expensive records when this is false.
    fn enabled(&self, level: Level) -> bool {
        level != Level::Off
    }
}

impl<L: Logger + ?Sized> Logger for Arc<L> {
    fn log(&self, record: &Record) {
        (**self).log(record)
    }

    fn enabled(&self, level: Level) -> bool {
        (**self).enabled(level)
    }
}

/// Writes to stderr through the global `STASH_LOG_*` configuration.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn log(&self, record: &Record) {
        crate::config().write(record);
    }

    fn enabled(&self, level: Level) -> bool {
        crate::is_level_enabled(level)
    }
}

/// Forwards records to the `log` facade, for applications that already
/// install a `log` backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct FacadeLogger;

impl Logger for FacadeLogger {
    fn log(&self, record: &Record) {
        let Some(level) = record.level.to_log_level() else {
            return;
        };

        if record.fields.is_empty() {
            log::log!(target: record.target.as_str(), level, "{}", record.message);
        } else {
            let context = record
                .fields
                .iter()
                .map(|f| format!("{}={:?}", f.name, f.value))
                .collect::<Vec<_>>()
                .join(" ");
            log::log!(target: record.target.as_str(), level, "{} {}", record.message, context);
        }
    }

    fn enabled(&self, level: Level) -> bool {
        level
            .to_log_level()
            .is_some_and(|l| l <= log::max_level())
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&self, _record: &Record) {}

    fn enabled(&self, _level: Level) -> bool {
        false
    }
}

/// Keeps records in memory so tests can inspect what was reported.
#[derive(Debug, Default, Clone)]
pub struct MemoryLogger {
    records: Arc<Mutex<Vec<Record>>>,
}

impl MemoryLogger {
    /// Create an empty logger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything logged so far.
    pub fn records(&self) -> Vec<Record> {
        self.records.lock().clone()
    }

    /// Records at exactly `level`.
    pub fn records_at(&self, level: Level) -> Vec<Record> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.level == level)
            .cloned()
            .collect()
    }

    /// Drop all stored records.
    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl Logger for MemoryLogger {
    fn log(&self, record: &Record) {
        self.records.lock().push(record.clone());
    }
}
