//! Stash Logging
//!
//! Structured logging for stash cache pools, controlled by the
//! `STASH_DEBUG` family of environment variables.
//!
//! Components never log to a global sink directly. They are handed a
//! [`Logger`] at construction and report [`Record`]s carrying structured
//! fields (`operation`, `key`, `keys`, `exception`). [`ConsoleLogger`]
//! renders those records to stderr according to [`LogConfig`].
//!
//! # Usage
//!
//! ```rust
//! use stash_log::{Logger, MemoryLogger, Record};
//!
//! let logger = MemoryLogger::new();
//! logger.log(&Record::warning("stash::pool", "Failed to fetch key").with_field("key", "user.1"));
//! assert_eq!(logger.records()[0].field("key"), Some("user.1"));
//! ```
//!
//! # Environment Variables
//!
//! - `STASH_DEBUG=1` - Enable debug logging
//! - `STASH_LOG_LEVEL=debug|info|warn|error` - Set log level
//! - `STASH_LOG_FORMAT=pretty|json|compact` - Set output format
//! - `STASH_LOG_COLOR=1|0` - Enable/disable colors
//! - `STASH_LOG_TIMESTAMPS=1|0` - Prefix lines with a timestamp
//! - `STASH_LOG_MODULE=1|0` - Include the record target

mod logger;

pub use logger::{ConsoleLogger, FacadeLogger, Field, Logger, MemoryLogger, NullLogger, Record};

use once_cell::sync::Lazy;
use std::env;
use std::fmt::Write as _;

// ============================================================================
// Log Levels
// ============================================================================

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Level {
    /// Trace level (most verbose)
    Trace = 0,
    /// Debug level
    Debug = 1,
    /// Info level
    Info = 2,
    /// Warning level
    Warn = 3,
    /// Error level (least verbose)
    Error = 4,
    /// Off (no logging)
    Off = 5,
}

impl Level {
    /// Parse a level name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "off" | "none" => Some(Level::Off),
            _ => None,
        }
    }

    /// Get level name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Off => "OFF",
        }
    }

    /// Map onto the `log` facade level. `Off` has no counterpart.
    pub fn to_log_level(self) -> Option<log::Level> {
        match self {
            Level::Trace => Some(log::Level::Trace),
            Level::Debug => Some(log::Level::Debug),
            Level::Info => Some(log::Level::Info),
            Level::Warn => Some(log::Level::Warn),
            Level::Error => Some(log::Level::Error),
            Level::Off => None,
        }
    }

    /// Get colored level name (if color feature enabled).
    #[cfg(feature = "color")]
    pub fn colored(&self) -> colored::ColoredString {
        use colored::Colorize;
        match self {
            Level::Trace => "TRACE".magenta(),
            Level::Debug => "DEBUG".blue(),
            Level::Info => "INFO".green(),
            Level::Warn => "WARN".yellow(),
            Level::Error => "ERROR".red().bold(),
            Level::Off => "OFF".white(),
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Log Format
// ============================================================================

/// Output format for log messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Human readable, optionally colored
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON format for structured logging
    Json,
}

impl Format {
    /// Parse a format name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pretty" => Some(Format::Pretty),
            "compact" => Some(Format::Compact),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

static CONFIG: Lazy<LogConfig> = Lazy::new(LogConfig::from_env);

/// Process-wide configuration, read from the environment on first use.
pub fn config() -> &'static LogConfig {
    &CONFIG
}

/// Whether the process-wide configuration keeps records at `level`.
pub fn is_level_enabled(level: Level) -> bool {
    config().enables(level)
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Minimum level kept
    pub level: Level,
    /// Output format
    pub format: Format,
    /// Colored level names (pretty format, `color` feature)
    pub color: bool,
    /// Prefix lines with a timestamp
    pub timestamps: bool,
    /// Include the record target
    pub show_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::Info,
            format: Format::Json,
            color: false,
            timestamps: true,
            show_target: true,
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

impl LogConfig {
    /// Read the `STASH_*` variables. `STASH_LOG_LEVEL` wins over
    /// `STASH_DEBUG`.
    pub fn from_env() -> Self {
        let debug = env_flag("STASH_DEBUG").unwrap_or(false);

        let level = env::var("STASH_LOG_LEVEL")
            .ok()
            .and_then(|s| Level::parse(&s))
            .unwrap_or(if debug { Level::Debug } else { Level::Info });

        let format = env::var("STASH_LOG_FORMAT")
            .ok()
            .and_then(|s| Format::parse(&s))
            .unwrap_or(Format::Json);

        let color = env_flag("STASH_LOG_COLOR")
            .unwrap_or_else(|| env::var("NO_COLOR").is_err() && env::var("TERM").is_ok());

        Self {
            level,
            format,
            color,
            timestamps: env_flag("STASH_LOG_TIMESTAMPS").unwrap_or(true),
            show_target: env_flag("STASH_LOG_MODULE").unwrap_or(true),
        }
    }

    /// Whether records at `level` are kept.
    pub fn enables(&self, level: Level) -> bool {
        level != Level::Off && level >= self.level
    }

    /// Write `record` to stderr if its level is enabled.
    pub fn write(&self, record: &Record) {
        if self.enables(record.level) {
            eprintln!("{}", self.render(record));
        }
    }

    /// Render `record` as a single line.
    pub fn render(&self, record: &Record) -> String {
        match self.format {
            Format::Pretty => self.render_text(record, false),
            Format::Compact => self.render_text(record, true),
            Format::Json => self.render_json(record),
        }
    }

    fn render_text(&self, record: &Record, compact: bool) -> String {
        let mut line = String::new();

        if self.timestamps {
            let pattern = if compact {
                "%H:%M:%S"
            } else {
                "%Y-%m-%d %H:%M:%S%.3f"
            };
            let _ = write!(line, "{} ", chrono::Local::now().format(pattern));
        }

        if compact {
            line.push(record.level.as_str().chars().next().unwrap_or('?'));
            line.push(' ');
        } else {
            let _ = write!(line, "{} ", self.level_label(record.level));
        }

        if self.show_target && !record.target.is_empty() {
            if compact {
                let _ = write!(line, "{}: ", record.target);
            } else {
                let _ = write!(line, "[{}] ", record.target);
            }
        }

        line.push_str(&record.message);
        for field in &record.fields {
            let _ = write!(line, " {}={:?}", field.name, field.value);
        }
        line
    }

    fn level_label(&self, level: Level) -> String {
        #[cfg(feature = "color")]
        if self.color {
            return format!("{:5}", level.colored());
        }
        format!("{:5}", level.as_str())
    }

    #[cfg(feature = "json")]
    fn render_json(&self, record: &Record) -> String {
        use serde::Serialize;
        use std::collections::BTreeMap;

        #[derive(Serialize)]
        struct Entry<'a> {
            #[serde(skip_serializing_if = "Option::is_none")]
            timestamp: Option<String>,
            level: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            target: Option<&'a str>,
            message: &'a str,
            #[serde(skip_serializing_if = "BTreeMap::is_empty")]
            fields: BTreeMap<&'a str, &'a str>,
        }

        let entry = Entry {
            timestamp: self.timestamps.then(|| chrono::Utc::now().to_rfc3339()),
            level: record.level.as_str(),
            target: self.show_target.then_some(record.target.as_str()),
            message: &record.message,
            fields: record
                .fields
                .iter()
                .map(|f| (f.name, f.value.as_str()))
                .collect(),
        };

        serde_json::to_string(&entry).unwrap_or_else(|_| record.message.clone())
    }

    #[cfg(not(feature = "json"))]
    fn render_json(&self, record: &Record) -> String {
        let mut line = String::from("{");
        if self.timestamps {
            let _ = write!(line, r#""timestamp":"{}","#, chrono::Utc::now().to_rfc3339());
        }
        let _ = write!(line, r#""level":"{}","#, record.level.as_str());
        if self.show_target {
            let _ = write!(line, r#""target":"{}","#, escape_json(&record.target));
        }
        let _ = write!(line, r#""message":"{}""#, escape_json(&record.message));
        if !record.fields.is_empty() {
            let fields = record
                .fields
                .iter()
                .map(|f| format!(r#""{}":"{}""#, escape_json(f.name), escape_json(&f.value)))
                .collect::<Vec<_>>()
                .join(",");
            let _ = write!(line, r#","fields":{{{}}}"#, fields);
        }
        line.push('}');
        line
    }
}

#[cfg(not(feature = "json"))]
fn escape_json(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(result, "\\u{:04x}", c as u32);
            }
            c => result.push(c),
        }
    }
    result
}

// ============================================================================
// Tests
// ============================================================================
