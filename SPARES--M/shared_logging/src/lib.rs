#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Structured JSON-lines logging shared by the simulator, optimizer and CLI.
//!
//! Every record goes to an append-only file when its level reaches the file
//! threshold. Records at or above the console threshold are also echoed to
//! stderr as a single human-readable line.

use std::{
    fmt,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Log severity level, ordered from least to most severe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Per-part lifecycle detail.
    Debug,
    /// Informational events.
    Info,
    /// Warning indicator, also used for run headlines.
    Warn,
    /// Error indicator.
    Error,
}

impl LogLevel {
    /// Upper-case label used on the console.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One JSON line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Timestamp in ISO8601.
    pub timestamp: DateTime<Utc>,
    /// Component label, e.g. `spares/optimizer`.
    pub module: String,
    /// Severity.
    pub level: LogLevel,
    /// Dotted event name or short message.
    pub message: String,
    /// Arbitrary JSON payload (counts, part names, budgets).
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl LogRecord {
    /// Record stamped with the current UTC time.
    #[must_use]
    pub fn new(module: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            module: module.into(),
            level,
            message: message.into(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    fn console_line(&self) -> String {
        let mut line = format!(
            "{} - {} - {} - {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.module,
            self.level,
            self.message
        );
        if !self.metadata.is_empty() {
            line.push(' ');
            line.push_str(&serde_json::Value::Object(self.metadata.clone()).to_string());
        }
        line
    }
}

/// Thresholds applied before a record is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelFilter {
    /// Minimum level persisted to the log file.
    pub file: LogLevel,
    /// Minimum level echoed to stderr. `None` disables the console.
    pub console: Option<LogLevel>,
}

impl Default for LevelFilter {
    fn default() -> Self {
        Self {
            file: LogLevel::Debug,
            console: Some(LogLevel::Warn),
        }
    }
}

/// Append-only JSON-lines sink shared by every component of a run.
#[derive(Debug)]
pub struct JsonLogger {
    path: PathBuf,
    filter: LevelFilter,
    writer: Mutex<File>,
}

impl JsonLogger {
    /// Creates or opens a logger at the desired path with default thresholds.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_filter(path, LevelFilter::default())
    }

    /// Creates or opens a logger with explicit thresholds.
    pub fn with_filter(path: impl AsRef<Path>, filter: LevelFilter) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            path,
            filter,
            writer: Mutex::new(file),
        })
    }

    /// Returns true when a record at `level` would reach any sink.
    #[must_use]
    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.filter.file || self.filter.console.is_some_and(|min| level >= min)
    }

    /// Writes a log record as JSON line, echoing to stderr when above the console threshold.
    pub fn log(&self, record: &LogRecord) -> Result<()> {
        if self.filter.console.is_some_and(|min| record.level >= min) {
            eprintln!("{}", record.console_line());
        }
        if record.level < self.filter.file {
            return Ok(());
        }
        let mut writer = self.writer.lock();
        serde_json::to_writer(&mut *writer, record)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// Active thresholds.
    #[must_use]
    pub const fn filter(&self) -> LevelFilter {
        self.filter
    }

    /// Sink file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
