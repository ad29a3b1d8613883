//! Logging abstraction for testable output.
//!
//! Commands log through the [`Logger`] trait so tests can capture messages
//! with [`MockLogger`]. The binary uses [`StderrLogger`], optionally teeing
//! every shown message into a log file.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;

/// Verbosity level for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    /// Normal output (always shown)
    Normal,
    /// Verbose output (-v flag)
    Verbose,
    /// Debug output (-vv flag)
    Debug,
}

impl Verbosity {
    /// Create verbosity from CLI flag count.
    pub fn from_count(count: u8) -> Self {
        match count {
            0 => Verbosity::Normal,
            1 => Verbosity::Verbose,
            _ => Verbosity::Debug,
        }
    }

    fn tag(self) -> &'static str {
        match self {
            Verbosity::Normal => "INFO",
            Verbosity::Verbose => "VERBOSE",
            Verbosity::Debug => "DEBUG",
        }
    }
}

/// Trait for logging output.
pub trait Logger: Send + Sync {
    /// Log a message at the given verbosity level.
    fn log(&self, level: Verbosity, message: &str);

    /// Log at normal level (always visible).
    fn info(&self, message: &str) {
        self.log(Verbosity::Normal, message);
    }

    /// Log at verbose level (requires -v).
    fn verbose(&self, message: &str) {
        self.log(Verbosity::Verbose, message);
    }

    /// Log at debug level (requires -vv).
    fn debug(&self, message: &str) {
        self.log(Verbosity::Debug, message);
    }
}

/// Logger that writes to stderr and, optionally, appends to a file.
#[derive(Debug)]
pub struct StderrLogger {
    level: Verbosity,
    file: Option<Mutex<File>>,
}

impl StderrLogger {
    /// Create a new stderr logger with the given verbosity level.
    pub fn new(level: Verbosity) -> Self {
        Self { level, file: None }
    }

    /// Create a logger that only shows normal output.
    pub fn normal() -> Self {
        Self::new(Verbosity::Normal)
    }

    /// Also append shown messages to `path`, with a timestamp and level tag.
    pub fn with_log_file(mut self, path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        self.file = Some(Mutex::new(file));
        Ok(self)
    }

    pub fn level(&self) -> Verbosity {
        self.level
    }
}

impl Logger for StderrLogger {
    fn log(&self, level: Verbosity, message: &str) {
        if level > self.level {
            return;
        }
        let _ = writeln!(io::stderr(), "{}", message);
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = writeln!(
                    file,
                    "{} [{}] {}",
                    Utc::now().format("%Y-%m-%d %H:%M:%S"),
                    level.tag(),
                    message
                );
            }
        }
    }
}

/// Mock logger for testing that captures all messages.
#[derive(Debug, Clone)]
pub struct MockLogger {
    level: Verbosity,
    messages: Arc<RwLock<Vec<LogRecord>>>,
}

/// A captured log message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: Verbosity,
    pub message: String,
}

impl MockLogger {
    /// Create a new mock logger with the given verbosity level.
    pub fn new(level: Verbosity) -> Self {
        Self {
            level,
            messages: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Create a mock logger that captures all levels.
    pub fn capture_all() -> Self {
        Self::new(Verbosity::Debug)
    }

    /// Get all captured records.
    pub fn records(&self) -> Vec<LogRecord> {
        self.messages.read().unwrap().clone()
    }

    /// Get all captured messages (just the text).
    pub fn messages(&self) -> Vec<String> {
        self.records().iter().map(|e| e.message.clone()).collect()
    }

    /// Get messages at a specific level.
    pub fn messages_at_level(&self, level: Verbosity) -> Vec<String> {
        self.records()
            .iter()
            .filter(|e| e.level == level)
            .map(|e| e.message.clone())
            .collect()
    }

    /// Check if any message contains the given substring.
    pub fn contains(&self, substring: &str) -> bool {
        self.messages().iter().any(|m| m.contains(substring))
    }

    /// Get count of captured messages.
    pub fn count(&self) -> usize {
        self.messages.read().unwrap().len()
    }
}

impl Logger for MockLogger {
    fn log(&self, level: Verbosity, message: &str) {
        // Capture everything up to the configured level.
        if level > self.level {
            return;
        }
        self.messages.write().unwrap().push(LogRecord {
            level,
            message: message.to_string(),
        });
    }
}

/// A no-op logger that discards all messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&self, _level: Verbosity, _message: &str) {}
}
