//! Leveled, ring-buffered local log sink
//!
//! Every pipeline component logs through here. Entries land in a bounded
//! in-memory ring buffer and are mirrored to `tracing` plus a best-effort
//! local file sink. A logging failure must never crash the caller, so every
//! fallible step here is swallowed.

use std::collections::{BTreeMap, VecDeque};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

use crate::error::Result;
use crate::utils::data_dir;

/// Default ring buffer capacity
pub const DEFAULT_LOG_CAPACITY: usize = 300;

/// Log levels, ordered by severity (RFC-5424-style: `Fatal` is most severe)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Pipeline-internal invariant violations
    Fatal,
    /// Errors that affect functionality
    Error,
    /// Concerning but non-critical issues
    Warn,
    /// General operational information
    Info,
    /// Development information
    Debug,
    /// Very detailed debugging
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fatal => "fatal",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

/// One entry in the ring buffer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    /// Timestamp when the entry was recorded
    pub timestamp: DateTime<Utc>,
    /// Severity of the entry
    pub level: LogLevel,
    /// Log message
    pub message: String,
    /// Stringified error payload, if the caller passed one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Additional context as key-value pairs
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, serde_json::Value>,
}

/// Log line forwarded from a host/frontend layer into the same ring
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardedEntry {
    pub timestamp: String,
    pub level: String,
    pub source: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Ring-buffered local log sink
pub struct RingLogger {
    capacity: usize,
    entries: Mutex<VecDeque<LogRecord>>,
    sink_path: Option<PathBuf>,
}

impl RingLogger {
    /// Create a logger with the given ring capacity and optional file sink
    pub fn new(capacity: usize, sink_path: Option<PathBuf>) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            sink_path,
        }
    }

    /// Append an entry to the ring, mirror it to `tracing`, and append it
    /// best-effort to the file sink
    pub fn log(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        error_payload: Option<&str>,
        context: Option<BTreeMap<String, serde_json::Value>>,
    ) {
        let record = LogRecord {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            error: error_payload.map(|e| e.to_string()),
            context: context.unwrap_or_default(),
        };

        self.mirror_to_tracing(&record);
        self.append_to_sink(&record);

        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(record);
    }

    pub fn fatal(&self, message: impl Into<String>) {
        self.log(LogLevel::Fatal, message, None, None);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message, None, None);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message, None, None);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message, None, None);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message, None, None);
    }

    pub fn trace(&self, message: impl Into<String>) {
        self.log(LogLevel::Trace, message, None, None);
    }

    /// Forward a log line produced by a host/frontend layer
    pub fn forward(&self, entry: ForwardedEntry) {
        let level = match entry.level.to_ascii_uppercase().as_str() {
            "FATAL" => LogLevel::Fatal,
            "ERROR" => LogLevel::Error,
            "WARN" => LogLevel::Warn,
            "DEBUG" => LogLevel::Debug,
            "TRACE" => LogLevel::Trace,
            _ => LogLevel::Info,
        };
        let mut context = BTreeMap::new();
        context.insert("source".to_string(), serde_json::Value::String(entry.source));
        if let Some(metadata) = entry.metadata {
            context.insert("metadata".to_string(), metadata);
        }
        self.log(level, entry.message, None, Some(context));
    }

    /// Snapshot of the current ring contents, oldest first
    pub fn get_logs(&self) -> Vec<LogRecord> {
        let entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.iter().cloned().collect()
    }

    /// Export the ring contents as a JSON document
    pub fn export_logs(&self) -> String {
        serde_json::to_string_pretty(&self.get_logs()).unwrap_or_else(|_| "[]".to_string())
    }

    /// Write the JSON export to the given path
    pub fn download_logs(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.export_logs())?;
        Ok(())
    }

    fn mirror_to_tracing(&self, record: &LogRecord) {
        let err = record.error.as_deref().unwrap_or("");
        match record.level {
            LogLevel::Fatal | LogLevel::Error => {
                error!(level = record.level.as_str(), error = err, "{}", record.message)
            }
            LogLevel::Warn => warn!(error = err, "{}", record.message),
            LogLevel::Info => info!("{}", record.message),
            LogLevel::Debug => debug!("{}", record.message),
            LogLevel::Trace => trace!("{}", record.message),
        }
    }

    // One JSON line per entry. Opens in append mode on each write so a
    // deleted or rotated file never wedges the logger.
    fn append_to_sink(&self, record: &LogRecord) {
        let Some(path) = &self.sink_path else {
            return;
        };
        let Ok(line) = serde_json::to_string(record) else {
            return;
        };
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{line}");
        }
    }
}

/// Process-wide logger. Created lazily on first access; subsequent accesses
/// reuse the same instance.
static GLOBAL_LOGGER: Lazy<Arc<RingLogger>> = Lazy::new(|| {
    Arc::new(RingLogger::new(
        DEFAULT_LOG_CAPACITY,
        Some(data_dir().join("faultline.log")),
    ))
});

/// The process-wide logger instance
pub fn global() -> Arc<RingLogger> {
    Arc::clone(&GLOBAL_LOGGER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_evicts_oldest_once_full() {
        let logger = RingLogger::new(3, None);
        for i in 0..5 {
            logger.info(format!("entry {i}"));
        }
        let logs = logger.get_logs();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].message, "entry 2");
        assert_eq!(logs[2].message, "entry 4");
    }

    #[test]
    fn test_export_is_valid_json() {
        let logger = RingLogger::new(10, None);
        logger.warn("something odd");
        let parsed: Vec<LogRecord> = serde_json::from_str(&logger.export_logs()).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].level, LogLevel::Warn);
    }

    #[test]
    fn test_forwarded_entry_maps_level() {
        let logger = RingLogger::new(10, None);
        logger.forward(ForwardedEntry {
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            level: "ERROR".to_string(),
            source: "frontend".to_string(),
            message: "form submit failed".to_string(),
            metadata: None,
        });
        let logs = logger.get_logs();
        assert_eq!(logs[0].level, LogLevel::Error);
        assert_eq!(
            logs[0].context.get("source").unwrap(),
            &serde_json::Value::String("frontend".to_string())
        );
    }

    #[test]
    fn test_sink_failure_is_swallowed() {
        let logger = RingLogger::new(10, Some(PathBuf::from("/nonexistent-dir/faultline.log")));
        logger.info("still records in memory");
        assert_eq!(logger.get_logs().len(), 1);
    }

    #[test]
    fn test_download_logs_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let logger = RingLogger::new(10, None);
        logger.info("hello");
        let path = dir.path().join("export.json");
        logger.download_logs(&path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("hello"));
    }
}
