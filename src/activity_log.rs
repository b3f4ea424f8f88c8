//! Append-only activity log for review sessions.
//!
//! Entries are buffered in memory and persisted with read-merge-write against a
//! [`LogStore`]. Entries written by earlier sessions are carried over as raw
//! JSON values and written back unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The kind of action an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Load,
    Toggle,
    ApplySuccess,
    ApplyError,
    /// Summary of one apply batch.
    Apply,
    Error,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Load => "load",
            ActionKind::Toggle => "toggle",
            ActionKind::ApplySuccess => "apply_success",
            ActionKind::ApplyError => "apply_error",
            ActionKind::Apply => "apply",
            ActionKind::Error => "error",
        }
    }
}

/// A single timestamped log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: ActionKind,
    #[serde(default)]
    pub payload: Value,
}

impl LogEntry {
    pub fn new(kind: ActionKind, payload: Value) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            payload,
        }
    }
}

/// A persisted log value, interpreted for display.
///
/// Older log files hold plain `"[timestamp] message"` strings, and files may
/// have been edited by hand. Anything that is not a structured entry is shown
/// as-is.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredEntry {
    Entry(LogEntry),
    Legacy(String),
    Raw(Value),
}

impl From<Value> for StoredEntry {
    fn from(value: Value) -> Self {
        match value {
            Value::String(line) => StoredEntry::Legacy(line),
            value => match LogEntry::deserialize(&value) {
                Ok(entry) => StoredEntry::Entry(entry),
                Err(_) => StoredEntry::Raw(value),
            },
        }
    }
}

impl fmt::Display for StoredEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoredEntry::Entry(entry) => {
                write!(
                    f,
                    "[{}] {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.kind.as_str()
                )?;
                if !entry.payload.is_null() {
                    write!(f, " {}", entry.payload)?;
                }
                Ok(())
            }
            StoredEntry::Legacy(line) => f.write_str(line),
            StoredEntry::Raw(value) => write!(f, "{}", value),
        }
    }
}

/// Errors raised while reading or persisting the log.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Failed to read log {location}: {source}")]
    Read {
        location: String,
        source: std::io::Error,
    },
    /// The existing log cannot be parsed; it is left untouched.
    #[error("Existing log {location} is not a valid log file: {reason}")]
    Corrupt { location: String, reason: String },
    #[error("Failed to write log {location}: {source}")]
    Write {
        location: String,
        source: std::io::Error,
    },
}

/// Persistence backend for the activity log.
pub trait LogStore {
    /// Reads every previously persisted value, oldest first.
    fn read(&self) -> Result<Vec<Value>, LogError>;

    /// Replaces the persisted content with `entries`.
    fn write(&mut self, entries: &[Value]) -> Result<(), LogError>;

    /// Reads the persisted values and interprets them for display.
    fn entries(&self) -> Result<Vec<StoredEntry>, LogError> {
        Ok(self.read()?.into_iter().map(StoredEntry::from).collect())
    }
}

/// Log stored as a pretty-printed JSON array in a single file.
#[derive(Debug, Clone)]
pub struct JsonLogFile {
    path: PathBuf,
}

impl JsonLogFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl LogStore for JsonLogFile {
    fn read(&self) -> Result<Vec<Value>, LogError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| LogError::Read {
            location: self.location(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&content).map_err(|e| LogError::Corrupt {
            location: self.location(),
            reason: e.to_string(),
        })
    }

    /// Writes to a sibling temp file, syncs it, then renames it over the log so
    /// a failed write never truncates the existing file.
    fn write(&mut self, entries: &[Value]) -> Result<(), LogError> {
        let json = serde_json::to_string_pretty(entries).map_err(|e| LogError::Write {
            location: self.location(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("JSON serialization failed: {}", e),
            ),
        })?;

        let temp_path = self.temp_path();
        let write_err = |e| LogError::Write {
            location: self.location(),
            source: e,
        };

        let mut file = File::create(&temp_path).map_err(write_err)?;
        file.write_all(json.as_bytes()).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
        drop(file);

        fs::rename(&temp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            write_err(e)
        })
    }
}

/// In-memory log store for tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryLogStore {
    pub persisted: Vec<Value>,
    /// When set, every write fails with a permission error.
    pub fail_writes: bool,
}

impl LogStore for MemoryLogStore {
    fn read(&self) -> Result<Vec<Value>, LogError> {
        Ok(self.persisted.clone())
    }

    fn write(&mut self, entries: &[Value]) -> Result<(), LogError> {
        if self.fail_writes {
            return Err(LogError::Write {
                location: "<memory>".to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "writes disabled",
                ),
            });
        }
        self.persisted = entries.to_vec();
        Ok(())
    }
}

/// Buffer of entries not yet persisted.
#[derive(Debug, Default)]
pub struct ActivityLog {
    pending: Vec<LogEntry>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a new entry stamped with the current time.
    pub fn append(&mut self, kind: ActionKind, payload: Value) {
        self.pending.push(LogEntry::new(kind, payload));
    }

    /// Entries buffered since the last successful flush.
    pub fn pending(&self) -> &[LogEntry] {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Merges buffered entries into `store`.
    ///
    /// Existing values are read first and written back verbatim ahead of the
    /// buffered ones. The buffer is cleared only once the write succeeds, so a
    /// failed flush can be retried. Returns the number of entries flushed.
    pub fn flush(&mut self, store: &mut dyn LogStore) -> Result<usize, LogError> {
        if self.pending.is_empty() {
            return Ok(0);
        }

        let mut merged = store.read()?;
        for entry in &self.pending {
            let value = serde_json::to_value(entry).map_err(|e| LogError::Write {
                location: "<buffer>".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()),
            })?;
            merged.push(value);
        }
        store.write(&merged)?;

        let flushed = self.pending.len();
        self.pending.clear();
        Ok(flushed)
    }

    /// Flushes to the JSON log file at `log_path`.
    pub fn flush_to(&mut self, log_path: &Path) -> Result<usize, LogError> {
        self.flush(&mut JsonLogFile::new(log_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_flush_merges_with_existing_entries() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let log_path = temp_dir.path().join("log.json");

        let mut first = ActivityLog::new();
        first.append(ActionKind::Load, json!({"items": 2}));
        assert_eq!(first.flush_to(&log_path).expect("First flush failed"), 1);
        assert!(first.is_empty());

        let mut second = ActivityLog::new();
        second.append(ActionKind::Toggle, json!({"file": "a.jpg"}));
        second.append(ActionKind::Apply, json!({"moved": 1}));
        second.flush_to(&log_path).expect("Second flush failed");

        let entries = JsonLogFile::new(&log_path).entries().expect("Read failed");
        assert_eq!(entries.len(), 3);
        match &entries[0] {
            StoredEntry::Entry(entry) => assert_eq!(entry.kind, ActionKind::Load),
            other => panic!("unexpected entry {:?}", other),
        }
        match &entries[2] {
            StoredEntry::Entry(entry) => assert_eq!(entry.payload["moved"], 1),
            other => panic!("unexpected entry {:?}", other),
        }
        assert!(!log_path.with_file_name("log.json.tmp").exists());
    }

    #[test]
    fn test_flush_preserves_legacy_string_entries() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let log_path = temp_dir.path().join("log.json");
        fs::write(
            &log_path,
            r#"["[2024-05-01 10:00:00] Application started.", {"note": "hand edit"}]"#,
        )
        .expect("Failed to seed log");

        let mut log = ActivityLog::new();
        log.append(ActionKind::Load, json!({}));
        log.flush_to(&log_path).expect("Flush failed");

        let entries = JsonLogFile::new(&log_path).entries().expect("Read failed");
        assert_eq!(entries.len(), 3);
        assert_eq!(
            entries[0],
            StoredEntry::Legacy("[2024-05-01 10:00:00] Application started.".to_string())
        );
        assert_eq!(entries[1], StoredEntry::Raw(json!({"note": "hand edit"})));
        assert!(matches!(entries[2], StoredEntry::Entry(_)));
    }

    #[test]
    fn test_flush_keeps_existing_entries_verbatim() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let log_path = temp_dir.path().join("log.json");
        let existing = json!({
            "timestamp": "2024-05-01T10:00:00+02:00",
            "kind": "load",
            "payload": {},
            "user": "alice"
        });
        fs::write(&log_path, json!([existing.clone()]).to_string()).expect("Failed to seed log");

        let mut log = ActivityLog::new();
        log.append(ActionKind::Toggle, json!({"file": "a.jpg"}));
        log.flush_to(&log_path).expect("Flush failed");

        let values = JsonLogFile::new(&log_path).read().expect("Read failed");
        assert_eq!(values.len(), 2);
        assert_eq!(values[0], existing);
        assert_eq!(values[0]["timestamp"], "2024-05-01T10:00:00+02:00");
        assert_eq!(values[0]["user"], "alice");
    }

    #[test]
    fn test_corrupt_log_is_not_overwritten() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let log_path = temp_dir.path().join("log.json");
        fs::write(&log_path, "{not json").expect("Failed to seed log");

        let mut log = ActivityLog::new();
        log.append(ActionKind::Load, json!({}));
        let result = log.flush_to(&log_path);

        assert!(matches!(result, Err(LogError::Corrupt { .. })));
        assert_eq!(log.pending().len(), 1);
        assert_eq!(fs::read_to_string(&log_path).unwrap(), "{not json");
    }

    #[test]
    fn test_failed_write_keeps_buffer() {
        let mut store = MemoryLogStore {
            fail_writes: true,
            ..Default::default()
        };
        let mut log = ActivityLog::new();
        log.append(ActionKind::Error, json!({"message": "boom"}));

        assert!(matches!(
            log.flush(&mut store),
            Err(LogError::Write { .. })
        ));
        assert_eq!(log.pending().len(), 1);

        store.fail_writes = false;
        assert_eq!(log.flush(&mut store).unwrap(), 1);
        assert_eq!(store.persisted.len(), 1);
    }

    #[test]
    fn test_flush_with_empty_buffer_does_not_touch_store() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let log_path = temp_dir.path().join("log.json");

        let mut log = ActivityLog::new();
        assert_eq!(log.flush_to(&log_path).unwrap(), 0);
        assert!(!log_path.exists());
    }

    #[test]
    fn test_write_into_missing_directory_fails() {
        let mut log = ActivityLog::new();
        log.append(ActionKind::Load, json!({}));
        let result = log.flush_to(Path::new("/non/existent/dir/log.json"));
        assert!(matches!(result, Err(LogError::Write { .. })));
    }

    #[test]
    fn test_entry_serialization_shape() {
        let entry = LogEntry::new(ActionKind::ApplySuccess, json!({"file": "a.png"}));
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["kind"], "apply_success");
        assert_eq!(value["payload"]["file"], "a.png");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_display_formats_entries() {
        let entry = StoredEntry::Entry(LogEntry::new(ActionKind::Toggle, json!({"file": "x"})));
        let text = entry.to_string();
        assert!(text.contains("toggle"));
        assert!(text.contains("\"file\":\"x\""));

        let legacy = StoredEntry::Legacy("[t] hi".to_string());
        assert_eq!(legacy.to_string(), "[t] hi");
    }
}
