use crate::errors::HarnessError;
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4096;

/// Append-only run log, one JSON object per line.
#[derive(Debug, Clone)]
pub struct JsonlLogger {
    pub path: PathBuf,
    pub max_payload_bytes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent<'a> {
    pub level: &'a str,
    pub event_type: &'a str,
    pub payload: Value,
}

impl JsonlLogger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }

    pub fn append(&self, event: &LogEvent<'_>) -> Result<(), HarnessError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| HarnessError::Io(e.to_string()))?;
            }
        }
        let truncated = truncate_json(event.payload.clone(), self.max_payload_bytes);
        let line = serde_json::to_string(&LogEvent {
            level: event.level,
            event_type: event.event_type,
            payload: truncated,
        })
        .map_err(|e| HarnessError::Io(e.to_string()))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| HarnessError::Io(e.to_string()))?;
        file.write_all(line.as_bytes())
            .map_err(|e| HarnessError::Io(e.to_string()))?;
        file.write_all(b"\n")
            .map_err(|e| HarnessError::Io(e.to_string()))
    }
}

/// Where the replay loop sends its structured events.
pub trait RunLog {
    fn event(&self, level: &str, event_type: &str, payload: Value) -> Result<(), HarnessError>;
}

impl RunLog for JsonlLogger {
    fn event(&self, level: &str, event_type: &str, payload: Value) -> Result<(), HarnessError> {
        self.append(&LogEvent {
            level,
            event_type,
            payload,
        })
    }
}

/// Drops every event; used when no `--run-log` is configured.
pub struct NullRunLog;

impl RunLog for NullRunLog {
    fn event(&self, _level: &str, _event_type: &str, _payload: Value) -> Result<(), HarnessError> {
        Ok(())
    }
}

/// Keeps events in memory for assertions.
#[derive(Default)]
pub struct MemoryRunLog {
    events: std::sync::Mutex<Vec<(String, String, Value)>>,
}

impl MemoryRunLog {
    pub fn events(&self) -> Vec<(String, String, Value)> {
        self.events.lock().expect("events lock").clone()
    }

    pub fn of_type(&self, event_type: &str) -> Vec<Value> {
        self.events()
            .into_iter()
            .filter(|(_, kind, _)| kind == event_type)
            .map(|(_, _, payload)| payload)
            .collect()
    }
}

impl RunLog for MemoryRunLog {
    fn event(&self, level: &str, event_type: &str, payload: Value) -> Result<(), HarnessError> {
        self.events
            .lock()
            .map_err(|_| HarnessError::Io("run log lock poisoned".to_string()))?
            .push((level.to_string(), event_type.to_string(), payload));
        Ok(())
    }
}

fn truncate_json(value: Value, max_bytes: usize) -> Value {
    let rendered = serde_json::to_string(&value).unwrap_or_default();
    if rendered.len() <= max_bytes {
        return value;
    }
    let mut cut = max_bytes.saturating_sub(3);
    while cut > 0 && !rendered.is_char_boundary(cut) {
        cut -= 1;
    }
    Value::String(format!("{}...", &rendered[..cut]))
}
