//! Append-only CSV event log.
//!
//! One row per record: `timestamp,module,subcomponent,message`, timestamps in
//! local RFC 3339. The file is opened in append mode per record so an external
//! rotation or deletion never wedges the writer.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::alert::{Alert, AlertSink};

pub struct EventLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record.
    pub fn record(&self, module: &str, subcomponent: &str, message: &str) -> Result<()> {
        let timestamp = chrono::Local::now().to_rfc3339();
        let line = format!(
            "{},{},{},{}\n",
            csv_field(&timestamp),
            csv_field(module),
            csv_field(subcomponent),
            csv_field(message)
        );
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open event log {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("append to event log {}", self.path.display()))?;
        Ok(())
    }

    /// `record`, with failures logged and dropped.
    pub fn record_quietly(&self, module: &str, subcomponent: &str, message: &str) {
        if let Err(err) = self.record(module, subcomponent, message) {
            log::debug!("event log write skipped: {:#}", err);
        }
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Writes every forwarded alert to the event log as `ALERT,SYSTEM,<message>`.
pub struct EventLogSink {
    log: Arc<EventLog>,
}

impl EventLogSink {
    pub fn new(log: Arc<EventLog>) -> Self {
        Self { log }
    }
}

impl AlertSink for EventLogSink {
    fn name(&self) -> &str {
        "event_log"
    }

    fn deliver(&self, alert: &Alert) -> Result<()> {
        self.log.record("ALERT", "SYSTEM", &alert.message)
    }
}
