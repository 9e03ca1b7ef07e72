use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// JSON Lines log shared by every session of one process.
///
/// Each record starts with `type`, `session_id`, `seq` and `ts`; the caller's
/// payload is merged after them and wins on key clashes. `seq` counts from 1
/// per session, so a session's events can be pulled back out of a shared file
/// in order.
#[derive(Debug, Clone)]
pub struct EventWriter {
    sink: Arc<EventSink>,
    session_id: String,
    seq: Arc<AtomicU64>,
}

/// The file is opened on the first write and kept open; the mutex keeps
/// lines from different sessions whole.
#[derive(Debug)]
struct EventSink {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl EventSink {
    fn append(&self, line: &str) -> anyhow::Result<()> {
        let mut slot = self
            .file
            .lock()
            .map_err(|_| anyhow::anyhow!("event log lock poisoned"))?;
        if slot.is_none() {
            *slot = Some(self.open()?);
        }
        if let Some(file) = slot.as_mut() {
            writeln!(file, "{line}")
                .with_context(|| format!("writing {}", self.path.display()))?;
            file.flush()?;
        }
        Ok(())
    }

    fn open(&self) -> anyhow::Result<File> {
        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening event log {}", self.path.display()))
    }
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        let sink = EventSink {
            path: path.into(),
            file: Mutex::new(None),
        };
        Self {
            sink: Arc::new(sink),
            session_id: session_id.into(),
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Same file, fresh session id and sequence.
    pub fn for_session(&self, session_id: impl Into<String>) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            session_id: session_id.into(),
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.sink.path
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let mut record = Map::new();
        record.insert("type".into(), event_type.into());
        record.insert("session_id".into(), self.session_id.as_str().into());
        record.insert("seq".into(), seq.into());
        record.insert("ts".into(), now_utc_iso().into());
        record.extend(payload);

        let record = Value::Object(record);
        self.sink.append(&serde_json::to_string(&record)?)?;
        Ok(record)
    }
}

pub fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
