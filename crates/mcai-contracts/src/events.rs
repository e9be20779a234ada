use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Append-only JSONL log of generation activity.
///
/// - default fields are `type`, `request_id`, `ts`
/// - caller payload is merged last and can override defaults
/// - one compact JSON object per line
/// - a writer without a path accepts and drops every event
#[derive(Debug, Clone)]
pub struct EventWriter {
    sink: Arc<EventSink>,
    request_id: String,
}

#[derive(Debug)]
struct EventSink {
    path: Option<PathBuf>,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_sink(Some(path.into()))
    }

    pub fn disabled() -> Self {
        Self::with_sink(None)
    }

    fn with_sink(path: Option<PathBuf>) -> Self {
        Self {
            sink: Arc::new(EventSink {
                path,
                lock: Mutex::new(()),
            }),
            request_id: String::new(),
        }
    }

    /// Same file, stamped with `request_id`.
    pub fn for_request(&self, request_id: impl Into<String>) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            request_id: request_id.into(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.sink.path.as_deref()
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert(
            "request_id".to_string(),
            Value::String(self.request_id.clone()),
        );
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in payload {
            event.insert(key, value);
        }

        let Some(path) = self.sink.path.as_ref() else {
            return Ok(Value::Object(event));
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(&event)?;
        let _guard = self
            .sink
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(event))
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;

    use super::*;

    #[test]
    fn emit_writes_compact_jsonl_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path).for_request("req-123");

        let mut payload = EventPayload::new();
        payload.insert("target".to_string(), Value::String("arcade".to_string()));
        let emitted = writer.emit("generation_started", payload)?;

        let content = fs::read_to_string(&path)?;
        let line = content.lines().next().unwrap_or("");
        let parsed: Value = serde_json::from_str(line)?;

        assert_eq!(parsed, emitted);
        assert_eq!(parsed["type"], Value::String("generation_started".to_string()));
        assert_eq!(parsed["request_id"], Value::String("req-123".to_string()));
        assert_eq!(parsed["target"], Value::String("arcade".to_string()));

        let ts = parsed["ts"].as_str().unwrap_or("");
        DateTime::parse_from_rfc3339(ts)?;
        Ok(())
    }

    #[test]
    fn payload_can_override_default_keys() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = EventWriter::new(temp.path().join("events.jsonl")).for_request("req-1");

        let mut payload = EventPayload::new();
        payload.insert("type".to_string(), Value::String("override".to_string()));
        let emitted = writer.emit("attempt_finished", payload)?;

        assert_eq!(emitted["type"], Value::String("override".to_string()));
        assert_eq!(emitted["request_id"], Value::String("req-1".to_string()));
        Ok(())
    }

    #[test]
    fn request_scoped_writers_share_one_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("logs").join("events.jsonl");
        let base = EventWriter::new(&path);

        base.for_request("a").emit("one", EventPayload::new())?;
        base.for_request("b").emit("two", EventPayload::new())?;

        let content = fs::read_to_string(&path)?;
        let rows: Vec<Value> = content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["request_id"], Value::String("a".to_string()));
        assert_eq!(rows[1]["type"], Value::String("two".to_string()));
        Ok(())
    }

    #[test]
    fn disabled_writer_still_returns_the_event() -> anyhow::Result<()> {
        let writer = EventWriter::disabled().for_request("quiet");
        let emitted = writer.emit("generation_finished", EventPayload::new())?;
        assert!(writer.path().is_none());
        assert_eq!(emitted["request_id"], Value::String("quiet".to_string()));
        Ok(())
    }
}
