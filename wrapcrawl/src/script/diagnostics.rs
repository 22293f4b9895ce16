//! Request ids and per-request diagnostic files.

use chrono::Utc;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use crate::net::FetchRequest;
use crate::rules::Value;

/// Generates unique request ids: a millisecond timestamp, a random salt and
/// a process-wide counter.
#[derive(Debug, Default)]
pub struct RequestIdGenerator {
    counter: AtomicU64,
}

impl RequestIdGenerator {
    /// Creates a generator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next id.
    pub fn next_id(&self) -> String {
        let count = self.counter.fetch_add(1, Ordering::Relaxed);
        let salt: u16 = rand::thread_rng().gen();
        format!(
            "{}-{salt:04x}-{count:06}",
            Utc::now().format("%Y%m%d%H%M%S%3f")
        )
    }
}

/// Writes `<id>.url`, `<id>.result`, `<id>.structured` and `<id>.save`
/// files under a log directory. A log without a directory writes nothing.
///
/// Write failures are logged and never fail the execution.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsLog {
    dir: Option<PathBuf>,
}

impl DiagnosticsLog {
    /// A log that writes under `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    /// A log that writes nothing.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { dir: None }
    }

    /// Whether files are written.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    /// The log directory.
    #[must_use]
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Records a fetch request.
    pub fn write_url(&self, id: &str, request: &FetchRequest) -> Option<PathBuf> {
        self.write(id, "url", &request.describe())
    }

    /// Records the final value of an execution as JSON.
    pub fn write_result(&self, id: &str, value: &Value) -> Option<PathBuf> {
        self.write_json(id, "result", value)
    }

    /// Records a tree dump.
    pub fn write_structured(&self, id: &str, markup: &str) -> Option<PathBuf> {
        self.write(id, "structured", markup)
    }

    /// Records a value persisted by a `save` command.
    pub fn write_save(&self, id: &str, value: &Value) -> Option<PathBuf> {
        self.write_json(id, "save", value)
    }

    fn write_json(&self, id: &str, extension: &str, value: &Value) -> Option<PathBuf> {
        if !self.is_enabled() {
            return None;
        }
        match serde_json::to_string_pretty(&value.to_json()) {
            Ok(json) => self.write(id, extension, &json),
            Err(err) => {
                warn!(request_id = id, error = %err, "Could not serialize diagnostics");
                None
            }
        }
    }

    fn write(&self, id: &str, extension: &str, contents: &str) -> Option<PathBuf> {
        let dir = self.dir.as_ref()?;
        let path = dir.join(format!("{id}.{extension}"));
        let written = std::fs::create_dir_all(dir).and_then(|()| std::fs::write(&path, contents));
        match written {
            Ok(()) => {
                debug!(path = %path.display(), "Wrote diagnostics");
                Some(path)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Could not write diagnostics");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    #[test]
    fn test_request_ids_are_unique() {
        let ids = RequestIdGenerator::new();
        let seen: HashSet<String> = (0..100).map(|_| ids.next_id()).collect();
        assert_eq!(seen.len(), 100);
    }

    #[test]
    fn test_request_id_shape() {
        let id = RequestIdGenerator::new().next_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 17);
        assert_eq!(parts[2], "000000");
    }

    #[test]
    fn test_disabled_log_writes_nothing() {
        let log = DiagnosticsLog::disabled();
        assert!(!log.is_enabled());
        assert!(log.write_result("id", &Value::from("x")).is_none());
    }

    #[test]
    fn test_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let log = DiagnosticsLog::new(dir.path().join("logs"));

        let request = FetchRequest::get("http://example.org/q").with_query("q", "x");
        let url_path = log.write_url("r1", &request).unwrap();
        assert_eq!(
            std::fs::read_to_string(url_path).unwrap(),
            "GET http://example.org/q\nparam q=x\n"
        );

        let value = Value::List(vec![Value::from("a"), Value::from("b")]);
        let result_path = log.write_result("r1", &value).unwrap();
        assert!(result_path.ends_with("r1.result"));
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(result_path).unwrap()).unwrap();
        assert_eq!(json, serde_json::json!(["a", "b"]));

        assert!(log.write_structured("r1", "<p/>").is_some());
        assert!(log.write_save("r1", &Value::Null).is_some());
    }
}
