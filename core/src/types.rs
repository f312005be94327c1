//! Domain DTOs for the library service.
//!
//! # Design
//! Only the fields the client reasons about are typed. Everything else the
//! server sends on a task is kept in `Task::extra` so callers see the whole
//! body. Profiles and reference collections are passed through as JSON
//! values because the client never inspects them.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Login payload. Not retained after the login request is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// A file to import plus the text fields sent alongside it
/// (e.g. `libraryTitle`, `library`). Inserting an existing key overwrites it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadRequest {
    pub file_path: PathBuf,
    pub fields: BTreeMap<String, String>,
}

impl UploadRequest {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}

/// Task settings sent when enqueueing a task.
pub type Settings = Map<String, Value>;

/// Profile returned by a successful login.
pub type Profile = Value;

/// Reference collection returned by the references query.
pub type References = Value;

/// Body of `POST /api/tasks/library/{library}/{alias}`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct QueueTaskBody<'a> {
    pub settings: &'a Settings,
}

/// Progress counters reported while a task is processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub current: u64,
    pub max: u64,
}

impl Progress {
    /// `ceil(current / max * 100)`, computed without floating point.
    /// A zero `max` reports 0.
    pub fn percent(&self) -> u32 {
        if self.max == 0 {
            return 0;
        }
        let scaled = self.current.saturating_mul(100);
        let pct = scaled / self.max + u64::from(scaled % self.max != 0);
        u32::try_from(pct).unwrap_or(u32::MAX)
    }
}

/// Task statuses the client understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl TaskStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "processing" => Some(TaskStatus::Processing),
            "completed" => Some(TaskStatus::Completed),
            "error" => Some(TaskStatus::Error),
            _ => None,
        }
    }
}

/// A server-side task as observed by the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// `None` when absent or not a `{current, max}` pair of counters.
    #[serde(
        default,
        deserialize_with = "lenient_progress",
        skip_serializing_if = "Option::is_none"
    )]
    pub progress: Option<Progress>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Task {
    pub fn task_status(&self) -> Option<TaskStatus> {
        self.status.as_deref().and_then(TaskStatus::parse)
    }
}

fn lenient_progress<'de, D>(deserializer: D) -> std::result::Result<Option<Progress>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

/// A polled task plus the percentage derived from its progress counters.
/// Recomputed on every poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSnapshot {
    #[serde(flatten)]
    pub task: Task,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<u32>,
}

impl TaskSnapshot {
    pub fn new(task: Task) -> Self {
        let percent = task.progress.map(|p| p.percent());
        Self { task, percent }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds_up() {
        assert_eq!(Progress { current: 3, max: 4 }.percent(), 75);
        assert_eq!(Progress { current: 1, max: 3 }.percent(), 34);
        assert_eq!(Progress { current: 0, max: 7 }.percent(), 0);
        assert_eq!(Progress { current: 7, max: 7 }.percent(), 100);
    }

    #[test]
    fn percent_with_zero_max_is_zero() {
        assert_eq!(Progress { current: 5, max: 0 }.percent(), 0);
    }

    #[test]
    fn task_keeps_unknown_fields() {
        let task: Task = serde_json::from_str(
            r#"{"_id":"t1","status":"completed","result":{"count":2},"library":"lib"}"#,
        )
        .unwrap();
        assert_eq!(task.id.as_deref(), Some("t1"));
        assert_eq!(task.task_status(), Some(TaskStatus::Completed));
        assert_eq!(task.extra["result"]["count"], 2);
        assert_eq!(task.extra["library"], "lib");

        let back = serde_json::to_value(&task).unwrap();
        assert_eq!(back["_id"], "t1");
        assert_eq!(back["result"]["count"], 2);
    }

    #[test]
    fn snapshot_serializes_flat_with_percent() {
        let task: Task = serde_json::from_str(
            r#"{"_id":"t1","status":"processing","progress":{"current":3,"max":4}}"#,
        )
        .unwrap();
        let snap = TaskSnapshot::new(task);
        assert_eq!(snap.percent, Some(75));
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["percent"], 75);
        assert_eq!(json["status"], "processing");
        assert_eq!(json["progress"]["max"], 4);
    }

    #[test]
    fn malformed_progress_is_dropped() {
        for progress in [r#"{"current":1}"#, r#""half""#, r#"{"current":-1,"max":4}"#, "null"] {
            let body = format!(r#"{{"_id":"t1","status":"processing","progress":{progress}}}"#);
            let task: Task = serde_json::from_str(&body).unwrap();
            assert_eq!(task.progress, None, "progress {progress}");
            assert_eq!(TaskSnapshot::new(task).percent, None);
        }
    }

    #[test]
    fn unknown_status_does_not_parse() {
        assert_eq!(TaskStatus::parse("bogus"), None);
        assert_eq!(TaskStatus::parse("error"), Some(TaskStatus::Error));
    }

    #[test]
    fn upload_request_duplicate_field_overwrites() {
        let req = UploadRequest::new("/tmp/a.xml")
            .field("library", "one")
            .field("library", "two");
        assert_eq!(req.fields.len(), 1);
        assert_eq!(req.fields["library"], "two");
    }
}
