//! Wire types shared by the server and its clients.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TaskKey;

pub type TaskName = String;

/// Time a worker gets to complete an execution when the producer does not say.
pub const DEFAULT_DURATION: Duration = Duration::from_secs(30);

fn default_duration() -> Duration {
    DEFAULT_DURATION
}

/// A task as submitted by a producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertTask {
    pub name: TaskName,

    #[serde(default)]
    pub payload: Option<serde_json::Value>,

    /// Tasks that must complete before this one becomes ready.
    #[serde(default)]
    pub depends_on: Vec<TaskKey>,

    #[serde(with = "duration_secs", default = "default_duration")]
    pub duration: Duration,
}

impl InsertTask {
    pub fn new(name: impl Into<TaskName>) -> Self {
        Self {
            name: name.into(),
            payload: None,
            depends_on: Vec::new(),
            duration: DEFAULT_DURATION,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn depends_on(mut self, keys: impl IntoIterator<Item = TaskKey>) -> Self {
        self.depends_on.extend(keys);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// A task held by the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskKey,
    pub name: TaskName,
    pub payload: Option<serde_json::Value>,
    pub depends_on: Vec<TaskKey>,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

impl Task {
    pub fn from_insert(id: TaskKey, insert: InsertTask) -> Self {
        let mut depends_on = insert.depends_on;
        depends_on.sort();
        depends_on.dedup();
        Self {
            id,
            name: insert.name,
            payload: insert.payload,
            depends_on,
            duration: insert.duration,
        }
    }
}

/// A popped task and the instant by which the worker has to complete it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub task: Task,
    pub deadline: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteTask {
    pub id: TaskKey,
}

/// Serializable view of a task's position in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStateView {
    Waiting,
    Ready,
    Running,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task: Task,
    pub state: TaskStateView,
    pub deadline: Option<DateTime<Utc>>,
}

/// Whole-second (de)serialization for `std::time::Duration`.
pub mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn insert_task_defaults() {
        let task: InsertTask = serde_json::from_value(json!({ "name": "build" })).unwrap();
        assert_eq!(task.name, "build");
        assert_eq!(task.payload, None);
        assert!(task.depends_on.is_empty());
        assert_eq!(task.duration, Duration::from_secs(30));
    }

    #[test]
    fn insert_task_reads_duration_in_seconds() {
        let dep = TaskKey::generate();
        let task: InsertTask = serde_json::from_value(json!({
            "name": "deploy",
            "payload": { "env": "prod" },
            "depends_on": [dep.to_string()],
            "duration": 120,
        }))
        .unwrap();
        assert_eq!(task.duration, Duration::from_secs(120));
        assert_eq!(task.depends_on, vec![dep]);
        assert_eq!(task.payload, Some(json!({ "env": "prod" })));
    }

    #[test]
    fn insert_task_with_bad_dependency_key_fails() {
        let err = serde_json::from_value::<InsertTask>(json!({
            "name": "deploy",
            "depends_on": ["42"],
        }))
        .unwrap_err();
        assert!(err.to_string().contains("task key"));
    }

    #[test]
    fn from_insert_collapses_duplicate_dependencies() {
        let dep = TaskKey::generate();
        let insert = InsertTask::new("x").depends_on([dep, dep]);
        let task = Task::from_insert(TaskKey::generate(), insert);
        assert_eq!(task.depends_on, vec![dep]);
    }

    #[test]
    fn execution_deadline_is_rfc3339() {
        let deadline = DateTime::parse_from_rfc3339("2024-01-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let execution = Execution {
            task: Task::from_insert(TaskKey::generate(), InsertTask::new("x")),
            deadline,
        };
        let value = serde_json::to_value(&execution).unwrap();
        assert_eq!(value["deadline"], "2024-01-01T12:00:00Z");
        assert_eq!(value["task"]["duration"], 30);
    }

    #[test]
    fn state_view_is_snake_case() {
        assert_eq!(
            serde_json::to_value(TaskStateView::Running).unwrap(),
            json!("running")
        );
    }
}
