//! Store: dependency graph, task records and the in-memory queue.

mod dependency;
mod memory;
mod record;

pub use dependency::DependencyGraph;
pub use memory::MemoryStore;
pub use record::{TaskRecord, TaskState};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

use crate::domain::{Execution, InsertTask, Task, TaskKey, TaskStatus};
use crate::observability::QueueCounts;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PushError {
    #[error(
        "missing task to depend upon: {dependency}; it is either non-existent or already finished"
    )]
    MissingDependency { dependency: TaskKey },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PopError {
    #[error("the store is shutting down")]
    Closed,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompleteError {
    #[error("no such task: {0}")]
    NotFound(TaskKey),

    #[error("task {0} is not running")]
    NotRunning(TaskKey),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatusError {
    #[error("no such task: {0}")]
    NotFound(TaskKey),
}

/// Queue port used by the HTTP layer.
///
/// Implementations manage state transitions (Waiting -> Ready -> Running ->
/// completed); callers only report what happened.
#[async_trait]
pub trait Store: Send + Sync {
    /// Store a batch of tasks atomically and return them with their keys.
    async fn push(&self, tasks: Vec<InsertTask>) -> Result<Vec<Task>, PushError>;

    /// Wait for the oldest ready task and start executing it.
    async fn pop(&self) -> Result<Execution, PopError>;

    /// Finish a running task, releasing the tasks that waited for it.
    async fn complete(&self, id: TaskKey) -> Result<(), CompleteError>;

    async fn status(&self, id: TaskKey) -> Result<TaskStatus, StatusError>;

    async fn counts(&self) -> QueueCounts;

    /// Requeue every execution whose deadline has passed.
    async fn reap_expired(&self) -> Vec<TaskKey>;

    /// Run the deadline monitor until `shutdown` turns true or its sender is dropped.
    async fn monitor(&self, shutdown: watch::Receiver<bool>);

    /// Fail pending and future pops with [`PopError::Closed`].
    async fn close(&self);
}
