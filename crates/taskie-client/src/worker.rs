use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::{Client, Execution, TaskName};

/// Pause after a failed pop before asking the server again.
const POP_BACKOFF: Duration = Duration::from_secs(1);

pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Runs executions of one task name.
///
/// Returning an error leaves the task uncompleted; the server hands it out
/// again once the execution deadline passes.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, execution: &Execution) -> HandlerResult;
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("handler not found for task name={0}")]
    HandlerNotFound(TaskName),

    #[error("duplicate handler for task name={0}")]
    DuplicateHandler(TaskName),

    #[error("handler for task name={name} failed: {message}")]
    Failed { name: TaskName, message: String },
}

/// Task name -> handler.
///
/// Built during initialization, then shared read-only between workers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<TaskName, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<TaskName>,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<(), WorkerError> {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            return Err(WorkerError::DuplicateHandler(name));
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn TaskHandler>> {
        self.handlers.get(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    async fn execute(&self, execution: &Execution) -> Result<(), WorkerError> {
        let name = &execution.task.name;
        let handler = self
            .get(name)
            .ok_or_else(|| WorkerError::HandlerNotFound(name.clone()))?;
        handler
            .handle(execution)
            .await
            .map_err(|err| WorkerError::Failed {
                name: name.clone(),
                message: err.to_string(),
            })
    }
}

/// Worker group handle.
///
/// - Dropping `shutdown_tx` (or calling `request_shutdown`) stops every worker.
/// - `shutdown_and_join` waits for all of them.
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers.
    pub fn spawn(n: usize, client: Arc<Client>, registry: Arc<HandlerRegistry>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let joins = (0..n)
            .map(|worker_id| {
                let client = Arc::clone(&client);
                let registry = Arc::clone(&registry);
                let mut rx = shutdown_rx.clone();
                tokio::spawn(async move {
                    worker_loop(worker_id, client, registry, &mut rx).await;
                })
            })
            .collect();

        Self { shutdown_tx, joins }
    }

    /// Stop taking new executions. In-flight handlers run to completion.
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            let _ = join.await;
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    client: Arc<Client>,
    registry: Arc<HandlerRegistry>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    tracing::debug!(worker_id, "worker started");
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let popped = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            popped = client.pop() => popped,
        };

        let execution = match popped {
            Ok(execution) => execution,
            Err(err) => {
                tracing::warn!(worker_id, error = %err, "pop failed, backing off");
                tokio::select! {
                    _ = shutdown_rx.changed() => {}
                    _ = tokio::time::sleep(POP_BACKOFF) => {}
                }
                continue;
            }
        };

        let id = execution.task.id;
        match registry.execute(&execution).await {
            Ok(()) => match client.complete(id).await {
                Ok(()) => tracing::debug!(worker_id, %id, "task completed"),
                Err(err) => tracing::warn!(worker_id, %id, error = %err, "complete failed"),
            },
            Err(err) => {
                tracing::warn!(
                    worker_id,
                    %id,
                    error = %err,
                    deadline = %execution.deadline,
                    "task left for requeue"
                );
            }
        }
    }
    tracing::debug!(worker_id, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InsertTask, Task, TaskKey};

    struct OkHandler;

    #[async_trait]
    impl TaskHandler for OkHandler {
        async fn handle(&self, _execution: &Execution) -> HandlerResult {
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl TaskHandler for FailingHandler {
        async fn handle(&self, _execution: &Execution) -> HandlerResult {
            Err("boom".into())
        }
    }

    fn execution(name: &str) -> Execution {
        Execution {
            task: Task::from_insert(TaskKey::generate(), InsertTask::new(name)),
            deadline: serde_json::from_str("\"2024-01-01T00:00:00Z\"").unwrap(),
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = HandlerRegistry::new();
        registry.register("ok", Arc::new(OkHandler)).unwrap();
        let err = registry.register("ok", Arc::new(OkHandler)).unwrap_err();
        assert!(matches!(err, WorkerError::DuplicateHandler(name) if name == "ok"));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn executes_registered_handler() {
        let mut registry = HandlerRegistry::new();
        registry.register("ok", Arc::new(OkHandler)).unwrap();

        registry.execute(&execution("ok")).await.unwrap();
    }

    #[tokio::test]
    async fn missing_handler_is_an_error() {
        let registry = HandlerRegistry::new();
        let err = registry.execute(&execution("nope")).await.unwrap_err();
        assert!(matches!(err, WorkerError::HandlerNotFound(name) if name == "nope"));
    }

    #[tokio::test]
    async fn handler_failure_carries_message() {
        let mut registry = HandlerRegistry::new();
        registry.register("bad", Arc::new(FailingHandler)).unwrap();

        let err = registry.execute(&execution("bad")).await.unwrap_err();
        assert_eq!(err.to_string(), "handler for task name=bad failed: boom");
    }
}
