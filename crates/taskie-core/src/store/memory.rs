//! In-memory store implementation.

use std::collections::{HashMap, VecDeque};
use std::future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{Mutex, Notify, watch};
use tokio::time::Instant;

use super::{
    CompleteError, DependencyGraph, PopError, PushError, StatusError, Store, TaskRecord, TaskState,
};
use crate::domain::{Execution, InsertTask, Task, TaskKey, TaskStatus};
use crate::observability::QueueCounts;

/// Stand-in deadline for durations too large to add to the clock.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

struct MemoryState {
    /// Single source of truth for held tasks.
    records: HashMap<TaskKey, TaskRecord>,

    /// Ready queue (keys only, FIFO).
    ready: VecDeque<TaskKey>,

    graph: DependencyGraph,

    next_seq: u64,

    closed: bool,
}

impl MemoryState {
    fn new() -> Self {
        Self {
            records: HashMap::new(),
            ready: VecDeque::new(),
            graph: DependencyGraph::new(),
            next_seq: 0,
            closed: false,
        }
    }

    fn allocate_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Take the oldest ready task and mark it running.
    fn start_next(&mut self) -> Option<Execution> {
        while let Some(id) = self.ready.pop_front() {
            let Some(record) = self.records.get_mut(&id) else {
                continue;
            };
            let (deadline_at, deadline) = deadline_after(record.task.duration);
            record.start_execution(deadline_at, deadline);
            return Some(Execution {
                task: record.task.clone(),
                deadline,
            });
        }
        None
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.records
            .values()
            .filter_map(TaskRecord::deadline_at)
            .min()
    }

    fn counts(&self) -> QueueCounts {
        let mut counts = QueueCounts::default();
        for record in self.records.values() {
            match record.state {
                TaskState::Waiting => counts.waiting += 1,
                TaskState::Ready => counts.ready += 1,
                TaskState::Running { .. } => counts.running += 1,
            }
        }
        counts
    }
}

fn deadline_after(duration: Duration) -> (Instant, DateTime<Utc>) {
    let now = Instant::now();
    let deadline_at = now
        .checked_add(duration)
        .unwrap_or_else(|| now + FAR_FUTURE);
    let deadline = TimeDelta::from_std(duration)
        .ok()
        .and_then(|delta| Utc::now().checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    (deadline_at, deadline)
}

/// Queue kept entirely in process memory.
///
/// Waiting workers are woken through `ready_notify`, one permit per task that
/// becomes ready. `deadline_notify` wakes the monitor whenever an execution
/// starts, since the earliest deadline may have moved.
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    ready_notify: Notify,
    deadline_notify: Notify,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::new()),
            ready_notify: Notify::new(),
            deadline_notify: Notify::new(),
        }
    }

    fn wake_workers(&self, n: usize) {
        for _ in 0..n {
            self.ready_notify.notify_one();
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn push(&self, tasks: Vec<InsertTask>) -> Result<Vec<Task>, PushError> {
        let mut state = self.state.lock().await;

        // Validate the whole batch before touching anything.
        for insert in &tasks {
            if let Some(&dependency) = insert
                .depends_on
                .iter()
                .find(|dep| !state.records.contains_key(dep))
            {
                return Err(PushError::MissingDependency { dependency });
            }
        }

        let created: Vec<Task> = tasks
            .into_iter()
            .map(|insert| Task::from_insert(TaskKey::generate(), insert))
            .collect();

        for task in &created {
            for &dep in &task.depends_on {
                state.graph.add_dependency(task.id, dep);
            }
        }
        // Fresh keys have no dependents, so new edges cannot close a cycle.
        let new_keys = created.iter().map(|t| t.id);
        debug_assert!(state.graph.detect_cycle_from(new_keys).is_none());

        let mut readied = 0;
        for task in &created {
            let seq = state.allocate_seq();
            let has_dependencies = !task.depends_on.is_empty();
            let record = TaskRecord::new(task.clone(), seq, has_dependencies);
            state.records.insert(task.id, record);
            if !has_dependencies {
                state.ready.push_back(task.id);
                readied += 1;
            }
        }
        tracing::debug!(
            pushed = created.len(),
            ready = readied,
            held = state.records.len(),
            "stored task batch"
        );

        drop(state);
        self.wake_workers(readied);

        Ok(created)
    }

    async fn pop(&self) -> Result<Execution, PopError> {
        loop {
            // Register interest before checking, so a push or close that lands
            // between the check and the await still wakes us.
            let notified = self.ready_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                if state.closed {
                    return Err(PopError::Closed);
                }
                if let Some(execution) = state.start_next() {
                    let more_ready = !state.ready.is_empty();
                    drop(state);

                    self.deadline_notify.notify_one();
                    if more_ready {
                        self.ready_notify.notify_one();
                    }
                    return Ok(execution);
                }
            }

            notified.await;
        }
    }

    async fn complete(&self, id: TaskKey) -> Result<(), CompleteError> {
        let mut state = self.state.lock().await;

        let record = state.records.get(&id).ok_or(CompleteError::NotFound(id))?;
        if !record.is_running() {
            return Err(CompleteError::NotRunning(id));
        }
        state.records.remove(&id);

        let mut released: Vec<(u64, TaskKey)> = Vec::new();
        for waiter in state.graph.remove_task(id) {
            if state.graph.has_dependencies(waiter) {
                continue;
            }
            if let Some(record) = state.records.get_mut(&waiter)
                && record.state == TaskState::Waiting
            {
                record.mark_ready();
                released.push((record.seq, waiter));
            }
        }
        released.sort();
        for &(_, waiter) in &released {
            state.ready.push_back(waiter);
        }
        tracing::debug!(%id, released = released.len(), "released dependents");

        drop(state);
        self.wake_workers(released.len());

        Ok(())
    }

    async fn status(&self, id: TaskKey) -> Result<TaskStatus, StatusError> {
        let state = self.state.lock().await;
        state
            .records
            .get(&id)
            .map(TaskRecord::status)
            .ok_or(StatusError::NotFound(id))
    }

    async fn counts(&self) -> QueueCounts {
        self.state.lock().await.counts()
    }

    async fn reap_expired(&self) -> Vec<TaskKey> {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        let mut expired: Vec<(Instant, u64, TaskKey)> = state
            .records
            .values()
            .filter_map(|record| {
                record
                    .deadline_at()
                    .filter(|&at| at <= now)
                    .map(|at| (at, record.seq, record.task.id))
            })
            .collect();
        expired.sort();

        let mut requeued = Vec::with_capacity(expired.len());
        for (_, _, id) in expired {
            let Some(record) = state.records.get_mut(&id) else {
                continue;
            };
            record.mark_ready();
            tracing::warn!(
                %id,
                name = %record.task.name,
                attempts = record.attempts,
                "Execution deadline passed, requeueing task"
            );
            state.ready.push_back(id);
            requeued.push(id);
        }

        drop(state);
        self.wake_workers(requeued.len());

        requeued
    }

    async fn monitor(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Task monitor running");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let notified = self.deadline_notify.notified();
            self.reap_expired().await;
            let next = self.state.lock().await.next_deadline();

            let sleep = async {
                match next {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => future::pending().await,
                }
            };

            tokio::select! {
                _ = notified => {}
                _ = sleep => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Task monitor stopped");
    }

    async fn close(&self) {
        self.state.lock().await.closed = true;
        self.ready_notify.notify_waiters();
    }
}

impl MemoryStore {
    /// Keys currently in the ready queue, oldest first.
    #[cfg(test)]
    async fn ready_keys(&self) -> Vec<TaskKey> {
        self.state.lock().await.ready.iter().copied().collect()
    }

    #[cfg(test)]
    async fn dependencies_of(&self, id: TaskKey) -> std::collections::HashSet<TaskKey> {
        let state = self.state.lock().await;
        state.graph.get_dependencies(id).into_iter().collect()
    }
}
