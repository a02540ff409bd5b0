//! Task record: the task plus its queue bookkeeping.

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::domain::{Task, TaskStateView, TaskStatus};

/// Queue position of a held task.
///
/// - Waiting -> Ready (last dependency completed)
/// - Ready -> Running (popped)
/// - Running -> Ready (deadline passed)
/// - Running -> removed (completed)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Blocked on at least one unfinished dependency.
    Waiting,

    /// In the ready queue.
    Ready,

    /// Handed to a worker; must complete before the deadline.
    Running {
        deadline_at: Instant,
        deadline: DateTime<Utc>,
    },
}

impl TaskState {
    pub fn view(&self) -> TaskStateView {
        match self {
            TaskState::Waiting => TaskStateView::Waiting,
            TaskState::Ready => TaskStateView::Ready,
            TaskState::Running { .. } => TaskStateView::Running,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub task: Task,
    pub state: TaskState,

    /// Push order, used to release dependents deterministically.
    pub seq: u64,

    /// Number of times the task has been popped.
    pub attempts: u32,
}

impl TaskRecord {
    pub fn new(task: Task, seq: u64, has_dependencies: bool) -> Self {
        let state = if has_dependencies {
            TaskState::Waiting
        } else {
            TaskState::Ready
        };
        Self {
            task,
            state,
            seq,
            attempts: 0,
        }
    }

    pub fn mark_ready(&mut self) {
        self.state = TaskState::Ready;
    }

    /// Hand the task to a worker until `deadline_at`.
    pub fn start_execution(&mut self, deadline_at: Instant, deadline: DateTime<Utc>) {
        self.state = TaskState::Running {
            deadline_at,
            deadline,
        };
        self.attempts += 1;
    }

    pub fn deadline_at(&self) -> Option<Instant> {
        match self.state {
            TaskState::Running { deadline_at, .. } => Some(deadline_at),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, TaskState::Running { .. })
    }

    pub fn status(&self) -> TaskStatus {
        let deadline = match self.state {
            TaskState::Running { deadline, .. } => Some(deadline),
            _ => None,
        };
        TaskStatus {
            task: self.task.clone(),
            state: self.state.view(),
            deadline,
        }
    }
}
