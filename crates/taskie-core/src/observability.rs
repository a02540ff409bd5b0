use serde::{Deserialize, Serialize};

/// Number of held tasks in each queue position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    /// Blocked on at least one unfinished dependency.
    pub waiting: usize,
    pub ready: usize,
    pub running: usize,
}

impl QueueCounts {
    pub fn total(&self) -> usize {
        self.waiting + self.ready + self.running
    }
}
