//! Task keys.
//!
//! Keys are ULIDs rendered with a `task-` prefix. The timestamp half keeps them
//! sortable by creation time, and the random half keeps them from being
//! guessable the way a sequential counter would be.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use ulid::Ulid;

const PREFIX: &str = "task-";

/// Identifier of a task held by the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey(Ulid);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyDecodeError {
    #[error("task key must start with 'task-': {0:?}")]
    MissingPrefix(String),

    #[error("invalid task key {key:?}: {reason}")]
    Invalid { key: String, reason: String },
}

impl TaskKey {
    /// Generate a fresh key stamped with the current wall-clock time.
    pub fn generate() -> Self {
        let timestamp_ms = Utc::now().timestamp_millis() as u64;
        Self(Ulid::from_parts(timestamp_ms, rand::random()))
    }

    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}{}", self.0)
    }
}

impl FromStr for TaskKey {
    type Err = KeyDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s
            .strip_prefix(PREFIX)
            .ok_or_else(|| KeyDecodeError::MissingPrefix(s.to_string()))?;
        let ulid = Ulid::from_string(raw).map_err(|e| KeyDecodeError::Invalid {
            key: s.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self(ulid))
    }
}

impl Serialize for TaskKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TaskKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
