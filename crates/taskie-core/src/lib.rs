//! taskie-core
//!
//! Building blocks of the Taskie queue.
//!
//! - **domain**: task keys and wire types (`InsertTask`, `Task`, `Execution`, ...)
//! - **store**: the `Store` port, the dependency graph and the in-memory store
//! - **observability**: queue counters

pub mod domain;
pub mod observability;
pub mod store;

pub use domain::{
    CompleteTask, ErrorBody, Execution, InsertTask, KeyDecodeError, Task, TaskKey, TaskStateView,
    TaskStatus,
};
pub use observability::QueueCounts;
pub use store::{CompleteError, MemoryStore, PopError, PushError, StatusError, Store};
