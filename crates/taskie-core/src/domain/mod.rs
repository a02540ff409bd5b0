//! Domain model: task keys and the JSON shapes exchanged over HTTP.

pub mod error;
pub mod ids;
pub mod task;

pub use error::ErrorBody;
pub use ids::{KeyDecodeError, TaskKey};
pub use task::{
    CompleteTask, DEFAULT_DURATION, Execution, InsertTask, Task, TaskName, TaskStateView,
    TaskStatus,
};
