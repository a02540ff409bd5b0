//! HTTP handlers and the router.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
};

use taskie_core::{
    CompleteTask, Execution, InsertTask, QueueCounts, Store, Task, TaskKey, TaskStatus,
};

use crate::api::{ApiError, Json};

pub type Context = Arc<dyn Store>;

pub fn router(store: Context) -> Router {
    Router::new()
        .route("/v1/push", put(push))
        .route("/v1/pop", get(pop))
        .route("/v1/complete", post(complete))
        .route("/v1/tasks/:id", get(status))
        .route("/v1/counts", get(counts))
        .with_state(store)
}

async fn push(
    State(store): State<Context>,
    Json(tasks): Json<Vec<InsertTask>>,
) -> Result<(StatusCode, Json<Vec<Task>>), ApiError> {
    let tasks = store.push(tasks).await?;
    tracing::info!(
        tasks = ?tasks.iter().map(|t| (t.id.to_string(), t.name.as_str())).collect::<Vec<_>>(),
        "Queued tasks"
    );
    Ok((StatusCode::OK, Json(tasks)))
}

async fn pop(State(store): State<Context>) -> Result<(StatusCode, Json<Execution>), ApiError> {
    let execution = store.pop().await?;
    tracing::info!(
        id = %execution.task.id,
        name = %execution.task.name,
        deadline = %execution.deadline,
        "Dequeued task"
    );
    Ok((StatusCode::OK, Json(execution)))
}

async fn complete(
    State(store): State<Context>,
    Json(CompleteTask { id }): Json<CompleteTask>,
) -> Result<StatusCode, ApiError> {
    store.complete(id).await?;
    tracing::info!(%id, "Task completed");
    Ok(StatusCode::OK)
}

async fn status(
    State(store): State<Context>,
    path: Result<Path<String>, axum::extract::rejection::PathRejection>,
) -> Result<Json<TaskStatus>, ApiError> {
    let Path(raw) = path?;
    let id: TaskKey = raw.parse()?;
    Ok(Json(store.status(id).await?))
}

async fn counts(State(store): State<Context>) -> Json<QueueCounts> {
    Json(store.counts().await)
}
