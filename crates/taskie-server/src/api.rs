//! Error mapping and the JSON extractor used by every handler.

use axum::{
    Json as AxumJson, async_trait,
    extract::{
        FromRequest, Request,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use taskie_core::{CompleteError, ErrorBody, KeyDecodeError, PopError, PushError, StatusError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("could not parse JSON input: {}", .0.body_text())]
    Parse(#[from] JsonRejection),

    #[error("could not parse path: {}", .0.body_text())]
    Path(#[from] PathRejection),

    #[error("could not parse task key: {0}")]
    KeyDecode(#[from] KeyDecodeError),

    #[error("error while pushing new tasks: {0}")]
    Push(#[from] PushError),

    #[error("error while popping from the queue: {0}")]
    Pop(#[from] PopError),

    #[error("error while setting a task as completed: {0}")]
    Complete(#[from] CompleteError),

    #[error("error while looking up a task: {0}")]
    Status(#[from] StatusError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Parse(err) => err.status(),
            ApiError::Path(err) => err.status(),
            ApiError::KeyDecode(_) => StatusCode::BAD_REQUEST,
            ApiError::Push(PushError::MissingDependency { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Pop(PopError::Closed) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Complete(CompleteError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Complete(CompleteError::NotRunning(_)) => StatusCode::CONFLICT,
            ApiError::Status(StatusError::NotFound(_)) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), %message, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), %message, "request rejected");
        }

        let body = AxumJson(ErrorBody {
            status: status.as_u16(),
            message,
        });
        (status, body).into_response()
    }
}

/// `axum::Json`, but rejections come back as [`ApiError`] JSON bodies.
pub struct Json<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for Json<T>
where
    AxumJson<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let AxumJson(value) = AxumJson::<T>::from_request(req, state).await?;
        Ok(Json(value))
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        AxumJson(self.0).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use taskie_core::TaskKey;

    #[rstest]
    #[case::missing_dependency(
        ApiError::Push(PushError::MissingDependency { dependency: TaskKey::generate() }),
        StatusCode::BAD_REQUEST
    )]
    #[case::closed(ApiError::Pop(PopError::Closed), StatusCode::SERVICE_UNAVAILABLE)]
    #[case::not_found(
        ApiError::Complete(CompleteError::NotFound(TaskKey::generate())),
        StatusCode::NOT_FOUND
    )]
    #[case::not_running(
        ApiError::Complete(CompleteError::NotRunning(TaskKey::generate())),
        StatusCode::CONFLICT
    )]
    #[case::bad_key(
        ApiError::KeyDecode(KeyDecodeError::MissingPrefix("x".into())),
        StatusCode::BAD_REQUEST
    )]
    fn maps_errors_to_status(#[case] err: ApiError, #[case] expected: StatusCode) {
        assert_eq!(err.status(), expected);
        assert_eq!(err.into_response().status(), expected);
    }
}
