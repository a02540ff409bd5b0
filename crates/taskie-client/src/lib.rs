//! taskie-client
//!
//! HTTP client for a Taskie server, plus a small worker group that pops
//! executions and dispatches them to handlers by task name.

mod worker;

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

pub use taskie_core::QueueCounts;
pub use taskie_core::domain::*;
pub use worker::{HandlerRegistry, HandlerResult, TaskHandler, WorkerError, WorkerGroup};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not build the url for the action from the host parameter")]
    ParseUrl(#[from] url::ParseError),

    #[error("error while sending HTTP request")]
    Request(#[from] reqwest::Error),

    #[error("request failed with status code {status}: {message}")]
    Unsuccessful { status: StatusCode, message: String },
}

impl ClientError {
    /// HTTP status of a rejected request, if the server answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Unsuccessful { status, .. } => Some(*status),
            ClientError::Request(err) => err.status(),
            ClientError::ParseUrl(_) => None,
        }
    }
}

pub struct Client {
    host: Url,
    client: reqwest::Client,
}

impl Client {
    pub fn new(host: Url) -> Self {
        Self::with_http_client(host, reqwest::Client::new())
    }

    /// Use a preconfigured `reqwest::Client` (timeouts, proxies, TLS, ...).
    pub fn with_http_client(host: Url, client: reqwest::Client) -> Self {
        Self { host, client }
    }

    pub async fn push(&self, tasks: &[InsertTask]) -> Result<Vec<Task>, ClientError> {
        let url = self.host.join("/v1/push")?;
        let response = self.client.put(url).json(tasks).send().await?;
        decode(response).await
    }

    /// Wait for the next execution.
    ///
    /// The server holds the request open until a task is ready; if the HTTP
    /// client gives up first the request is simply sent again.
    pub async fn pop(&self) -> Result<Execution, ClientError> {
        let url = self.host.join("/v1/pop")?;
        loop {
            match self.client.get(url.clone()).send().await {
                Err(err) if err.is_timeout() => {
                    tracing::trace!("pop timed out, polling again");
                }
                Err(err) => return Err(err.into()),
                Ok(response) => return decode(response).await,
            }
        }
    }

    pub async fn complete(&self, id: TaskKey) -> Result<(), ClientError> {
        let url = self.host.join("/v1/complete")?;
        let response = self
            .client
            .post(url)
            .json(&CompleteTask { id })
            .send()
            .await?;
        check(response).await.map(drop)
    }

    pub async fn status(&self, id: TaskKey) -> Result<TaskStatus, ClientError> {
        let url = self.host.join(&format!("/v1/tasks/{id}"))?;
        let response = self.client.get(url).send().await?;
        decode(response).await
    }

    pub async fn counts(&self) -> Result<QueueCounts, ClientError> {
        let url = self.host.join("/v1/counts")?;
        let response = self.client.get(url).send().await?;
        decode(response).await
    }
}

async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.message)
        .unwrap_or(text);
    Err(ClientError::Unsuccessful { status, message })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    Ok(check(response).await?.json().await?)
}
