use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use url::Url;

use taskie_client::{
    Client, ClientError, Execution, HandlerRegistry, HandlerResult, InsertTask, TaskHandler,
    TaskKey, TaskStateView, WorkerGroup,
};
use taskie_core::MemoryStore;

struct TestServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let store = Arc::new(MemoryStore::new());
        let shutdown = async move {
            let _ = rx.await;
        };
        tokio::spawn(taskie_server::serve(listener, store, shutdown));
        Self {
            addr,
            shutdown: Some(tx),
        }
    }

    fn client(&self) -> Client {
        Client::new(Url::parse(&format!("http://{}", self.addr)).unwrap())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Counts executions per name and records the order they ran in.
#[derive(Default)]
struct Recorder {
    runs: AtomicUsize,
    order: std::sync::Mutex<Vec<String>>,
}

#[async_trait]
impl TaskHandler for Recorder {
    async fn handle(&self, execution: &Execution) -> HandlerResult {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let name = execution.task.name.clone();
        self.order.lock().unwrap().push(name);
        Ok(())
    }
}

struct AlwaysFails;

#[async_trait]
impl TaskHandler for AlwaysFails {
    async fn handle(&self, _execution: &Execution) -> HandlerResult {
        Err("nope".into())
    }
}

async fn wait_until_drained(client: &Client) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if client.counts().await.unwrap().total() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("queue should drain");
}

#[tokio::test]
async fn client_round_trip() {
    let server = TestServer::start().await;
    let client = server.client();

    let pushed = client
        .push(&[InsertTask::new("hello").with_payload(json!({ "name": "taskie" }))])
        .await
        .unwrap();
    assert_eq!(pushed.len(), 1);

    let status = client.status(pushed[0].id).await.unwrap();
    assert_eq!(status.state, TaskStateView::Ready);

    let execution = client.pop().await.unwrap();
    assert_eq!(execution.task.id, pushed[0].id);
    assert_eq!(execution.task.payload, Some(json!({ "name": "taskie" })));

    client.complete(execution.task.id).await.unwrap();
    assert_eq!(client.counts().await.unwrap().total(), 0);
}

#[tokio::test]
async fn server_errors_surface_status_and_message() {
    let server = TestServer::start().await;
    let client = server.client();
    let ghost = TaskKey::generate();

    let err = client
        .push(&[InsertTask::new("orphan").depends_on([ghost])])
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
    match err {
        ClientError::Unsuccessful { message, .. } => {
            assert!(message.contains(&ghost.to_string()), "{message}");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let err = client.complete(ghost).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
}

#[tokio::test]
async fn worker_group_runs_a_dependency_chain_in_order() {
    let server = TestServer::start().await;
    let client = Arc::new(server.client());

    let first = client
        .push(&[InsertTask::new("fetch")])
        .await
        .unwrap()
        .remove(0);
    let second = client
        .push(&[InsertTask::new("build").depends_on([first.id])])
        .await
        .unwrap()
        .remove(0);
    client
        .push(&[InsertTask::new("release").depends_on([second.id])])
        .await
        .unwrap();

    let recorder = Arc::new(Recorder::default());
    let mut registry = HandlerRegistry::new();
    for name in ["fetch", "build", "release"] {
        registry.register(name, recorder.clone()).unwrap();
    }

    let workers = WorkerGroup::spawn(2, Arc::clone(&client), Arc::new(registry));
    wait_until_drained(&client).await;
    workers.shutdown_and_join().await;

    assert_eq!(recorder.runs.load(Ordering::SeqCst), 3);
    assert_eq!(
        *recorder.order.lock().unwrap(),
        vec!["fetch".to_string(), "build".to_string(), "release".to_string()]
    );
}

#[tokio::test]
async fn failed_handler_leaves_task_running() {
    let server = TestServer::start().await;
    let client = Arc::new(server.client());

    let task = client
        .push(&[InsertTask::new("flaky").with_duration(Duration::from_secs(60))])
        .await
        .unwrap()
        .remove(0);

    let mut registry = HandlerRegistry::new();
    registry.register("flaky", Arc::new(AlwaysFails)).unwrap();
    let workers = WorkerGroup::spawn(1, Arc::clone(&client), Arc::new(registry));

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let status = client.status(task.id).await.unwrap();
            if status.state == TaskStateView::Running {
                assert!(status.deadline.is_some());
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("task should be picked up");

    workers.shutdown_and_join().await;
    assert_eq!(
        client.status(task.id).await.unwrap().state,
        TaskStateView::Running
    );
}
