use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::{http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde_json::json;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::watch;

use super::types::{Document, Task, TaskStatus, PROVIDER_FAILED_MARKER};
use super::{Pipeline, Scheduler};
use crate::blobstore::{BlobStore, ObjectMeta};
use crate::provider::{ProviderTaskState, SttProvider, SubmitReceipt};
use crate::storage::task::sqlite::SqliteTaskStorage;
use crate::storage::task::{TaskPatch, TaskStorage};
use crate::web::Pagination;

struct MockBlob {
    objects: Vec<ObjectMeta>,
}

impl MockBlob {
    fn empty() -> Self {
        Self { objects: vec![] }
    }

    fn with_objects(objects: Vec<ObjectMeta>) -> Self {
        Self { objects }
    }
}

#[async_trait]
impl BlobStore for MockBlob {
    async fn list(&self, _prefix: &str) -> Result<Vec<ObjectMeta>> {
        Ok(self.objects.clone())
    }

    async fn presign_get(&self, object_key: &str) -> Result<String> {
        Ok(format!("http://blobs.local/{}", object_key))
    }
}

enum SubmitBehavior {
    Accept(String),
    Reject,
}

enum QueryBehavior {
    Ongoing,
    Completed(Document),
    Failed,
    TransportError,
}

#[derive(Default)]
struct MockProvider {
    submits: Mutex<HashMap<String, SubmitBehavior>>,
    queries: Mutex<HashMap<String, QueryBehavior>>,
    submit_calls: Mutex<Vec<String>>,
    query_calls: Mutex<Vec<String>>,
}

impl MockProvider {
    fn accept_submit(&self, correlation_key: &str, task_id: &str) {
        self.submits.lock().unwrap().insert(
            correlation_key.to_string(),
            SubmitBehavior::Accept(task_id.to_string()),
        );
    }

    fn reject_submit(&self, correlation_key: &str) {
        self.submits
            .lock()
            .unwrap()
            .insert(correlation_key.to_string(), SubmitBehavior::Reject);
    }

    fn on_query(&self, task_id: &str, behavior: QueryBehavior) {
        self.queries
            .lock()
            .unwrap()
            .insert(task_id.to_string(), behavior);
    }

    fn submit_count(&self) -> usize {
        self.submit_calls.lock().unwrap().len()
    }

    fn query_count(&self) -> usize {
        self.query_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl SttProvider for MockProvider {
    async fn submit(&self, _source_url: &str, correlation_key: &str) -> Result<SubmitReceipt> {
        self.submit_calls
            .lock()
            .unwrap()
            .push(correlation_key.to_string());

        match self.submits.lock().unwrap().get(correlation_key) {
            Some(SubmitBehavior::Accept(task_id)) => Ok(SubmitReceipt {
                task_id: task_id.clone(),
                status: "ONGOING".to_string(),
            }),
            Some(SubmitBehavior::Reject) => Err(anyhow!("provider rejected submission")),
            None => Err(anyhow!("unexpected submit for {}", correlation_key)),
        }
    }

    async fn query(&self, provider_task_id: &str) -> Result<ProviderTaskState> {
        self.query_calls
            .lock()
            .unwrap()
            .push(provider_task_id.to_string());

        match self.queries.lock().unwrap().get(provider_task_id) {
            Some(QueryBehavior::Ongoing) => Ok(ProviderTaskState::Running("ONGOING".to_string())),
            Some(QueryBehavior::Completed(result)) => {
                Ok(ProviderTaskState::Completed(result.clone()))
            }
            Some(QueryBehavior::Failed) => Ok(ProviderTaskState::Failed("FAILED".to_string())),
            Some(QueryBehavior::TransportError) | None => Err(anyhow!("connection reset by peer")),
        }
    }
}

/// Store whose every operation errors, for loop-resilience cases.
#[derive(Default)]
struct FailingStorage {
    status_lists: Mutex<usize>,
}

impl FailingStorage {
    fn status_list_count(&self) -> usize {
        *self.status_lists.lock().unwrap()
    }
}

#[async_trait]
impl TaskStorage for FailingStorage {
    async fn upsert(&self, _task: &Task) -> Result<()> {
        Err(anyhow!("storage offline"))
    }

    async fn get(&self, _id: &str) -> Result<Option<Task>> {
        Err(anyhow!("storage offline"))
    }

    async fn get_by_key(&self, _object_key: &str) -> Result<Option<Task>> {
        Err(anyhow!("storage offline"))
    }

    async fn list(&self, _pagination: &Pagination) -> Result<Vec<Task>> {
        Err(anyhow!("storage offline"))
    }

    async fn list_by_status(&self, _status: TaskStatus) -> Result<Vec<Task>> {
        *self.status_lists.lock().unwrap() += 1;
        Err(anyhow!("storage offline"))
    }

    async fn apply(&self, _id: &str, _patch: &TaskPatch) -> Result<()> {
        Err(anyhow!("storage offline"))
    }

    async fn delete(&self, _id: &str) -> Result<()> {
        Err(anyhow!("storage offline"))
    }
}

async fn setup_pipeline(
    blobs: MockBlob,
) -> (Arc<SqliteTaskStorage>, Arc<MockProvider>, Pipeline, TempDir) {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("tasks.db").display());
    let storage = Arc::new(SqliteTaskStorage::new(&url).await.unwrap());
    let provider = Arc::new(MockProvider::default());

    let pipeline = Pipeline::new(
        storage.clone(),
        Arc::new(blobs),
        provider.clone(),
        "cn-hongkong".to_string(),
    );
    (storage, provider, pipeline, dir)
}

fn pending_task(object_key: &str) -> Task {
    Task::new(
        object_key.to_string(),
        "cn-hongkong".to_string(),
        1024,
        "2025-01-01 00:00:00".to_string(),
    )
}

fn inflight_task(object_key: &str, provider_task_id: &str) -> Task {
    let mut task = pending_task(object_key);
    task.status = TaskStatus::InFlight;
    task.provider_task_id = provider_task_id.to_string();
    task
}

fn doc(value: serde_json::Value) -> Document {
    value.as_object().unwrap().clone()
}

/// Serve `body` as JSON on an ephemeral port, returning the artifact URL.
async fn spawn_artifact_server(body: serde_json::Value) -> String {
    let app = Router::new().route(
        "/artifact",
        get(move || {
            let body = body.clone();
            async move { Json(body) }
        }),
    );
    spawn_server(app).await
}

/// Serve a 500 on an ephemeral port, for artifact-fetch failure cases.
async fn spawn_failing_server() -> String {
    let app = Router::new().route(
        "/artifact",
        get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
    );
    spawn_server(app).await
}

async fn spawn_server(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}/artifact", addr)
}

#[tokio::test]
async fn test_submit_moves_pending_to_in_flight() {
    let (storage, provider, pipeline, _dir) = setup_pipeline(MockBlob::empty()).await;
    let task = pending_task("meetings/standup.mp4");
    storage.upsert(&task).await.unwrap();
    provider.accept_submit("meetings/standup.mp4", "p2");

    let submitted = pipeline.submit_pending().await.unwrap();
    assert_eq!(submitted, 1);

    let updated = storage.get(&task.id).await.unwrap().unwrap();
    assert_eq!(updated.status, TaskStatus::InFlight);
    assert_eq!(updated.provider_task_id, "p2");
}

#[tokio::test]
async fn test_submit_is_idempotent_across_calls() {
    let (storage, provider, pipeline, _dir) = setup_pipeline(MockBlob::empty()).await;
    storage
        .upsert(&pending_task("meetings/standup.mp4"))
        .await
        .unwrap();
    provider.accept_submit("meetings/standup.mp4", "p2");

    assert_eq!(pipeline.submit_pending().await.unwrap(), 1);
    // The row is IN_FLIGHT now; a second pass must not resubmit it.
    assert_eq!(pipeline.submit_pending().await.unwrap(), 0);
    assert_eq!(provider.submit_count(), 1);
}

#[tokio::test]
async fn test_submit_paces_consecutive_submissions() {
    let (storage, provider, pipeline, _dir) = setup_pipeline(MockBlob::empty()).await;
    storage.upsert(&pending_task("a.mp4")).await.unwrap();
    storage.upsert(&pending_task("b.mp4")).await.unwrap();
    provider.accept_submit("a.mp4", "p1");
    provider.accept_submit("b.mp4", "p2");

    // The first submission gets the limiter's single cell immediately;
    // the second must wait out the refill period (2s at 30/min).
    let started = std::time::Instant::now();
    let submitted = pipeline.submit_pending().await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(submitted, 2);
    assert_eq!(provider.submit_count(), 2);
    assert!(
        elapsed >= Duration::from_millis(1500),
        "two submissions finished in {:?}, expected an inter-submission delay",
        elapsed
    );
}

#[tokio::test]
async fn test_submit_failure_leaves_task_pending() {
    let (storage, provider, pipeline, _dir) = setup_pipeline(MockBlob::empty()).await;
    let task = pending_task("meetings/standup.mp4");
    storage.upsert(&task).await.unwrap();
    provider.reject_submit("meetings/standup.mp4");

    let submitted = pipeline.submit_pending().await.unwrap();
    assert_eq!(submitted, 0);

    let unchanged = storage.get(&task.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, TaskStatus::Pending);
    assert_eq!(unchanged.provider_task_id, "");
}

#[tokio::test]
async fn test_poll_ongoing_is_a_noop() {
    let (storage, provider, pipeline, _dir) = setup_pipeline(MockBlob::empty()).await;
    let task = inflight_task("meetings/standup.mp4", "p1");
    storage.upsert(&task).await.unwrap();
    provider.on_query("p1", QueryBehavior::Ongoing);

    let before = storage.get(&task.id).await.unwrap().unwrap();
    let settled = pipeline.poll_inflight().await.unwrap();
    assert_eq!(settled, 0);

    let after = storage.get(&task.id).await.unwrap().unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_poll_completed_populates_results() {
    let (storage, provider, pipeline, _dir) = setup_pipeline(MockBlob::empty()).await;
    let task = inflight_task("meetings/standup.mp4", "p1");
    storage.upsert(&task).await.unwrap();

    let chapters_url = spawn_artifact_server(json!({"AutoChapters": [{"Headline": "开场"}]})).await;
    let summary_url = spawn_artifact_server(json!({"Summarization": {"Paragraph": "recap"}})).await;
    let transcript_url = spawn_artifact_server(json!({"Paragraphs": [{"Words": []}]})).await;

    let result = doc(json!({
        "AutoChapters": chapters_url,
        "Summarization": summary_url,
        "Transcription": transcript_url,
        "MeetingAssistance": "http://unused.local/ma.json",
    }));
    provider.on_query("p1", QueryBehavior::Completed(result.clone()));

    let settled = pipeline.poll_inflight().await.unwrap();
    assert_eq!(settled, 1);

    let updated = storage.get(&task.id).await.unwrap().unwrap();
    assert_eq!(updated.status, TaskStatus::Completed);
    assert_eq!(updated.result_payload, result);
    assert_eq!(
        updated.chapters,
        doc(json!({"AutoChapters": [{"Headline": "开场"}]}))
    );
    assert_eq!(
        updated.summary,
        doc(json!({"Summarization": {"Paragraph": "recap"}}))
    );
    assert_eq!(updated.transcript, doc(json!({"Paragraphs": [{"Words": []}]})));
}

#[tokio::test]
async fn test_poll_failed_records_marker_only() {
    let (storage, provider, pipeline, _dir) = setup_pipeline(MockBlob::empty()).await;
    let task = inflight_task("meetings/standup.mp4", "p1");
    storage.upsert(&task).await.unwrap();
    provider.on_query("p1", QueryBehavior::Failed);

    let settled = pipeline.poll_inflight().await.unwrap();
    assert_eq!(settled, 1);

    let updated = storage.get(&task.id).await.unwrap().unwrap();
    assert_eq!(updated.status, TaskStatus::Failed);
    assert_eq!(
        updated.result_payload,
        doc(json!({"error": PROVIDER_FAILED_MARKER}))
    );
    assert!(updated.chapters.is_empty());
    assert!(updated.summary.is_empty());
    assert!(updated.transcript.is_empty());
}

#[tokio::test]
async fn test_poll_transport_error_leaves_task_unchanged() {
    let (storage, provider, pipeline, _dir) = setup_pipeline(MockBlob::empty()).await;
    let task = inflight_task("meetings/standup.mp4", "p1");
    storage.upsert(&task).await.unwrap();
    provider.on_query("p1", QueryBehavior::TransportError);

    let before = storage.get(&task.id).await.unwrap().unwrap();
    let settled = pipeline.poll_inflight().await.unwrap();
    assert_eq!(settled, 0);

    let after = storage.get(&task.id).await.unwrap().unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_poll_skips_in_flight_without_provider_id() {
    let (storage, provider, pipeline, _dir) = setup_pipeline(MockBlob::empty()).await;
    let task = inflight_task("meetings/standup.mp4", "");
    storage.upsert(&task).await.unwrap();

    let settled = pipeline.poll_inflight().await.unwrap();
    assert_eq!(settled, 0);
    assert_eq!(provider.query_count(), 0);

    let unchanged = storage.get(&task.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, TaskStatus::InFlight);
}

#[tokio::test]
async fn test_artifact_fetch_failure_keeps_task_in_flight() {
    let (storage, provider, pipeline, _dir) = setup_pipeline(MockBlob::empty()).await;
    let task = inflight_task("meetings/standup.mp4", "p1");
    storage.upsert(&task).await.unwrap();

    let good_url = spawn_artifact_server(json!({})).await;
    let bad_url = spawn_failing_server().await;
    let result = doc(json!({
        "AutoChapters": good_url,
        "Summarization": bad_url,
        "Transcription": spawn_artifact_server(json!({})).await,
    }));
    provider.on_query("p1", QueryBehavior::Completed(result));

    let settled = pipeline.poll_inflight().await.unwrap();
    assert_eq!(settled, 0);

    // The whole update aborted; next tick retries the task from scratch.
    let unchanged = storage.get(&task.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, TaskStatus::InFlight);
    assert!(unchanged.chapters.is_empty());
    assert!(unchanged.result_payload.is_empty());
}

#[tokio::test]
async fn test_one_tick_mixed_scenario() {
    let (storage, provider, pipeline, _dir) = setup_pipeline(MockBlob::empty()).await;

    let a = pending_task("a.mp4");
    let b = inflight_task("b.mp4", "p1");
    let mut c = pending_task("c.mp4");
    c.status = TaskStatus::Completed;
    c.provider_task_id = "p0".to_string();
    storage.upsert(&a).await.unwrap();
    storage.upsert(&b).await.unwrap();
    storage.upsert(&c).await.unwrap();

    provider.accept_submit("a.mp4", "p2");
    let empty_artifact = spawn_artifact_server(json!({})).await;
    provider.on_query(
        "p1",
        QueryBehavior::Completed(doc(json!({
            "AutoChapters": empty_artifact.clone(),
            "Summarization": empty_artifact.clone(),
            "Transcription": empty_artifact,
        }))),
    );

    let c_before = storage.get(&c.id).await.unwrap().unwrap();

    assert_eq!(pipeline.submit_pending().await.unwrap(), 1);
    assert_eq!(pipeline.poll_inflight().await.unwrap(), 1);

    let a_after = storage.get(&a.id).await.unwrap().unwrap();
    assert_eq!(a_after.status, TaskStatus::InFlight);
    assert_eq!(a_after.provider_task_id, "p2");

    let b_after = storage.get(&b.id).await.unwrap().unwrap();
    assert_eq!(b_after.status, TaskStatus::Completed);
    assert!(b_after.chapters.is_empty());
    assert!(b_after.summary.is_empty());
    assert!(b_after.transcript.is_empty());

    let c_after = storage.get(&c.id).await.unwrap().unwrap();
    assert_eq!(c_before, c_after);
}

#[tokio::test]
async fn test_sync_bucket_creates_and_refreshes() {
    let objects = vec![
        ObjectMeta {
            key: "meetings/standup.mp4".to_string(),
            size: 1024,
            last_modified: Utc::now(),
        },
        ObjectMeta {
            key: "meetings/review.mp4".to_string(),
            size: 4096,
            last_modified: Utc::now(),
        },
    ];
    let (storage, _provider, pipeline, _dir) =
        setup_pipeline(MockBlob::with_objects(objects)).await;

    let created = pipeline.sync_bucket().await.unwrap();
    assert_eq!(created, 2);

    let task = storage
        .get_by_key("meetings/standup.mp4")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.size, 1024);
    assert_eq!(task.region, "cn-hongkong");
}

#[tokio::test]
async fn test_sync_bucket_never_touches_lifecycle_fields() {
    let objects = vec![ObjectMeta {
        key: "meetings/standup.mp4".to_string(),
        size: 2048,
        last_modified: Utc::now(),
    }];
    let (storage, _provider, pipeline, _dir) =
        setup_pipeline(MockBlob::with_objects(objects)).await;

    let task = inflight_task("meetings/standup.mp4", "p1");
    storage.upsert(&task).await.unwrap();

    let created = pipeline.sync_bucket().await.unwrap();
    assert_eq!(created, 0);

    let after = storage.get(&task.id).await.unwrap().unwrap();
    assert_eq!(after.size, 2048);
    assert_eq!(after.status, TaskStatus::InFlight);
    assert_eq!(after.provider_task_id, "p1");
}

#[tokio::test]
async fn test_resubmit_resets_failed_task() {
    let (storage, _provider, pipeline, _dir) = setup_pipeline(MockBlob::empty()).await;
    let mut task = inflight_task("meetings/standup.mp4", "p1");
    task.status = TaskStatus::Failed;
    task.result_payload = doc(json!({"error": PROVIDER_FAILED_MARKER}));
    storage.upsert(&task).await.unwrap();

    let reset = pipeline.resubmit("meetings/standup.mp4").await.unwrap();
    assert_eq!(reset.status, TaskStatus::Pending);
    assert_eq!(reset.provider_task_id, "");
    assert!(reset.result_payload.is_empty());
}

#[tokio::test]
async fn test_resubmit_rejects_non_failed_task() {
    let (storage, _provider, pipeline, _dir) = setup_pipeline(MockBlob::empty()).await;
    storage
        .upsert(&pending_task("meetings/standup.mp4"))
        .await
        .unwrap();

    assert!(pipeline.resubmit("meetings/standup.mp4").await.is_err());
    assert!(pipeline.resubmit("meetings/missing.mp4").await.is_err());
}

#[tokio::test]
async fn test_scheduler_keeps_ticking_after_errors() {
    let storage = Arc::new(FailingStorage::default());
    let pipeline = Pipeline::new(
        storage.clone(),
        Arc::new(MockBlob::empty()),
        Arc::new(MockProvider::default()),
        "cn-hongkong".to_string(),
    );
    let scheduler = Scheduler::new(Arc::new(pipeline))
        .with_interval(Duration::from_millis(10))
        .with_error_backoff(Duration::from_millis(10));

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        scheduler.run(rx).await;
    });

    tokio::time::sleep(Duration::from_millis(100)).await;

    // Every tick errors out in storage; the loop must back off and retry,
    // not exit.
    assert!(storage.status_list_count() >= 2);
    assert!(!handle.is_finished());

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("scheduler did not stop after shutdown signal")
        .unwrap();
}

#[tokio::test]
async fn test_scheduler_stops_on_shutdown() {
    let (_storage, _provider, pipeline, _dir) = setup_pipeline(MockBlob::empty()).await;
    let scheduler = Scheduler::new(Arc::new(pipeline))
        .with_interval(Duration::from_millis(10))
        .with_error_backoff(Duration::from_millis(10));

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        scheduler.run(rx).await;
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("scheduler did not stop after shutdown signal")
        .unwrap();
}
