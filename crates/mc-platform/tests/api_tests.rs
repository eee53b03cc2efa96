//! Record API Tests

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use http_body_util::BodyExt;
use parking_lot::Mutex;
use tower::ServiceExt;

use mc_common::{JobRequest, JobRequests, NewJobRequest, RecordCreatedHook, RecordId, Superuser};
use mc_platform::api::{api_router, RecordsState, JOB_REQUESTS_PATH};
use mc_platform::{HookRegistry, InMemoryStore, PlatformError, RecordStore};

#[derive(Default)]
struct RecordingHook {
    seen: Mutex<Vec<RecordId>>,
}

impl RecordCreatedHook<JobRequests> for RecordingHook {
    fn on_created(&self, record: &JobRequest) {
        self.seen.lock().push(record.id.clone());
    }
}

/// Store whose writes always fail
struct BrokenStore;

#[async_trait]
impl RecordStore for BrokenStore {
    async fn create_superuser(&self, _email: &str, _password: &str) -> Result<Superuser, PlatformError> {
        Err(PlatformError::internal("store offline"))
    }

    async fn find_superuser_by_email(&self, _email: &str) -> Result<Option<Superuser>, PlatformError> {
        Ok(None)
    }

    async fn count_superusers(&self) -> Result<u64, PlatformError> {
        Ok(0)
    }

    async fn create_job_request(&self, _new: NewJobRequest) -> Result<JobRequest, PlatformError> {
        Err(PlatformError::internal("store offline"))
    }

    async fn get_job_request(&self, _id: &RecordId) -> Result<Option<JobRequest>, PlatformError> {
        Ok(None)
    }
}

fn create_test_app(store: Arc<dyn RecordStore>) -> (axum::Router, Arc<RecordingHook>) {
    let hook = Arc::new(RecordingHook::default());
    let mut hooks = HookRegistry::new();
    hooks.on_record_created::<JobRequests>(hook.clone());

    let app = api_router(RecordsState {
        store,
        hooks: Arc::new(hooks),
    });
    (app, hook)
}

fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(body: Body) -> serde_json::Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _) = create_test_app(Arc::new(InMemoryStore::new()));

    let response = app
        .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["status"], "UP");
}

#[tokio::test]
async fn test_create_job_request_fires_hook() {
    let store = Arc::new(InMemoryStore::new());
    let (app, hook) = create_test_app(store.clone());

    let response = app
        .oneshot(json_post(
            JOB_REQUESTS_PATH,
            serde_json::json!({"user": "user1", "source_pdf": "pdf1", "status": "Queued"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response.into_body()).await;
    let id = json["id"].as_str().unwrap().to_string();
    assert_eq!(json["user"], "user1");
    assert_eq!(json["status"], "Queued");

    assert_eq!(*hook.seen.lock(), vec![RecordId::from(id)]);
    assert_eq!(store.job_request_count(), 1);
}

#[tokio::test]
async fn test_invalid_job_request_skips_hook() {
    let (app, hook) = create_test_app(Arc::new(InMemoryStore::new()));

    let response = app
        .oneshot(json_post(
            JOB_REQUESTS_PATH,
            serde_json::json!({"user": "", "source_pdf": "pdf1"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["error"], "VALIDATION_ERROR");
    assert!(hook.seen.lock().is_empty());
}

#[tokio::test]
async fn test_store_failure_skips_hook() {
    let (app, hook) = create_test_app(Arc::new(BrokenStore));

    let response = app
        .oneshot(json_post(
            JOB_REQUESTS_PATH,
            serde_json::json!({"user": "user1", "source_pdf": "pdf1"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(hook.seen.lock().is_empty());
}

#[tokio::test]
async fn test_get_job_request() {
    let store = Arc::new(InMemoryStore::new());
    let record = store
        .create_job_request(NewJobRequest::new("user1", "pdf1"))
        .await
        .unwrap();
    let (app, _) = create_test_app(store);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("{}/{}", JOB_REQUESTS_PATH, record.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["id"], record.id.as_str());

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("{}/missing", JOB_REQUESTS_PATH))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["error"], "NOT_FOUND");
}
