//! `job_requests` collection endpoints

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use tracing::info;

use mc_common::{Collection, JobRequest, JobRequests, NewJobRequest, RecordId};

use crate::error::PlatformError;
use crate::hooks::HookRegistry;
use crate::store::RecordStore;

pub const JOB_REQUESTS_PATH: &str = "/api/collections/job_requests/records";

/// Records service state
#[derive(Clone)]
pub struct RecordsState {
    pub store: Arc<dyn RecordStore>,
    pub hooks: Arc<HookRegistry>,
}

/// Create a job request.
///
/// The response reflects only the store's outcome; hooks run after the
/// record is committed and cannot change it.
pub async fn create_job_request(
    State(state): State<RecordsState>,
    Json(req): Json<NewJobRequest>,
) -> Result<Json<JobRequest>, PlatformError> {
    let record = state.store.create_job_request(req).await?;
    info!(collection = JobRequests::NAME, record_id = %record.id, "Record created");

    state.hooks.emit_created::<JobRequests>(&record);

    Ok(Json(record))
}

/// Get a job request by ID
pub async fn get_job_request(
    State(state): State<RecordsState>,
    Path(id): Path<String>,
) -> Result<Json<JobRequest>, PlatformError> {
    let record_id = RecordId::from(id);
    let record = state
        .store
        .get_job_request(&record_id)
        .await?
        .ok_or_else(|| PlatformError::not_found(JobRequests::NAME, record_id.as_str()))?;

    Ok(Json(record))
}

pub fn job_requests_router(state: RecordsState) -> Router {
    Router::new()
        .route("/", post(create_job_request))
        .route("/:id", get(get_job_request))
        .with_state(state)
}
