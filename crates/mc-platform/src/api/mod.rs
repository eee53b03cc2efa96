//! Record API
//!
//! The minimal HTTP surface clients use to create job requests. Record
//! creation is where `job_requests` hooks fire.

pub mod common;
pub mod records;

use axum::{routing::get, Json, Router};

pub use common::ApiError;
pub use records::{job_requests_router, RecordsState, JOB_REQUESTS_PATH};

/// Full record API: `/api/health` plus the `job_requests` collection
pub fn api_router(state: RecordsState) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .nest(JOB_REQUESTS_PATH, job_requests_router(state))
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "UP",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
