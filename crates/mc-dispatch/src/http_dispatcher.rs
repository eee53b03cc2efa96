//! HTTP trigger for the job-processing API
//!
//! Posts `{"generate_flashcards_job_id": "<id>"}` to
//! `{INTERNAL_API_URL}/generate-flashcards-job`. Only 200 and 202 count as
//! accepted; the API answers with `{"message", "workflow_id"}` which is read
//! when present.

use std::time::Duration;

use async_trait::async_trait;
use mc_common::DispatchPayload;
use mc_config::DispatchConfig;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::debug;

use crate::error::{DispatchError, Result};

pub const GENERATE_FLASHCARDS_PATH: &str = "/generate-flashcards-job";

/// Build the trigger endpoint. The base is used verbatim.
pub fn endpoint_url(internal_api_url: &str) -> String {
    format!("{}{}", internal_api_url, GENERATE_FLASHCARDS_PATH)
}

/// Body returned by the job API on acceptance
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TriggerResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub workflow_id: Option<String>,
}

/// An accepted trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerAccepted {
    pub status: u16,
    pub response: TriggerResponse,
}

/// Starts downstream processing for a job request
#[async_trait]
pub trait JobTrigger: Send + Sync {
    async fn trigger(&self, payload: &DispatchPayload) -> Result<TriggerAccepted>;
}

/// reqwest-backed trigger
pub struct HttpJobTrigger {
    endpoint: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpJobTrigger {
    pub fn new(config: &DispatchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            endpoint: endpoint_url(&config.internal_api_url),
            timeout: config.timeout(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl JobTrigger for HttpJobTrigger {
    async fn trigger(&self, payload: &DispatchPayload) -> Result<TriggerAccepted> {
        let body = serde_json::to_vec(payload)?;
        debug!(endpoint = %self.endpoint, job_id = %payload.generate_flashcards_job_id, "Posting job trigger");

        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status().as_u16();
        match status {
            200 | 202 => {
                // Acceptance does not depend on the body.
                let bytes = response.bytes().await.unwrap_or_default();
                let response = serde_json::from_slice::<TriggerResponse>(&bytes).unwrap_or_default();
                Ok(TriggerAccepted { status, response })
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(DispatchError::RemoteRejection { status, body })
            }
        }
    }
}

impl HttpJobTrigger {
    fn classify(&self, error: reqwest::Error) -> DispatchError {
        if error.is_timeout() {
            DispatchError::Timeout(self.timeout)
        } else {
            DispatchError::Transport(error)
        }
    }
}
