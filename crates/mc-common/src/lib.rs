use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

// ============================================================================
// Record Identifiers
// ============================================================================

const RECORD_ID_LEN: usize = 15;
const RECORD_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Identifier of a stored record: 15 lowercase alphanumeric characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let id = (0..RECORD_ID_LEN)
            .map(|_| RECORD_ID_ALPHABET[rng.gen_range(0..RECORD_ID_ALPHABET.len())] as char)
            .collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Collections
// ============================================================================

/// Marker type naming a record collection.
///
/// Hooks are registered against the marker type rather than the collection
/// name, so a subscription can only ever receive the record type the
/// collection actually stores.
pub trait Collection: Send + Sync + 'static {
    const NAME: &'static str;
    type Record: Clone + Send + Sync + 'static;
}

/// The `job_requests` collection: one record per flashcard generation request.
pub struct JobRequests;

impl Collection for JobRequests {
    const NAME: &'static str = "job_requests";
    type Record = JobRequest;
}

/// The `_superusers` collection of privileged accounts.
pub struct Superusers;

impl Collection for Superusers {
    const NAME: &'static str = "_superusers";
    type Record = Superuser;
}

/// Observer for records committed to collection `C`.
///
/// Runs on the request path after the record is durable, so implementations
/// must return without waiting on I/O.
pub trait RecordCreatedHook<C: Collection>: Send + Sync {
    fn on_created(&self, record: &C::Record);
}

// ============================================================================
// Records
// ============================================================================

pub const DEFAULT_JOB_STATUS: &str = "Queued";

/// A request to generate flashcards from an uploaded PDF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub id: RecordId,
    pub user: String,
    pub source_pdf: String,
    pub status: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// Fields a client supplies when creating a [`JobRequest`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewJobRequest {
    pub user: String,
    pub source_pdf: String,
    #[serde(default)]
    pub status: Option<String>,
}

impl NewJobRequest {
    pub fn new(user: impl Into<String>, source_pdf: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            source_pdf: source_pdf.into(),
            status: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.user.trim().is_empty() {
            return Err(MemcardError::Validation("user is required".to_string()));
        }
        if self.source_pdf.trim().is_empty() {
            return Err(MemcardError::Validation("source_pdf is required".to_string()));
        }
        Ok(())
    }

    /// Build the stored record, assigning an id and timestamps.
    pub fn into_record(self, id: RecordId, now: DateTime<Utc>) -> JobRequest {
        JobRequest {
            id,
            user: self.user,
            source_pdf: self.source_pdf,
            status: self
                .status
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_JOB_STATUS.to_string()),
            created: now,
            updated: now,
        }
    }
}

/// A privileged account. The password is only ever held as a hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Superuser {
    pub id: RecordId,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created: DateTime<Utc>,
}

// ============================================================================
// Dispatch Payload
// ============================================================================

/// Body sent to the job-processing API for a newly created job request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchPayload {
    pub generate_flashcards_job_id: String,
}

impl DispatchPayload {
    pub fn for_record(id: &RecordId) -> Self {
        Self {
            generate_flashcards_job_id: id.as_str().to_string(),
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum MemcardError {
    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, MemcardError>;
