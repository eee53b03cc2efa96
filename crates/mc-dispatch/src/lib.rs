//! Memcard Dispatch
//!
//! Notifies the job-processing API whenever a `job_requests` record is
//! created. Delivery happens in a bounded background pool; failures are
//! logged and counted, never retried, and never surface to the creator of
//! the record.

pub mod error;
pub mod hook;
pub mod http_dispatcher;
pub mod pool;

pub use error::{DispatchError, Result};
pub use hook::JobRequestDispatchHook;
pub use http_dispatcher::{
    endpoint_url, HttpJobTrigger, JobTrigger, TriggerAccepted, TriggerResponse,
    GENERATE_FLASHCARDS_PATH,
};
pub use pool::{DispatchHandle, DispatchOutcome, DispatchPool, DispatchReport, DISPATCH_METRIC};
