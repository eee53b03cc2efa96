use mc_common::{Collection, JobRequest, JobRequests, RecordCreatedHook};
use tracing::info;

use crate::pool::DispatchHandle;

/// Hands every new job request to the dispatch pool.
///
/// Runs after the record is committed and returns as soon as the dispatch is
/// queued (or dropped), so a slow or failing job API never reaches the
/// request that created the record.
pub struct JobRequestDispatchHook {
    dispatch: DispatchHandle,
}

impl JobRequestDispatchHook {
    pub fn new(dispatch: DispatchHandle) -> Self {
        Self { dispatch }
    }
}

impl RecordCreatedHook<JobRequests> for JobRequestDispatchHook {
    fn on_created(&self, record: &JobRequest) {
        info!(
            collection = JobRequests::NAME,
            record_id = %record.id,
            "Hook triggered for 'job_requests' collection"
        );
        self.dispatch.submit(record.id.clone());
    }
}
