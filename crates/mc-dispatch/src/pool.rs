//! DispatchPool - bounded background delivery of job triggers
//!
//! - Submissions go into a bounded queue and never wait; a full queue drops
//!   the dispatch with a warning
//! - A semaphore caps concurrent outbound requests
//! - Each attempt is bounded by the configured timeout
//! - Every outcome is logged with the record id, counted, and broadcast to
//!   subscribers

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mc_common::{DispatchPayload, RecordId};
use mc_config::DispatchConfig;
use metrics::counter;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::DispatchError;
use crate::http_dispatcher::JobTrigger;

const OUTCOME_CHANNEL_CAPACITY: usize = 1024;

pub const DISPATCH_METRIC: &str = "mc_dispatch_total";

/// Result of one dispatch attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The job API answered 200 or 202
    Success {
        status: u16,
        workflow_id: Option<String>,
    },
    /// Any other HTTP status
    Rejected { status: u16 },
    Transport,
    Timeout,
    Serialization,
    /// Never attempted: queue full or dispatcher stopped
    Dropped,
}

impl DispatchOutcome {
    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            DispatchOutcome::Success { .. } => "success",
            DispatchOutcome::Rejected { .. } => "rejected",
            DispatchOutcome::Transport => "transport",
            DispatchOutcome::Timeout => "timeout",
            DispatchOutcome::Serialization => "serialization",
            DispatchOutcome::Dropped => "dropped",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Success { .. })
    }
}

impl From<&DispatchError> for DispatchOutcome {
    fn from(error: &DispatchError) -> Self {
        match error {
            DispatchError::Serialization(_) => DispatchOutcome::Serialization,
            DispatchError::Transport(_) => DispatchOutcome::Transport,
            DispatchError::Timeout(_) => DispatchOutcome::Timeout,
            DispatchError::RemoteRejection { status, .. } => DispatchOutcome::Rejected { status: *status },
        }
    }
}

/// Outcome for a specific record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub record_id: RecordId,
    pub outcome: DispatchOutcome,
}

fn report(outcomes: &broadcast::Sender<DispatchReport>, record_id: RecordId, outcome: DispatchOutcome) {
    counter!(DISPATCH_METRIC, "outcome" => outcome.label()).increment(1);
    // No subscribers is normal outside tests.
    let _ = outcomes.send(DispatchReport { record_id, outcome });
}

/// Cheap, cloneable submission side of the pool
#[derive(Clone)]
pub struct DispatchHandle {
    tx: mpsc::Sender<RecordId>,
    accepting: Arc<AtomicBool>,
    outcomes: broadcast::Sender<DispatchReport>,
}

impl DispatchHandle {
    /// Enqueue a dispatch without waiting. Returns false if it was dropped.
    pub fn submit(&self, record_id: RecordId) -> bool {
        if !self.accepting.load(Ordering::SeqCst) {
            warn!(record_id = %record_id, "Dispatcher is shutting down, dropping dispatch");
            report(&self.outcomes, record_id, DispatchOutcome::Dropped);
            return false;
        }

        match self.tx.try_send(record_id) {
            Ok(()) => true,
            Err(TrySendError::Full(record_id)) => {
                warn!(record_id = %record_id, "Dispatch queue full, dropping dispatch");
                report(&self.outcomes, record_id, DispatchOutcome::Dropped);
                false
            }
            Err(TrySendError::Closed(record_id)) => {
                warn!(record_id = %record_id, "Dispatcher stopped, dropping dispatch");
                report(&self.outcomes, record_id, DispatchOutcome::Dropped);
                false
            }
        }
    }
}

/// Background pool delivering job triggers.
///
/// Dropping the pool without calling [`DispatchPool::shutdown`] stops the
/// dispatcher loop as well.
pub struct DispatchPool {
    handle: DispatchHandle,
    semaphore: Arc<Semaphore>,
    workers: usize,
    shutdown_tx: broadcast::Sender<()>,
    dispatcher: JoinHandle<()>,
}

impl DispatchPool {
    /// Spawn the dispatcher loop. Must be called inside a Tokio runtime.
    pub fn start(config: &DispatchConfig, trigger: Arc<dyn JobTrigger>) -> Self {
        let workers = config.workers.max(1);
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let (outcomes, _) = broadcast::channel(OUTCOME_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let semaphore = Arc::new(Semaphore::new(workers));

        let dispatcher = tokio::spawn(run_dispatcher(
            rx,
            shutdown_rx,
            semaphore.clone(),
            trigger,
            config.timeout(),
            outcomes.clone(),
        ));

        info!(
            workers,
            queue_capacity = config.queue_capacity,
            timeout_secs = config.timeout_secs,
            "Dispatch pool started"
        );

        Self {
            handle: DispatchHandle {
                tx,
                accepting: Arc::new(AtomicBool::new(true)),
                outcomes,
            },
            semaphore,
            workers,
            shutdown_tx,
            dispatcher,
        }
    }

    pub fn handle(&self) -> DispatchHandle {
        self.handle.clone()
    }

    pub fn subscribe_outcomes(&self) -> broadcast::Receiver<DispatchReport> {
        self.handle.outcomes.subscribe()
    }

    /// Dispatches currently talking to the job API
    pub fn in_flight(&self) -> usize {
        self.workers - self.semaphore.available_permits()
    }

    /// Stop intake, drop anything still queued, and wait up to `grace` for
    /// in-flight dispatches. Returns true if they all finished.
    pub async fn shutdown(self, grace: Duration) -> bool {
        self.handle.accepting.store(false, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());

        if let Err(e) = self.dispatcher.await {
            error!(error = %e, "Dispatcher task failed");
        }

        let permits = self.workers as u32;
        match tokio::time::timeout(grace, self.semaphore.acquire_many(permits)).await {
            Ok(_) => {
                info!("Dispatch pool drained");
                true
            }
            Err(_) => {
                warn!(
                    in_flight = self.workers - self.semaphore.available_permits(),
                    "Dispatch pool shutdown grace expired with dispatches in flight"
                );
                false
            }
        }
    }
}

async fn run_dispatcher(
    mut rx: mpsc::Receiver<RecordId>,
    mut shutdown_rx: broadcast::Receiver<()>,
    semaphore: Arc<Semaphore>,
    trigger: Arc<dyn JobTrigger>,
    timeout: Duration,
    outcomes: broadcast::Sender<DispatchReport>,
) {
    loop {
        let record_id = tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            next = rx.recv() => match next {
                Some(record_id) => record_id,
                None => break,
            },
        };

        let permit = tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                warn!(record_id = %record_id, "Dispatcher stopping, dropping queued dispatch");
                report(&outcomes, record_id, DispatchOutcome::Dropped);
                break;
            }
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        debug!(record_id = %record_id, "Starting dispatch");
        tokio::spawn(dispatch_one(
            permit,
            trigger.clone(),
            record_id,
            timeout,
            outcomes.clone(),
        ));
    }

    rx.close();
    while let Ok(record_id) = rx.try_recv() {
        warn!(record_id = %record_id, "Dispatcher stopping, dropping queued dispatch");
        report(&outcomes, record_id, DispatchOutcome::Dropped);
    }
    debug!("Dispatcher loop exited");
}

async fn dispatch_one(
    _permit: OwnedSemaphorePermit,
    trigger: Arc<dyn JobTrigger>,
    record_id: RecordId,
    timeout: Duration,
    outcomes: broadcast::Sender<DispatchReport>,
) {
    let payload = DispatchPayload::for_record(&record_id);

    let outcome = match tokio::time::timeout(timeout, trigger.trigger(&payload)).await {
        Ok(Ok(accepted)) => {
            info!(
                record_id = %record_id,
                status = accepted.status,
                workflow_id = accepted.response.workflow_id.as_deref().unwrap_or(""),
                "Successfully triggered flashcard generation job"
            );
            DispatchOutcome::Success {
                status: accepted.status,
                workflow_id: accepted.response.workflow_id,
            }
        }
        Ok(Err(e)) => {
            error!(record_id = %record_id, error = %e, "Failed to trigger flashcard generation job");
            DispatchOutcome::from(&e)
        }
        Err(_) => {
            error!(record_id = %record_id, timeout = ?timeout, "Flashcard generation trigger timed out");
            DispatchOutcome::Timeout
        }
    };

    report(&outcomes, record_id, outcome);
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::http_dispatcher::{TriggerAccepted, TriggerResponse};

    struct AcceptAll;

    #[async_trait]
    impl JobTrigger for AcceptAll {
        async fn trigger(&self, payload: &DispatchPayload) -> crate::Result<TriggerAccepted> {
            Ok(TriggerAccepted {
                status: 202,
                response: TriggerResponse {
                    message: None,
                    workflow_id: Some(format!("generate-flashcards-job-{}", payload.generate_flashcards_job_id)),
                },
            })
        }
    }

    struct Hangs;

    #[async_trait]
    impl JobTrigger for Hangs {
        async fn trigger(&self, _payload: &DispatchPayload) -> crate::Result<TriggerAccepted> {
            std::future::pending().await
        }
    }

    fn config(workers: usize, queue_capacity: usize) -> DispatchConfig {
        DispatchConfig {
            internal_api_url: "http://unused".to_string(),
            workers,
            queue_capacity,
            timeout_secs: 1,
            connect_timeout_secs: 1,
        }
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(DispatchOutcome::Success { status: 202, workflow_id: None }.label(), "success");
        assert_eq!(DispatchOutcome::Rejected { status: 503 }.label(), "rejected");
        assert_eq!(DispatchOutcome::Dropped.label(), "dropped");
        assert!(!DispatchOutcome::Timeout.is_success());
    }

    #[test]
    fn test_outcome_from_error() {
        let err = DispatchError::RemoteRejection { status: 500, body: String::new() };
        assert_eq!(DispatchOutcome::from(&err), DispatchOutcome::Rejected { status: 500 });
        let err = DispatchError::Timeout(Duration::from_secs(1));
        assert_eq!(DispatchOutcome::from(&err), DispatchOutcome::Timeout);
    }

    #[tokio::test]
    async fn test_submit_reports_success() {
        let pool = DispatchPool::start(&config(2, 8), Arc::new(AcceptAll));
        let mut outcomes = pool.subscribe_outcomes();

        assert!(pool.handle().submit(RecordId::from("abc123")));
        let report = tokio::time::timeout(Duration::from_secs(5), outcomes.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.record_id, RecordId::from("abc123"));
        assert_eq!(
            report.outcome,
            DispatchOutcome::Success {
                status: 202,
                workflow_id: Some("generate-flashcards-job-abc123".to_string()),
            }
        );
        assert!(pool.shutdown(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_attempt_timeout() {
        let pool = DispatchPool::start(&config(1, 8), Arc::new(Hangs));
        let mut outcomes = pool.subscribe_outcomes();

        pool.handle().submit(RecordId::from("slow1"));
        let report = tokio::time::timeout(Duration::from_secs(5), outcomes.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.outcome, DispatchOutcome::Timeout);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_dropped() {
        let pool = DispatchPool::start(&config(1, 8), Arc::new(AcceptAll));
        let handle = pool.handle();
        let mut outcomes = pool.subscribe_outcomes();

        assert!(pool.shutdown(Duration::from_secs(1)).await);
        assert!(!handle.submit(RecordId::from("late1")));

        let report = outcomes.recv().await.unwrap();
        assert_eq!(report.outcome, DispatchOutcome::Dropped);
    }

    #[tokio::test]
    async fn test_shutdown_grace_expires_with_hung_dispatch() {
        let mut cfg = config(1, 8);
        cfg.timeout_secs = 60;
        let pool = DispatchPool::start(&cfg, Arc::new(Hangs));

        pool.handle().submit(RecordId::from("hung1"));
        for _ in 0..50 {
            if pool.in_flight() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(pool.in_flight(), 1);
        assert!(!pool.shutdown(Duration::from_millis(50)).await);
    }
}
