use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tracing::{debug, info, warn};

use crate::{
    http::{ApiClient, JobStatusResponse, JobSubmission},
    jobs::JobStatus,
};

/// Fixed delay between status checks. There is no backoff.
pub const POLL_INTERVAL: Duration = Duration::from_millis(3000);
const DEFAULT_FAILURE_MESSAGE: &str = "Job failed";

/// Client-side view of one analysis job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub id: String,
    pub status: JobStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    /// Sequence number of the last poll response applied to this record.
    pub sequence: u64,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(id: impl Into<String>, status: JobStatus) -> Self {
        Self {
            id: id.into(),
            status,
            result: None,
            error: None,
            sequence: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn from_submission(submission: &JobSubmission) -> Self {
        Self::new(submission.job_id.clone(), submission.status.clone())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn begin_processing(&mut self) -> bool {
        if self.status == JobStatus::Processing || self.is_terminal() {
            return false;
        }
        self.status = JobStatus::Processing;
        self.updated_at = Utc::now();
        true
    }

    /// Apply a poll response. Returns whether the record changed.
    ///
    /// Terminal records are frozen, stale sequence numbers are dropped, and
    /// non-terminal reports never move the status backwards.
    pub fn apply(&mut self, sequence: u64, response: JobStatusResponse) -> bool {
        if self.is_terminal() || sequence <= self.sequence {
            return false;
        }
        self.sequence = sequence;

        match response.status {
            JobStatus::Completed => {
                self.status = JobStatus::Completed;
                self.result = Some(response.result.unwrap_or(Value::Null));
                self.error = None;
            }
            JobStatus::Failed => {
                self.status = JobStatus::Failed;
                self.error = Some(
                    response
                        .error
                        .filter(|e| !e.trim().is_empty())
                        .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string()),
                );
                self.result = None;
            }
            _ => {
                if self.status == JobStatus::Processing {
                    return false;
                }
                self.status = JobStatus::Processing;
            }
        }
        self.updated_at = Utc::now();
        true
    }

    /// Record a poll that could not be completed.
    pub fn fail(&mut self, sequence: u64, message: impl Into<String>) -> bool {
        if self.is_terminal() || sequence <= self.sequence {
            return false;
        }
        self.sequence = sequence;
        self.status = JobStatus::Failed;
        self.error = Some(message.into());
        self.result = None;
        self.updated_at = Utc::now();
        true
    }
}

/// Starts interval-driven status polling for submitted jobs.
#[derive(Clone)]
pub struct JobPoller {
    api: ApiClient,
    interval: Duration,
}

impl JobPoller {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            interval: POLL_INTERVAL,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Begin polling `record`. Terminal records are returned as-is with no task.
    pub fn start(&self, mut record: JobRecord) -> PollHandle {
        let job_id = record.id.clone();
        if record.is_terminal() {
            let (_tx, rx) = watch::channel(record);
            return PollHandle {
                job_id,
                updates: rx,
                task: None,
            };
        }

        record.begin_processing();
        let (tx, rx) = watch::channel(record);
        let task = tokio::spawn(poll_loop(
            self.api.clone(),
            job_id.clone(),
            self.interval,
            tx,
        ));
        debug!(job_id = %job_id, interval_ms = self.interval.as_millis() as u64, "polling started");

        PollHandle {
            job_id,
            updates: rx,
            task: Some(task),
        }
    }
}

async fn poll_loop(
    api: ApiClient,
    job_id: String,
    period: Duration,
    updates: watch::Sender<JobRecord>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sequence: u64 = 0;

    loop {
        ticker.tick().await;
        sequence += 1;

        let outcome = api.job_status(&job_id).await;
        let mut finished = false;
        updates.send_modify(|record| {
            match outcome {
                Ok(response) => {
                    record.apply(sequence, response);
                }
                Err(err) => {
                    warn!(job_id = %job_id, error = %err, "status check failed");
                    record.fail(sequence, err.to_string());
                }
            }
            finished = record.is_terminal();
        });

        if finished {
            let record = updates.borrow();
            info!(job_id = %job_id, status = %record.status, polls = sequence, "polling finished");
            break;
        }
    }
}

/// Owner-side handle for one polling task.
///
/// Dropping the handle stops polling.
pub struct PollHandle {
    job_id: String,
    updates: watch::Receiver<JobRecord>,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn subscribe(&self) -> watch::Receiver<JobRecord> {
        self.updates.clone()
    }

    pub fn current(&self) -> JobRecord {
        self.updates.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Resolve once the job reaches a terminal status, or polling is cancelled.
    pub async fn wait(&self) -> JobRecord {
        let mut rx = self.updates.clone();
        if let Ok(record) = rx.wait_for(JobRecord::is_terminal).await {
            return record.clone();
        }
        rx.borrow().clone()
    }

    /// Stop polling. No status request is issued after this returns.
    pub async fn cancel(&mut self) -> JobRecord {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
            debug!(job_id = %self.job_id, "polling cancelled");
        }
        self.current()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
