use std::path::Path;

use tokio::sync::watch;
use tracing::info;

use crate::{
    error::ClientResult,
    http::ApiClient,
    jobs::{
        poller::{JobPoller, JobRecord, PollHandle},
        upload::{SelectedFile, submit},
    },
};

/// Upload form state: the selected file and the single job being tracked.
///
/// At most one poller is alive at any time. Dropping the workflow stops it.
pub struct JobWorkflow {
    api: ApiClient,
    poller: JobPoller,
    selected: Option<SelectedFile>,
    active: Option<PollHandle>,
}

impl JobWorkflow {
    pub fn new(api: ApiClient) -> Self {
        let poller = JobPoller::new(api.clone());
        Self::with_poller(api, poller)
    }

    pub(crate) fn with_poller(api: ApiClient, poller: JobPoller) -> Self {
        Self {
            api,
            poller,
            selected: None,
            active: None,
        }
    }

    pub async fn select_file(&mut self, path: impl AsRef<Path>) -> ClientResult<&SelectedFile> {
        let file = SelectedFile::from_path(path).await?;
        Ok(self.selected.insert(file))
    }

    pub fn select_bytes(&mut self, file_name: &str, bytes: Vec<u8>) -> &SelectedFile {
        self.selected.insert(SelectedFile::from_bytes(file_name, bytes))
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn selected(&self) -> Option<&SelectedFile> {
        self.selected.as_ref()
    }

    /// Submit the selected file and start tracking the new job.
    ///
    /// Any job already being polled is cancelled first, even when the new
    /// submission then fails.
    pub async fn submit(&mut self) -> ClientResult<watch::Receiver<JobRecord>> {
        self.cancel().await;

        let submission = submit(&self.api, self.selected.as_ref()).await?;
        let handle = self.poller.start(JobRecord::from_submission(&submission));
        let updates = handle.subscribe();
        self.active = Some(handle);
        Ok(updates)
    }

    /// Stop tracking the current job, if any.
    pub async fn cancel(&mut self) -> Option<JobRecord> {
        let mut handle = self.active.take()?;
        let record = handle.cancel().await;
        info!(job_id = %record.id, status = %record.status, "stopped tracking job");
        Some(record)
    }

    pub fn active_job(&self) -> Option<JobRecord> {
        self.active.as_ref().map(PollHandle::current)
    }

    pub fn is_polling(&self) -> bool {
        self.active.as_ref().is_some_and(PollHandle::is_active)
    }

    /// Wait for the tracked job to finish.
    pub async fn wait(&self) -> Option<JobRecord> {
        match &self.active {
            Some(handle) => Some(handle.wait().await),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::jobs::JobStatus;
    use crate::test_support::{CallCounter, MockBackend};
    use axum::{
        Json, Router,
        extract::Path as AxumPath,
        routing::{get, post},
    };
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
        time::Duration,
    };
    use tokio::time::sleep;

    const FAST: Duration = Duration::from_millis(20);

    #[derive(Clone, Default)]
    struct Tracker {
        polls: Arc<Mutex<HashMap<String, usize>>>,
        uploads: CallCounter,
    }

    impl Tracker {
        fn polls_for(&self, job_id: &str) -> usize {
            self.polls
                .lock()
                .expect("lock")
                .get(job_id)
                .copied()
                .unwrap_or(0)
        }
    }

    async fn backend(tracker: Tracker) -> MockBackend {
        let uploads = tracker.uploads.clone();
        let polls = tracker.polls.clone();
        let router = Router::new()
            .route(
                "/api/v1/schedule/analyze",
                post(move || {
                    let uploads = uploads.clone();
                    async move {
                        uploads.hit();
                        let job_id = format!("job-{}", uuid::Uuid::new_v4());
                        Json(serde_json::json!({ "job_id": job_id, "status": "submitted" }))
                    }
                }),
            )
            .route(
                "/api/v1/schedule/status/:id",
                get(move |AxumPath(id): AxumPath<String>| {
                    let polls = polls.clone();
                    async move {
                        *polls.lock().expect("lock").entry(id).or_insert(0) += 1;
                        Json(serde_json::json!({ "status": "processing" }))
                    }
                }),
            );
        MockBackend::spawn(router).await
    }

    fn workflow(backend: &MockBackend) -> JobWorkflow {
        let api = backend.client();
        let poller = JobPoller::new(api.clone()).with_interval(FAST);
        JobWorkflow::with_poller(api, poller)
    }

    #[tokio::test]
    async fn submit_without_selection_is_rejected() {
        let tracker = Tracker::default();
        let backend = backend(tracker.clone()).await;
        let mut workflow = workflow(&backend);

        let err = workflow.submit().await.expect_err("no file");
        assert_eq!(err, ClientError::validation("Please select a file"));
        assert_eq!(tracker.uploads.count(), 0);
        assert!(workflow.active_job().is_none());
    }

    #[tokio::test]
    async fn new_submission_replaces_previous_poller() {
        let tracker = Tracker::default();
        let backend = backend(tracker.clone()).await;
        let mut workflow = workflow(&backend);
        workflow.select_bytes("plan.csv", b"a,b\n".to_vec());

        let first = workflow.submit().await.expect("first submit");
        let first_id = first.borrow().id.clone();
        assert_eq!(first.borrow().status, JobStatus::Processing);
        sleep(FAST * 3).await;

        let second = workflow.submit().await.expect("second submit");
        let second_id = second.borrow().id.clone();
        assert_ne!(first_id, second_id);

        sleep(FAST * 2).await;
        let first_polls = tracker.polls_for(&first_id);
        sleep(FAST * 5).await;
        assert_eq!(tracker.polls_for(&first_id), first_polls);
        assert!(tracker.polls_for(&second_id) >= 1);
        assert_eq!(workflow.active_job().map(|job| job.id), Some(second_id));
        assert_eq!(tracker.uploads.count(), 2);
    }

    #[tokio::test]
    async fn failed_resubmission_still_cancels_prior_job() {
        let tracker = Tracker::default();
        let backend = backend(tracker.clone()).await;
        let mut workflow = workflow(&backend);
        workflow.select_bytes("plan.csv", b"a,b\n".to_vec());

        let first = workflow.submit().await.expect("submit");
        let first_id = first.borrow().id.clone();

        workflow.clear_selection();
        workflow.submit().await.expect_err("nothing selected");
        assert!(!workflow.is_polling());

        sleep(FAST * 2).await;
        let polls = tracker.polls_for(&first_id);
        sleep(FAST * 5).await;
        assert_eq!(tracker.polls_for(&first_id), polls);
    }

    #[tokio::test]
    async fn dropping_workflow_stops_polling() {
        let tracker = Tracker::default();
        let backend = backend(tracker.clone()).await;
        let mut workflow = workflow(&backend);
        workflow.select_bytes("plan.csv", b"a,b\n".to_vec());

        let updates = workflow.submit().await.expect("submit");
        let job_id = updates.borrow().id.clone();
        drop(workflow);

        sleep(FAST * 5).await;
        assert_eq!(tracker.polls_for(&job_id), 0);
    }

    #[tokio::test]
    async fn dropping_workflow_mid_job_stops_polling() {
        let tracker = Tracker::default();
        let backend = backend(tracker.clone()).await;
        let mut workflow = workflow(&backend);
        workflow.select_bytes("plan.csv", b"a,b\n".to_vec());

        let updates = workflow.submit().await.expect("submit");
        let job_id = updates.borrow().id.clone();
        while tracker.polls_for(&job_id) < 2 {
            sleep(FAST / 2).await;
        }
        drop(workflow);

        sleep(FAST * 2).await;
        let seen = tracker.polls_for(&job_id);
        sleep(FAST * 5).await;
        assert_eq!(tracker.polls_for(&job_id), seen);
    }
}
