pub mod poller;
pub mod status;
pub mod upload;
pub mod workflow;

pub use poller::{JobPoller, JobRecord, POLL_INTERVAL, PollHandle};
pub use status::JobStatus;
pub use upload::{NO_FILE_SELECTED, SelectedFile, submit};
pub use workflow::JobWorkflow;
