//! Client for the schedule-analysis portal.
//!
//! Two independent flows share only [`http::ApiClient`] and the durable
//! [`session::TokenStorage`]:
//!
//! - [`jobs`]: upload a file, then poll the job until it completes or fails.
//! - [`session`]: token persistence, startup verification, login/logout/refresh
//!   and the role checks behind [`session::RouteGuard`].

pub mod config;
pub mod error;
pub mod http;
pub mod jobs;
pub mod session;

#[cfg(test)]
mod test_support;

pub use config::ClientSettings;
pub use error::{ClientError, ClientResult};
pub use http::ApiClient;
pub use jobs::{JobPoller, JobRecord, JobStatus, JobWorkflow, PollHandle, SelectedFile};
pub use session::{
    AccessRequirement, GuardDecision, RouteGuard, SessionSnapshot, SessionState, SessionStore,
};
