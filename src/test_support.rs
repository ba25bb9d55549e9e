//! In-process fake backend used by the unit tests.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::Router;
use tokio::{net::TcpListener, task::JoinHandle};

use crate::{http::ApiClient, session::models::UserProfile};

pub struct MockBackend {
    addr: SocketAddr,
    server: JoinHandle<()>,
}

impl MockBackend {
    pub async fn spawn(router: Router) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock backend");
        let addr = listener.local_addr().expect("local addr");
        let server = tokio::spawn(async move {
            axum::serve(listener, router).await.expect("mock backend");
        });
        Self { addr, server }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn client(&self) -> ApiClient {
        ApiClient::new(self.base_url(), Duration::from_secs(5)).expect("api client")
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Shared request counter handed to mock handlers.
#[derive(Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn hit(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn profile(role: &str, permissions: &[&str]) -> UserProfile {
    UserProfile {
        id: "user-1".into(),
        name: "Ada Planner".into(),
        email: "ada@example.com".into(),
        role: role.into(),
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
    }
}
