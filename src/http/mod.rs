pub mod responses;

use std::{sync::Arc, time::Duration};

use reqwest::{Client, RequestBuilder, multipart};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

pub use responses::{ApiMessage, JobStatusResponse, JobSubmission, error_message};

use crate::{
    config::ClientSettings,
    error::{ClientError, ClientResult},
    jobs::SelectedFile,
    session::{
        ACCESS_TOKEN_KEY, TokenStorage,
        models::{
            AuthResponse, Credentials, MfaSetup, PasswordChange, ProfileUpdate, Registration,
            TokenPair, UserProfile,
        },
    },
};

const ANALYZE_PATH: &str = "/api/v1/schedule/analyze";
const STATUS_PATH: &str = "/api/v1/schedule/status";
const AUTH_PATH: &str = "/api/v1/auth";

/// Thin wrapper around `reqwest` shared by the job and session flows.
///
/// When token storage is attached the stored access token is sent as a
/// bearer credential. The client never writes to the storage.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    tokens: Option<Arc<dyn TokenStorage>>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ClientResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ClientError::network(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens: None,
        })
    }

    pub fn from_settings(settings: &ClientSettings) -> ClientResult<Self> {
        Self::new(settings.api_base_url.clone(), settings.http_timeout)
    }

    pub fn with_token_storage(mut self, storage: Arc<dyn TokenStorage>) -> Self {
        self.tokens = Some(storage);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self
            .tokens
            .as_ref()
            .and_then(|storage| storage.get(ACCESS_TOKEN_KEY))
        {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send_raw(&self, request: RequestBuilder, fallback: &str) -> ClientResult<String> {
        let request = self.authorize(request);
        let response = request.send().await?;
        let status = response.status();
        let url = response.url().path().to_string();
        let body = response
            .text()
            .await
            .map_err(|err| ClientError::network(format!("failed to read response body: {err}")))?;

        if !status.is_success() {
            let message = error_message(&body, fallback);
            warn!(%status, path = %url, %message, "request rejected by service");
            return Err(ClientError::Service {
                status: status.as_u16(),
                message,
            });
        }

        debug!(%status, path = %url, "request succeeded");
        Ok(body)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        fallback: &str,
    ) -> ClientResult<T> {
        let body = self.send_raw(request, fallback).await?;
        serde_json::from_str(&body)
            .map_err(|err| ClientError::network(format!("invalid JSON in response: {err}")))
    }

    fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> RequestBuilder {
        self.http.post(self.url(path)).json(body)
    }

    pub async fn submit_analysis(&self, file: &SelectedFile) -> ClientResult<JobSubmission> {
        let part = multipart::Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(&file.content_type)
            .map_err(|err| ClientError::validation(format!("invalid content type: {err}")))?;
        let form = multipart::Form::new().part("file", part);

        debug!(file = %file.file_name, size = file.bytes.len(), "uploading file for analysis");
        let request = self.http.post(self.url(ANALYZE_PATH)).multipart(form);
        self.send_json(request, "Failed to submit file for analysis")
            .await
    }

    pub async fn job_status(&self, job_id: &str) -> ClientResult<JobStatusResponse> {
        let request = self.http.get(self.url(&format!("{STATUS_PATH}/{job_id}")));
        self.send_json(request, "Failed to fetch job status").await
    }

    pub async fn login(&self, credentials: &Credentials) -> ClientResult<AuthResponse> {
        let request = self.post_json(&format!("{AUTH_PATH}/login"), credentials);
        self.send_json(request, "Login failed").await
    }

    pub async fn register(&self, registration: &Registration) -> ClientResult<AuthResponse> {
        let request = self.post_json(&format!("{AUTH_PATH}/register"), registration);
        self.send_json(request, "Registration failed").await
    }

    pub async fn logout(&self, refresh_token: Option<&str>) -> ClientResult<()> {
        let body = serde_json::json!({ "refresh_token": refresh_token });
        let request = self.post_json(&format!("{AUTH_PATH}/logout"), &body);
        self.send_raw(request, "Logout failed").await.map(|_| ())
    }

    pub async fn me(&self) -> ClientResult<UserProfile> {
        let request = self.http.get(self.url(&format!("{AUTH_PATH}/me")));
        self.send_json(request, "Failed to verify session").await
    }

    pub async fn refresh(&self, refresh_token: &str) -> ClientResult<TokenPair> {
        let body = serde_json::json!({ "refresh_token": refresh_token });
        let request = self.post_json(&format!("{AUTH_PATH}/refresh"), &body);
        self.send_json(request, "Token refresh failed").await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> ClientResult<UserProfile> {
        let request = self
            .http
            .put(self.url(&format!("{AUTH_PATH}/profile")))
            .json(update);
        self.send_json(request, "Failed to update profile").await
    }

    pub async fn change_password(&self, change: &PasswordChange) -> ClientResult<ApiMessage> {
        let request = self.post_json(&format!("{AUTH_PATH}/change-password"), change);
        self.send_json(request, "Failed to change password").await
    }

    pub async fn setup_mfa(&self) -> ClientResult<MfaSetup> {
        let request = self.post_json(&format!("{AUTH_PATH}/mfa/setup"), &serde_json::json!({}));
        self.send_json(request, "Failed to set up MFA").await
    }

    pub async fn verify_mfa(&self, code: &str) -> ClientResult<ApiMessage> {
        let body = serde_json::json!({ "code": code });
        let request = self.post_json(&format!("{AUTH_PATH}/mfa/verify"), &body);
        self.send_json(request, "MFA verification failed").await
    }
}
