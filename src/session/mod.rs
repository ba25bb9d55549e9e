//! Session lifecycle: credential persistence, startup verification, the auth
//! operations and the role/permission predicates consumed by route guards.
//!
//! All state changes go through [`SessionStore`]; consumers observe them via
//! [`SessionStore::subscribe`].

pub mod guard;
pub mod models;
pub mod storage;
pub mod token;

use std::sync::Arc;

use chrono::Duration;
use tokio::sync::{Mutex, watch};
use tracing::{error, info, warn};

pub use guard::{AccessRequirement, GuardDecision, RouteGuard};
pub use models::{
    AuthResponse, Credentials, MfaSetup, PasswordChange, ProfileUpdate, Registration, UserProfile,
};
pub use storage::{
    ACCESS_TOKEN_KEY, FileTokenStorage, MemoryTokenStorage, REFRESH_TOKEN_KEY, TokenStorage,
};

use crate::{
    error::{ClientError, ClientResult},
    http::{ApiClient, ApiMessage},
};

pub const NO_REFRESH_TOKEN: &str = "No refresh token available";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Uninitialized,
    Verifying,
    Authenticated,
    Refreshing,
    Anonymous,
}

/// Point-in-time view of the session handed to consumers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub user: Option<UserProfile>,
}

impl SessionSnapshot {
    /// True only once the service has confirmed the loaded profile.
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
            && matches!(
                self.state,
                SessionState::Authenticated | SessionState::Refreshing
            )
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.user.as_ref().is_some_and(|user| user.has_role(role))
    }

    pub fn has_any_role<S: AsRef<str>>(&self, roles: &[S]) -> bool {
        roles.iter().any(|role| self.has_role(role.as_ref()))
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.user
            .as_ref()
            .is_some_and(|user| user.has_permission(permission))
    }
}

/// Owns the current session and the credentials in durable storage.
pub struct SessionStore {
    api: ApiClient,
    storage: Arc<dyn TokenStorage>,
    state: watch::Sender<SessionSnapshot>,
    ops: Mutex<()>,
}

impl SessionStore {
    /// The client is rebound to `storage` so every request carries the
    /// current access token.
    pub fn new(api: ApiClient, storage: Arc<dyn TokenStorage>) -> Self {
        let api = api.with_token_storage(storage.clone());
        let (state, _) = watch::channel(SessionSnapshot::default());
        Self {
            api,
            storage,
            state,
            ops: Mutex::new(()),
        }
    }

    /// Client sharing this session's credentials.
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().state
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.state.borrow().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.state.borrow().has_role(role)
    }

    pub fn has_any_role<S: AsRef<str>>(&self, roles: &[S]) -> bool {
        self.state.borrow().has_any_role(roles)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.state.borrow().has_permission(permission)
    }

    fn publish(&self, state: SessionState, user: Option<UserProfile>) {
        self.state.send_replace(SessionSnapshot { state, user });
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_modify(|snapshot| snapshot.state = state);
    }

    /// Verify any stored access token and settle on authenticated or anonymous.
    pub async fn initialize(&self) -> SessionSnapshot {
        let _guard = self.ops.lock().await;

        if self.storage.get(ACCESS_TOKEN_KEY).is_none() {
            self.publish(SessionState::Anonymous, None);
            return self.snapshot();
        }

        self.publish(SessionState::Verifying, None);
        match self.api.me().await {
            Ok(user) => {
                info!(user_id = %user.id, "stored session verified");
                self.publish(SessionState::Authenticated, Some(user));
            }
            Err(err) => {
                warn!(error = %err, "stored session rejected; clearing credentials");
                self.clear_credentials();
                self.publish(SessionState::Anonymous, None);
            }
        }
        self.snapshot()
    }

    pub async fn login(&self, credentials: &Credentials) -> ClientResult<UserProfile> {
        let _guard = self.ops.lock().await;
        let response = self.api.login(credentials).await?;
        let user = self.establish(response).await?;
        info!(user_id = %user.id, "logged in");
        Ok(user)
    }

    /// Register a new account. Returns the profile when the service also
    /// signed the user in.
    pub async fn register(&self, registration: &Registration) -> ClientResult<Option<UserProfile>> {
        let _guard = self.ops.lock().await;
        let response = self.api.register(registration).await?;
        if response.access_token.is_none() {
            info!(email = %registration.email, "registered; sign-in still required");
            return Ok(None);
        }
        let user = self.establish(response).await?;
        info!(user_id = %user.id, "registered and logged in");
        Ok(Some(user))
    }

    async fn establish(&self, response: AuthResponse) -> ClientResult<UserProfile> {
        let access_token = response.access_token.ok_or_else(|| {
            ClientError::network("authentication response did not include an access token")
        })?;

        let prior = self.stored_credentials();
        if let Err(err) = self.store_issued(&access_token, response.refresh_token.as_deref()) {
            self.restore_credentials(prior);
            return Err(err);
        }

        let user = match response.user {
            Some(user) => user,
            None => match self.api.me().await {
                Ok(user) => user,
                Err(err) => {
                    self.restore_credentials(prior);
                    return Err(err);
                }
            },
        };

        self.publish(SessionState::Authenticated, Some(user.clone()));
        Ok(user)
    }

    fn store_issued(&self, access: &str, refresh: Option<&str>) -> ClientResult<()> {
        self.storage.set(ACCESS_TOKEN_KEY, access)?;
        match refresh {
            Some(refresh) => self.storage.set(REFRESH_TOKEN_KEY, refresh),
            None => self.storage.remove(REFRESH_TOKEN_KEY),
        }
    }

    fn stored_credentials(&self) -> [(&'static str, Option<String>); 2] {
        [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY].map(|key| (key, self.storage.get(key)))
    }

    /// Put back credentials captured by [`Self::stored_credentials`].
    fn restore_credentials(&self, prior: [(&'static str, Option<String>); 2]) {
        for (key, value) in prior {
            let restored = match value {
                Some(value) => self.storage.set(key, &value),
                None => self.storage.remove(key),
            };
            if let Err(err) = restored {
                error!(error = %err, key, "failed to restore stored credential");
            }
        }
    }

    /// Best-effort remote logout followed by unconditional local cleanup.
    pub async fn logout(&self) {
        let _guard = self.ops.lock().await;
        self.logout_locked().await;
    }

    async fn logout_locked(&self) {
        let refresh = self.storage.get(REFRESH_TOKEN_KEY);
        if let Err(err) = self.api.logout(refresh.as_deref()).await {
            warn!(error = %err, "remote logout failed; clearing local session anyway");
        }
        self.clear_credentials();
        self.publish(SessionState::Anonymous, None);
        info!("logged out");
    }

    fn clear_credentials(&self) {
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY] {
            if let Err(err) = self.storage.remove(key) {
                error!(error = %err, key, "failed to clear stored credential");
            }
        }
    }

    /// Exchange the stored refresh token for a new access token.
    ///
    /// Any failure from the service ends the session.
    pub async fn refresh_token(&self) -> ClientResult<()> {
        let _guard = self.ops.lock().await;
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> ClientResult<()> {
        let Some(refresh) = self.storage.get(REFRESH_TOKEN_KEY) else {
            return Err(ClientError::validation(NO_REFRESH_TOKEN));
        };

        let was_authenticated = self.state() == SessionState::Authenticated;
        if was_authenticated {
            self.set_state(SessionState::Refreshing);
        }

        let outcome = match self.api.refresh(&refresh).await {
            Ok(pair) => self.store_refreshed(&pair.access_token, pair.refresh_token.as_deref()),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(()) => {
                if was_authenticated {
                    self.set_state(SessionState::Authenticated);
                }
                info!("access token refreshed");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "token refresh failed; ending session");
                self.logout_locked().await;
                Err(err)
            }
        }
    }

    fn store_refreshed(&self, access: &str, refresh: Option<&str>) -> ClientResult<()> {
        self.storage.set(ACCESS_TOKEN_KEY, access)?;
        if let Some(refresh) = refresh {
            self.storage.set(REFRESH_TOKEN_KEY, refresh)?;
        }
        Ok(())
    }

    /// Refresh when the stored access token expires within `buffer`.
    ///
    /// Returns whether a refresh happened. Opaque tokens are left alone.
    pub async fn ensure_fresh(&self, buffer: Duration) -> ClientResult<bool> {
        let _guard = self.ops.lock().await;
        let Some(access) = self.storage.get(ACCESS_TOKEN_KEY) else {
            return Ok(false);
        };
        if !token::is_near_expiry(&access, buffer) {
            return Ok(false);
        }
        self.refresh_locked().await?;
        Ok(true)
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> ClientResult<UserProfile> {
        let _guard = self.ops.lock().await;
        let user = self.api.update_profile(update).await?;
        self.state.send_modify(|snapshot| {
            if snapshot.user.is_some() {
                snapshot.user = Some(user.clone());
            }
        });
        Ok(user)
    }

    pub async fn change_password(&self, change: &PasswordChange) -> ClientResult<ApiMessage> {
        self.api.change_password(change).await
    }

    pub async fn setup_mfa(&self) -> ClientResult<MfaSetup> {
        self.api.setup_mfa().await
    }

    pub async fn verify_mfa(&self, code: &str) -> ClientResult<ApiMessage> {
        self.api.verify_mfa(code).await
    }
}
