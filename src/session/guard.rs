use crate::session::{SessionSnapshot, SessionState};

pub const DEFAULT_LOGIN_PATH: &str = "/login";

/// What a protected route demands of the current user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessRequirement {
    /// Any one of these roles is enough. Empty means no role check.
    pub roles: Vec<String>,
    pub permission: Option<String>,
}

impl AccessRequirement {
    pub fn authenticated() -> Self {
        Self::default()
    }

    pub fn any_role<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
            permission: None,
        }
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permission = Some(permission.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Session initialization has not resolved yet.
    Loading,
    RedirectToLogin { login_path: String, return_to: String },
    AccessDenied { reason: String },
    Allow,
}

impl GuardDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardDecision::Allow)
    }
}

/// Decides whether protected content may be shown.
#[derive(Debug, Clone)]
pub struct RouteGuard {
    login_path: String,
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self::new(DEFAULT_LOGIN_PATH)
    }
}

impl RouteGuard {
    pub fn new(login_path: impl Into<String>) -> Self {
        Self {
            login_path: login_path.into(),
        }
    }

    pub fn check(
        &self,
        session: &SessionSnapshot,
        requirement: &AccessRequirement,
        path: &str,
    ) -> GuardDecision {
        if matches!(
            session.state,
            SessionState::Uninitialized | SessionState::Verifying
        ) {
            return GuardDecision::Loading;
        }

        if !session.is_authenticated() {
            return GuardDecision::RedirectToLogin {
                login_path: self.login_path.clone(),
                return_to: path.to_string(),
            };
        }

        let roles = requirement.roles.as_slice();
        if !roles.is_empty() && !session.has_any_role(roles) {
            return GuardDecision::AccessDenied {
                reason: format!("requires one of roles: {}", requirement.roles.join(", ")),
            };
        }

        if let Some(permission) = requirement.permission.as_deref() {
            if !session.has_permission(permission) {
                return GuardDecision::AccessDenied {
                    reason: format!("requires permission: {permission}"),
                };
            }
        }

        GuardDecision::Allow
    }
}
