//! Who is acting: the session capability consumed by the storage tiers and
//! the sign-in state machine behind it.

use std::sync::{Arc, PoisonError, RwLock};

use crate::error::AuthError;

/// Snapshot of the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthSession {
    Guest,
    Authenticated { user_id: String },
}

impl AuthSession {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Guest => None,
            Self::Authenticated { user_id } => Some(user_id.as_str()),
        }
    }
}

/// Session lookup. Implementations answer from current state; nothing is
/// pushed to callers.
pub trait AuthProvider {
    fn current_session(&self) -> AuthSession;
}

impl<T: AuthProvider + ?Sized> AuthProvider for Arc<T> {
    fn current_session(&self) -> AuthSession {
        (**self).current_session()
    }
}

/// Sign-in lifecycle: `LoggedOut -> LoggingIn -> LoggedIn`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    LoggedOut,
    LoggingIn { user_id: String },
    LoggedIn { user_id: String },
}

impl AuthState {
    fn name(&self) -> &'static str {
        match self {
            Self::LoggedOut => "logged out",
            Self::LoggingIn { .. } => "logging in",
            Self::LoggedIn { .. } => "logged in",
        }
    }
}

/// In-process session holder. Credential checks belong to whatever drives
/// the transitions; this only tracks where the session is.
#[derive(Debug)]
pub struct SessionAuth {
    state: RwLock<AuthState>,
}

impl Default for SessionAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionAuth {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(AuthState::LoggedOut),
        }
    }

    /// Start out signed in, e.g. from a persisted session.
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(AuthState::LoggedIn {
                user_id: user_id.into(),
            }),
        }
    }

    pub fn state(&self) -> AuthState {
        self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn begin_login(&self, user_id: impl Into<String>) -> Result<(), AuthError> {
        self.transition("begin login", |state| match state {
            AuthState::LoggedOut => Some(AuthState::LoggingIn {
                user_id: user_id.into(),
            }),
            _ => None,
        })
    }

    pub fn complete_login(&self) -> Result<(), AuthError> {
        self.transition("complete login", |state| match state {
            AuthState::LoggingIn { user_id } => Some(AuthState::LoggedIn {
                user_id: user_id.clone(),
            }),
            _ => None,
        })
    }

    pub fn fail_login(&self) -> Result<(), AuthError> {
        self.transition("fail login", |state| match state {
            AuthState::LoggingIn { .. } => Some(AuthState::LoggedOut),
            _ => None,
        })
    }

    /// Always succeeds; logging out twice is harmless.
    pub fn logout(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if *state != AuthState::LoggedOut {
            log::info!("Signed out from {}", state.name());
        }
        *state = AuthState::LoggedOut;
    }

    fn transition(
        &self,
        action: &'static str,
        next: impl FnOnce(&AuthState) -> Option<AuthState>,
    ) -> Result<(), AuthError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        match next(&state) {
            Some(new_state) => {
                log::debug!("Auth: {} -> {}", state.name(), new_state.name());
                *state = new_state;
                Ok(())
            }
            None => Err(AuthError {
                action,
                state: state.name(),
            }),
        }
    }
}

impl AuthProvider for SessionAuth {
    fn current_session(&self) -> AuthSession {
        match self.state() {
            AuthState::LoggedIn { user_id } => AuthSession::Authenticated { user_id },
            AuthState::LoggedOut | AuthState::LoggingIn { .. } => AuthSession::Guest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_walks_through_states() {
        let auth = SessionAuth::new();
        assert_eq!(auth.current_session(), AuthSession::Guest);

        auth.begin_login("u1").unwrap();
        assert_eq!(auth.state(), AuthState::LoggingIn { user_id: "u1".into() });
        // Not authenticated until the login completes.
        assert_eq!(auth.current_session().user_id(), None);

        auth.complete_login().unwrap();
        assert_eq!(
            auth.current_session(),
            AuthSession::Authenticated { user_id: "u1".into() }
        );

        auth.logout();
        assert_eq!(auth.state(), AuthState::LoggedOut);
    }

    #[test]
    fn rejects_out_of_order_transitions() {
        let auth = SessionAuth::new();
        let err = auth.complete_login().unwrap_err();
        assert_eq!(err.to_string(), "cannot complete login while logged out");

        let auth = SessionAuth::signed_in("u1");
        assert!(auth.begin_login("u2").is_err());
        assert!(auth.fail_login().is_err());
    }

    #[test]
    fn failed_login_returns_to_logged_out() {
        let auth = SessionAuth::new();
        auth.begin_login("u1").unwrap();
        auth.fail_login().unwrap();
        assert_eq!(auth.state(), AuthState::LoggedOut);
    }

    #[test]
    fn arc_provider_delegates() {
        let auth = Arc::new(SessionAuth::signed_in("u9"));
        assert_eq!(AuthProvider::current_session(&auth).user_id(), Some("u9"));
    }
}
