//! Process-wide authenticated-user context.

use std::sync::RwLock;

use tracing::{debug, info};

use crate::entities::User;
use crate::types::{SyncError, SyncResult};

/// Holds the currently logged-in user.
///
/// Constructed once at startup and shared by reference (usually through an
/// `Arc`) with every component that needs the current user or its bearer
/// credential.
#[derive(Debug, Default)]
pub struct Session {
    current: RwLock<Option<User>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session that is already logged in
    pub fn with_user(user: User) -> Self {
        let session = Self::new();
        session.login(user);
        session
    }

    pub fn login(&self, user: User) {
        info!(user_id = %user.id, "session logged in");
        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = Some(user);
    }

    pub fn logout(&self) {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(user) = current.take() {
            info!(user_id = %user.id, "session logged out");
        }
    }

    pub fn current(&self) -> Option<User> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.current().is_some()
    }

    /// The current user, or an authorization error when logged out
    pub fn require_user(&self) -> SyncResult<User> {
        self.current().ok_or_else(|| {
            debug!("operation attempted without a logged-in user");
            SyncError::auth("no user is logged in")
        })
    }

    /// The bearer credential for collaborator calls
    pub fn bearer_token(&self) -> SyncResult<String> {
        let user = self.require_user()?;
        if user.token.trim().is_empty() {
            return Err(SyncError::auth("missing credential"));
        }
        Ok(user.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_and_logout_toggle_current_user() {
        let session = Session::new();
        assert!(!session.is_logged_in());
        assert!(session.require_user().unwrap_err().is_auth());

        session.login(User::new("u1", "Ada", "token-1"));
        assert_eq!(session.require_user().unwrap().id, "u1");
        assert_eq!(session.bearer_token().unwrap(), "token-1");

        session.logout();
        assert!(session.current().is_none());
        assert!(session.bearer_token().unwrap_err().is_auth());
    }

    #[test]
    fn blank_token_is_an_auth_error() {
        let session = Session::with_user(User::new("u1", "Ada", "  "));
        assert_eq!(
            session.bearer_token().unwrap_err(),
            SyncError::auth("missing credential")
        );
    }
}
