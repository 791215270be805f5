//! ============================================================================
//! Session Context - Explicit login state for one user interaction
//! ============================================================================
//! Replaces ambient "authenticated" flags: callers own a SessionContext and
//! pass it through login / signup / logout.
//! ============================================================================

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::identity::{validate_credentials, IdentityService};
use crate::error::StoreError;

/// Which screen the user is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Page {
    #[default]
    Login,
    Upload,
    Result,
}

/// Per-user interaction state.
///
/// `user_id` is the owner key the logged-in user's preferences and usage are
/// stored under. It is only ever set by a successful login, so code that keys
/// data off [`SessionContext::user`] can only touch the caller's own records.
/// Fields are private so a session cannot be assembled without logging in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionContext {
    authenticated: bool,
    username: Option<String>,
    user_id: Option<String>,
    current_page: Page,
}

/// What the login / signup form should tell the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Welcome(String),
    SignedUp,
    InvalidCredentials,
    UsernameTaken,
    InvalidInput(String),
    Unavailable(String),
}

impl AuthOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Welcome(_) | Self::SignedUp)
    }

    /// User-facing message for this outcome
    pub fn message(&self) -> String {
        match self {
            Self::Welcome(user) => format!("Welcome {}!", user),
            Self::SignedUp => "Signup successful. Please login.".into(),
            Self::InvalidCredentials => "Invalid username or password".into(),
            Self::UsernameTaken => "Username already taken".into(),
            Self::InvalidInput(msg) => msg.clone(),
            Self::Unavailable(_) => {
                "Authentication is unavailable right now, please try again later".into()
            }
        }
    }
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn current_page(&self) -> Page {
        self.current_page
    }

    /// Owner key of the authenticated user, if any
    pub fn user(&self) -> Option<&str> {
        if self.authenticated {
            self.user_id.as_deref()
        } else {
            None
        }
    }

    /// Display name of the authenticated user, if any
    pub fn username(&self) -> Option<&str> {
        if self.authenticated {
            self.username.as_deref()
        } else {
            None
        }
    }

    /// Check credentials and move to the upload page on success
    pub async fn login(
        &mut self,
        identity: &IdentityService,
        username: &str,
        password: &str,
    ) -> AuthOutcome {
        match identity.authenticate(username, password).await {
            Ok(true) => {
                let user = username.trim().to_string();
                self.authenticated = true;
                self.user_id = Some(identity.owner_key(&user));
                self.username = Some(user.clone());
                self.current_page = Page::Upload;
                AuthOutcome::Welcome(user)
            }
            Ok(false) => {
                self.clear();
                AuthOutcome::InvalidCredentials
            }
            Err(e) => {
                warn!("Login unavailable ({} backend): {}", identity.backend_name(), e);
                self.clear();
                AuthOutcome::Unavailable(e.to_string())
            }
        }
    }

    /// Register a new account. The session stays logged out; the user logs in next.
    pub async fn signup(
        &self,
        identity: &IdentityService,
        username: &str,
        password: &str,
    ) -> AuthOutcome {
        if let Err(e) = validate_credentials(username, password) {
            return AuthOutcome::InvalidInput(match e {
                StoreError::Validation(msg) => msg,
                other => other.to_string(),
            });
        }

        match identity.register(username, password).await {
            Ok(true) => AuthOutcome::SignedUp,
            Ok(false) => AuthOutcome::UsernameTaken,
            Err(e) => {
                warn!("Signup unavailable ({} backend): {}", identity.backend_name(), e);
                AuthOutcome::Unavailable(e.to_string())
            }
        }
    }

    /// Record that a roast result is being shown
    pub fn show_result(&mut self) {
        if self.authenticated {
            self.current_page = Page::Result;
        }
    }

    pub fn logout(&mut self) {
        self.clear();
    }

    fn clear(&mut self) {
        self.authenticated = false;
        self.username = None;
        self.user_id = None;
        self.current_page = Page::Login;
    }
}
