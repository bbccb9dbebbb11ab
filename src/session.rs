//! Signed-in user session.
//!
//! Credentials are carried in an explicit [`Session`] value handed to each
//! subsystem entry point; nothing in this crate reads them from process-wide
//! state. The bearer token is wiped from memory when the session is dropped.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{ClientError, ClientResult};

/// Profile returned by the login endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(rename = "_id", alias = "id", default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Clone)]
pub struct Session {
    user: UserProfile,
    token: Zeroizing<String>,
}

impl Session {
    pub fn new(user: UserProfile, token: impl Into<String>) -> Self {
        Self {
            user,
            token: Zeroizing::new(token.into()),
        }
    }

    pub fn user(&self) -> &UserProfile {
        &self.user
    }

    pub fn token(&self) -> &str {
        self.token.as_str()
    }

    /// Display name used as chat `senderName`; falls back to "User".
    pub fn display_name(&self) -> &str {
        let name = self.user.name.trim();
        if name.is_empty() {
            "User"
        } else {
            name
        }
    }

    /// Fails with `Auth` when the token is blank.
    pub fn require_token(&self) -> ClientResult<&str> {
        let token = self.token.trim();
        if token.is_empty() {
            return Err(ClientError::Auth(
                "user not authenticated, please log in".into(),
            ));
        }
        Ok(token)
    }

    /// Fails with `Auth` when either the user name or the token is blank.
    pub fn require_user_and_token(&self) -> ClientResult<&str> {
        if self.user.name.trim().is_empty() {
            return Err(ClientError::Auth("user information is incomplete".into()));
        }
        self.require_token()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("token", &"<redacted>")
            .finish()
    }
}
