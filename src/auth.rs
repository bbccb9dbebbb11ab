//! Email/password sign-in and registration.
//!
//! Local checks run first and never reach the network. A successful sign-in
//! yields the [`Session`] every other subsystem is handed explicitly.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::Method;
use serde::Deserialize;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::api::{decode, ensure_success, ApiClient, PATH_LOGIN, PATH_REGISTER};
use crate::error::{ClientError, ClientResult, ValidationIssue};
use crate::session::{Session, UserProfile};

const MIN_PASSWORD_LEN: usize = 8;

// ---------------------------------------------------------------------------
// Local validation
// ---------------------------------------------------------------------------

/// Same shape the sign-in form has always accepted: no whitespace, one `@`,
/// and a dot in the domain with text on both sides.
static EMAIL_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(email))
}

pub fn validate_login(email: &str, password: &str) -> ClientResult<()> {
    let email = email.trim();
    if email.is_empty() || password.is_empty() {
        return Err(ClientError::Validation(ValidationIssue::Credentials));
    }
    if !is_valid_email(email) {
        return Err(ClientError::Validation(ValidationIssue::EmailFormat));
    }
    Ok(())
}

/// Passwords are wiped on drop.
#[derive(Clone, Default)]
pub struct RegistrationForm {
    pub name: String,
    pub email: String,
    pub password: Zeroizing<String>,
    pub confirm_password: Zeroizing<String>,
}

pub fn validate_registration(form: &RegistrationForm) -> ClientResult<()> {
    let email = form.email.trim();
    if form.name.trim().is_empty()
        || email.is_empty()
        || form.password.is_empty()
        || form.confirm_password.is_empty()
    {
        return Err(ClientError::Validation(ValidationIssue::RegistrationFields));
    }
    if !is_valid_email(email) {
        return Err(ClientError::Validation(ValidationIssue::EmailFormat));
    }
    if form.password.as_str() != form.confirm_password.as_str() {
        return Err(ClientError::Validation(ValidationIssue::PasswordMismatch));
    }
    if form.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ClientError::Validation(ValidationIssue::PasswordTooShort));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Remote calls
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct LoginReply {
    token: String,
    user: UserProfile,
}

impl ApiClient {
    /// Sign in and build the session.
    pub async fn login(&self, email: &str, password: &str) -> ClientResult<Session> {
        validate_login(email, password)?;
        let body = serde_json::json!({
            "email": email.trim(),
            "password": password,
        });
        let reply = self
            .call(Method::POST, PATH_LOGIN, None, &[], Some(&body))
            .await
            .inspect_err(|e| warn!(error = %e, "Login failed"))?;
        ensure_success(&reply, "login failed")?;
        let login: LoginReply = decode(reply, "login")?;
        if login.token.trim().is_empty() {
            return Err(ClientError::Auth("server returned an empty token".into()));
        }
        info!(user_id = %login.user.id, "User signed in");
        Ok(Session::new(login.user, login.token))
    }

    /// Create an account. The caller signs in separately afterwards.
    pub async fn register(&self, form: &RegistrationForm) -> ClientResult<()> {
        validate_registration(form)?;
        let body = serde_json::json!({
            "name": form.name.trim(),
            "email": form.email.trim(),
            "password": form.password.as_str(),
        });
        let reply = self
            .call(Method::POST, PATH_REGISTER, None, &[], Some(&body))
            .await?;
        ensure_success(&reply, "registration failed")?;
        info!(email = %form.email.trim(), "Account registered");
        Ok(())
    }
}
