//! Error taxonomy shared by the chat and checkout subsystems.
//!
//! Every failure is contained to the operation that raised it; none of these
//! are fatal to the process. Hosts render them through [`ClientError::notice`].

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::events::Notice;

/// Which group of required fields was left empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationIssue {
    /// Customer name or payment method.
    NameAndPaymentMethod,
    /// Phone number or address (delivery orders).
    PhoneAndAddress,
    /// Table number (dine-in / take-away orders).
    TableNumber,
    /// Email or password on sign-in.
    Credentials,
    /// Any field of the registration form.
    RegistrationFields,
    EmailFormat,
    PasswordMismatch,
    PasswordTooShort,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NameAndPaymentMethod => "please fill in your name and payment method",
            Self::PhoneAndAddress => "please fill in your phone number and address",
            Self::TableNumber => "please fill in your table number",
            Self::Credentials => "please fill in email and password",
            Self::RegistrationFields => "please complete all fields",
            Self::EmailFormat => "email format is invalid",
            Self::PasswordMismatch => "passwords do not match",
            Self::PasswordTooShort => "password must be at least 8 characters",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0}")]
    Validation(ValidationIssue),

    #[error("sign-in required: {0}")]
    Auth(String),

    #[error("{0}")]
    Remote(String),

    #[error("connection problem: {0}")]
    Transport(String),

    #[error("payment app could not be opened: {0}")]
    ExternalAppUnavailable(String),

    #[error("no final payment status after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    /// Dismissible notice for the host UI.
    pub fn notice(&self) -> Notice {
        let title = match self {
            Self::Validation(_) => "Incomplete form",
            Self::Auth(_) => "Sign-in required",
            Self::Remote(_) => "Request failed",
            Self::Transport(_) => "Connection failed",
            Self::ExternalAppUnavailable(_) => "Cannot open payment app",
            Self::Timeout(_) => "Payment timeout",
            Self::Config(_) => "Configuration error",
        };
        Notice::warning(title, self.to_string())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
