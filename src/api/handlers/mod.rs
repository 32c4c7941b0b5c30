pub mod auth;
pub mod error;

pub mod health;
pub use self::health::health;

pub mod user_register;
pub use self::user_register::register;

pub mod user_login;
pub use self::user_login::login;

pub mod me;
pub mod users;
pub mod history;

// common functions for the handlers
use regex::Regex;
use std::sync::LazyLock;

use self::error::ApiError;

pub const MIN_PASSWORD_LENGTH: usize = 8;

static EMAIL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

static USERNAME_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]{3,32}$").ok());

#[must_use]
pub fn valid_email(email: &str) -> bool {
    EMAIL_RE.as_ref().is_some_and(|re| re.is_match(email.trim()))
}

#[must_use]
pub fn valid_username(username: &str) -> bool {
    USERNAME_RE
        .as_ref()
        .is_some_and(|re| re.is_match(username.trim()))
}

#[must_use]
pub fn valid_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LENGTH
}

/// Reject a new password that does not meet the length rule.
pub(crate) fn check_password(password: &str) -> Result<(), ApiError> {
    if valid_password(password) {
        Ok(())
    } else {
        Err(ApiError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )))
    }
}
