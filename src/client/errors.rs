use serde_json::Value;
use std::fmt;

/// Maximum number of error body characters surfaced to callers.
const MAX_ERROR_CHARS: usize = 200;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientError {
    Config(String),
    Network(String),
    Timeout(String),
    Http { status: u16, message: String },
    Parse(String),
    Serialization(String),
}

impl ClientError {
    /// The HTTP status for `Http` errors.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Http { status: 401, .. })
    }

    /// Build an `Http` error from a non-success status and its body, preferring
    /// the server's `message` field.
    pub(crate) fn from_response(status: u16, body: &Value) -> Self {
        let message = match body {
            Value::Object(map) => map
                .get("message")
                .and_then(Value::as_str)
                .map_or_else(|| body.to_string(), str::to_string),
            Value::String(text) => text.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        Self::Http {
            status,
            message: sanitize_message(&message),
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Config(message) => write!(formatter, "Config error: {message}"),
            ClientError::Network(message) => write!(formatter, "Network error: {message}"),
            ClientError::Timeout(message) => write!(formatter, "Timeout: {message}"),
            ClientError::Http { status, message } => {
                write!(formatter, "Request failed ({status}): {message}")
            }
            ClientError::Parse(message) => write!(formatter, "Response error: {message}"),
            ClientError::Serialization(message) => {
                write!(formatter, "Request error: {message}")
            }
        }
    }
}

impl std::error::Error for ClientError {}

/// Trim and truncate server-provided messages.
fn sanitize_message(message: &str) -> String {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        "Request failed.".to_string()
    } else {
        trimmed.chars().take(MAX_ERROR_CHARS).collect()
    }
}
