//! HTTP error types.

use serde_json::Value;
use thiserror::Error;

use shardline_core::{OutboundError, StoreError};

/// Errors raised by the rate-limited REST pipeline.
#[derive(Debug, Clone, Error)]
pub enum HttpError {
    /// The upstream answered 403.
    #[error("403 Forbidden (error code: {code}): {message}")]
    Forbidden {
        /// Upstream error code.
        code: i64,
        /// Flattened upstream message.
        message: String,
    },

    /// The upstream answered 404.
    #[error("404 Not Found (error code: {code}): {message}")]
    NotFound {
        /// Upstream error code.
        code: i64,
        /// Flattened upstream message.
        message: String,
    },

    /// Any other failed status, including exhausted retries.
    #[error("{status} (error code: {code}): {message}")]
    Status {
        /// HTTP status.
        status: u16,
        /// Upstream error code.
        code: i64,
        /// Flattened upstream message.
        message: String,
    },

    /// The token was rejected at login.
    #[error("improper token has been passed")]
    LoginFailure,

    /// The gateway endpoint could not be fetched.
    #[error("the gateway to connect to was not found")]
    GatewayNotFound,

    /// The request never produced a response.
    #[error("transport failure: {0}")]
    Transport(String),

    /// A response body had an unexpected shape.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Lease bookkeeping failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl HttpError {
    /// Maps a failed response to `Forbidden`, `NotFound` or `Status`.
    pub fn from_response(status: u16, body: &Value) -> Self {
        let (code, message) = describe_body(body);
        match status {
            403 => Self::Forbidden { code, message },
            404 => Self::NotFound { code, message },
            _ => Self::Status {
                status,
                code,
                message,
            },
        }
    }

    /// Builds the generic status error regardless of the status value.
    pub fn status(status: u16, body: &Value) -> Self {
        let (code, message) = describe_body(body);
        Self::Status {
            status,
            code,
            message,
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Forbidden { .. } => Some(403),
            Self::NotFound { .. } => Some(404),
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for HttpError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<HttpError> for OutboundError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Forbidden { .. } => Self::Forbidden(err.to_string()),
            HttpError::NotFound { .. } => Self::NotFound(err.to_string()),
            other => Self::Failed(other.to_string()),
        }
    }
}

/// Result type for HTTP operations.
pub type HttpResult<T> = Result<T, HttpError>;

/// Extracts `(code, message)` from an upstream error body.
///
/// Nested `errors` objects are flattened into `In <path>: <message>` lines
/// appended to the base message.
pub fn describe_body(body: &Value) -> (i64, String) {
    match body {
        Value::Object(map) => {
            let code = map.get("code").and_then(Value::as_i64).unwrap_or(0);
            let mut message = map
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            if let Some(errors @ Value::Object(_)) = map.get("errors") {
                let mut flat = Vec::new();
                flatten_errors(errors, "", &mut flat);
                if !flat.is_empty() {
                    let helpful: Vec<String> = flat
                        .into_iter()
                        .map(|(path, msg)| format!("In {path}: {msg}"))
                        .collect();
                    message.push('\n');
                    message.push_str(&helpful.join("\n"));
                }
            }
            (code, message)
        }
        Value::String(text) => (0, text.clone()),
        Value::Null => (0, String::new()),
        other => (0, other.to_string()),
    }
}

fn flatten_errors(value: &Value, prefix: &str, out: &mut Vec<(String, String)>) {
    let Value::Object(map) = value else {
        return;
    };
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(inner) => match inner.get("_errors") {
                Some(Value::Array(errors)) => {
                    let joined: Vec<&str> = errors
                        .iter()
                        .map(|e| e.get("message").and_then(Value::as_str).unwrap_or_default())
                        .collect();
                    out.push((path, joined.join(" ")));
                }
                _ => flatten_errors(value, &path, out),
            },
            Value::String(s) => out.push((path, s.clone())),
            other => out.push((path, other.to_string())),
        }
    }
}
