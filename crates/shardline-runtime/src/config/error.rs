//! Errors raised while loading or checking a [`WorkerConfig`](super::WorkerConfig).

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("config file {} does not exist", .0.display())]
    FileNotFound(PathBuf),

    /// A source could not be read or did not match the schema.
    #[error("cannot read worker config: {0}")]
    ParseError(String),

    #[error("invalid worker config: {message}")]
    ValidationError { message: String },

    /// A setting that must be non-empty is empty.
    #[error("`{field}` must be set")]
    MissingField { field: String },

    #[error("`{url}` is not a usable URL: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl ConfigError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
