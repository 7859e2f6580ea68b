//! Runtime error types.

use std::time::Duration;

use thiserror::Error;

use shardline_core::{BrokerError, EnvelopeError};
use shardline_framework::BoxError;
use shardline_transport::HttpError;

use crate::config::ConfigError;

/// Why a [`wait_for`](crate::EventDispatcher::wait_for) did not yield an envelope.
#[derive(Error, Debug)]
pub enum WaitError {
    /// No matching envelope arrived in time.
    #[error("no matching event within {0:?}")]
    Timeout(Duration),

    /// The predicate itself failed.
    #[error("wait predicate failed: {0}")]
    Predicate(BoxError),

    /// The waiter was dropped by a forced unsubscribe.
    #[error("subscription closed while waiting")]
    Closed,

    /// The routing key could not be bound.
    #[error("failed to subscribe: {0}")]
    Subscribe(#[from] BrokerError),
}

/// Errors raised by the event dispatcher.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

/// Errors that can occur while starting or running a worker.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Login or another startup REST call failed.
    #[error("startup request failed: {0}")]
    Http(#[from] HttpError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Installing a signal handler failed.
    #[error("failed to listen for shutdown signals: {0}")]
    Signal(#[from] std::io::Error),

    /// `build` was called without a required collaborator.
    #[error("worker is missing its {0}")]
    MissingService(&'static str),
}

/// Result type for dispatcher operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Result type for a single wait.
pub type WaitResult<T> = Result<T, WaitError>;

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
