//! Error types for the DNS operator

use std::time::Duration;

use thiserror::Error;

/// Result type alias using the operator's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Operator error types
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// CRD registration failed at startup
    #[error("CRD bootstrap error: {0}")]
    Bootstrap(String),

    /// Handler asked to be retried later
    #[error("Temporary failure: {reason} (retry in {}s)", .retry_after.as_secs())]
    TemporaryFailure { reason: String, retry_after: Duration },

    /// Finalizer error
    #[error("Finalizer error: {0}")]
    Finalizer(#[source] Box<kube::runtime::finalizer::Error<Error>>),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a bootstrap error
    pub fn bootstrap(msg: impl Into<String>) -> Self {
        Error::Bootstrap(msg.into())
    }

    /// Requeue delay hinted by the error, if it carries one.
    ///
    /// Looks through finalizer wrapping so the cleanup handler's hint survives.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::TemporaryFailure { retry_after, .. } => Some(*retry_after),
            Error::Finalizer(inner) => match inner.as_ref() {
                kube::runtime::finalizer::Error::ApplyFailed(e)
                | kube::runtime::finalizer::Error::CleanupFailed(e) => e.retry_after(),
                _ => None,
            },
            _ => None,
        }
    }
}
