//! CLI error types and conversions

use crate::cache::CacheError;
use crate::service::ServiceError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Request failed
    #[error("service error: {0}")]
    ServiceError(#[from] ServiceError),

    /// Cache read or write failed
    #[error("cache error: {0}")]
    CacheError(#[from] CacheError),

    /// A worker stopped before answering
    #[error("{0} service stopped before answering")]
    ServiceStopped(String),

    /// Unexpected payload for the requested operation
    #[error("unexpected response to {0}")]
    UnexpectedPayload(&'static str),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}
