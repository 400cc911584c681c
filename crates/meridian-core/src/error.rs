//! Error types for the Meridian client core

use std::time::Duration;
use thiserror::Error;

/// Result type alias using the Meridian client Error
pub type Result<T> = std::result::Result<T, Error>;

/// Sub-status code the service attaches to session-read and
/// partition-gone failures.
pub const SUB_STATUS_READ_SESSION_NOT_AVAILABLE: u32 = 1002;

/// Client-core error types
///
/// Each variant maps to the status code the service (or the transport)
/// reported, so a failure surfaced after retries are exhausted still carries
/// the original classification.
#[derive(Error, Debug)]
pub enum Error {
    /// Protocol violation the client cannot reconcile (HTTP 500), e.g. two
    /// session tokens with the same version but different region sets
    #[error("Internal server error: {0}")]
    InternalServer(String),

    /// Connection-level failure: reset, refused, broken pipe
    #[error("Transport error: {0}")]
    Transport(String),

    /// No response arrived within the request deadline (HTTP 408)
    #[error("Request timeout: {0}")]
    RequestTimeout(String),

    /// The service rate-limited the request (HTTP 429); `retry_after` is the
    /// server-suggested delay when the response carried one
    #[error("Request throttled: {message}")]
    Throttled {
        /// Server-suggested delay before the next attempt
        retry_after: Option<Duration>,
        /// Service-provided detail
        message: String,
    },

    /// The contacted replica has not yet caught up to the requested session
    /// token (HTTP 404, sub-status 1002)
    #[error("Session not available: {0}")]
    SessionNotAvailable(String),

    /// The addressed partition key range was split or migrated
    /// (HTTP 410, sub-status 1002)
    #[error("Partition key range gone: {0}")]
    PartitionKeyRangeGone(String),

    /// The service endpoint refused to serve the request (HTTP 503)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Generic client-side internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an internal-server (protocol violation) error
    pub fn internal_server(msg: impl Into<String>) -> Self {
        Self::InternalServer(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a request-timeout error
    pub fn request_timeout(msg: impl Into<String>) -> Self {
        Self::RequestTimeout(msg.into())
    }

    /// Create a throttled error with an optional server-suggested delay
    pub fn throttled(retry_after: Option<Duration>, msg: impl Into<String>) -> Self {
        Self::Throttled {
            retry_after,
            message: msg.into(),
        }
    }

    /// Create a session-not-available error
    pub fn session_not_available(msg: impl Into<String>) -> Self {
        Self::SessionNotAvailable(msg.into())
    }

    /// Create an internal client error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// HTTP status code equivalent of this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InternalServer(_) | Self::Internal(_) => 500,
            Self::Transport(_) => 0,
            Self::RequestTimeout(_) => 408,
            Self::Throttled { .. } => 429,
            Self::SessionNotAvailable(_) => 404,
            Self::PartitionKeyRangeGone(_) => 410,
            Self::ServiceUnavailable(_) => 503,
        }
    }

    /// Service sub-status code, 0 when the error class has none
    pub fn sub_status_code(&self) -> u32 {
        match self {
            Self::SessionNotAvailable(_) | Self::PartitionKeyRangeGone(_) => {
                SUB_STATUS_READ_SESSION_NOT_AVAILABLE
            }
            _ => 0,
        }
    }
}
