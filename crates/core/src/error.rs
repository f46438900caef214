//! Unified error types for the Fieldpost station service.
//!
//! Every variant carries its message as a plain string so the type stays
//! `Clone`: a coalesced fetch shares one outcome between all waiters, and a
//! failure has to be handed to each of them.

/// Unified error type for the station service.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Client-caused: malformed path segments, out-of-range coordinates.
    #[error("INVALID_REQUEST: {0}")]
    InvalidRequest(String),

    /// No matching resource (unknown version/filename, no cached release).
    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    /// Upstream failed after bounded retries, or returned a permanent error.
    #[error("UPSTREAM_UNAVAILABLE: {0}")]
    UpstreamUnavailable(String),

    /// Upstream did not answer within the fetch timeout.
    #[error("UPSTREAM_TIMEOUT: {0}")]
    UpstreamTimeout(String),

    /// Storage medium unmounted or an I/O operation on it failed.
    #[error("STORAGE_UNAVAILABLE: {0}")]
    StorageUnavailable(String),

    /// Fetched payload failed its integrity check; never cached.
    #[error("VALIDATION_FAILED: {0}")]
    ValidationFailed(String),
}

impl Error {
    /// Shorthand for storage errors wrapping an underlying I/O failure.
    pub fn storage(context: &str, err: std::io::Error) -> Self {
        Error::StorageUnavailable(format!("{context}: {err}"))
    }
}
