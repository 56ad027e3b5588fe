//! Error types for the cache worker.

use thiserror::Error;

/// Errors from cache storage, network fetches and the worker lifecycle.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Transport-level HTTP failure (DNS, connect, timeout, body read).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Filesystem failure in the disk storage.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored entry could not be (de)serialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The server answered, but not with a 2xx status.
    #[error("{url} responded with status {status}")]
    BadStatus {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Populating a cache generation failed; nothing was stored.
    #[error("install of {cache} failed: {source}")]
    InstallFailed {
        /// Cache generation being installed.
        cache: String,
        /// First fetch or storage failure.
        #[source]
        source: Box<CacheError>,
    },

    /// A manifest entry or request URL could not be resolved.
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl {
        /// The offending input.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// The named cache does not exist.
    #[error("cache not found: {0}")]
    CacheNotFound(String),
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
