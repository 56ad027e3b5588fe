//! Error types for decoding domain values out of backend documents.

use thiserror::Error;

/// Errors raised while turning raw document data into domain types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Document JSON did not match the expected shape.
    #[error("failed to decode {kind}: {source}")]
    Decode {
        /// Which domain type was being decoded.
        kind: &'static str,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// An identifier was empty or otherwise unusable.
    #[error("invalid id: {0}")]
    InvalidId(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
