//! Crate-wide error type and `Result` alias.
//!
//! Error taxonomy:
//! - [`ChatError::Document`] is the only fatal case — the source PDF cannot
//!   be read at all. It is surfaced to the caller and never retried.
//! - [`ChatError::Provider`] is propagated when the remote generation call
//!   fails; the failed turn is reported and the question is never silently
//!   dropped.
//! - Everything recoverable (status-record read/write, cache retrieval,
//!   exact token counting) is handled in place with a logged fallback and
//!   never reaches this type. See `cache::lifecycle::Degradation`.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ChatError>;

/// Errors surfaced by the cache lifecycle and conversation layers.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The source document could not be read. Fatal; not retried.
    #[error("document error: {0}")]
    Document(String),

    /// A remote model API call failed in a way we do not fall back from.
    #[error("provider error: {0}")]
    Provider(String),

    /// Invalid or missing configuration (e.g. no API key anywhere).
    #[error("config error: {0}")]
    Config(String),

    /// Filesystem error outside the soft-fail paths.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure outside the soft-fail paths.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A collaborator call that failed but has a defined fallback.
///
/// These cases never become a [`ChatError`]. Each maps to exactly one
/// fallback action via [`Degradation::fallback_action`], and
/// [`Degradation::handle`] is the single place they get logged — the policy
/// table, not scattered catch-and-log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degradation {
    /// Cache-status record could not be read or parsed.
    StatusRead,
    /// Cache-status record could not be written.
    StatusWrite,
    /// Remote cache retrieval failed (e.g. server-side eviction).
    CacheRetrieval,
    /// Exact remote token count unavailable.
    TokenCount,
}

impl Degradation {
    /// The fallback each degraded case maps to.
    pub fn fallback_action(&self) -> &'static str {
        match self {
            Self::StatusRead => "treat the record as absent and recreate the cache",
            Self::StatusWrite => "keep the in-memory handle for this process",
            Self::CacheRetrieval => "fall through to cache recreation",
            Self::TokenCount => "estimate tokens with the byte-length heuristic",
        }
    }

    /// Log the degraded call and its fallback, then continue.
    pub fn handle(&self, detail: impl std::fmt::Display) {
        tracing::warn!(
            degradation = ?self,
            fallback = self.fallback_action(),
            "degraded collaborator call: {}",
            detail
        );
    }
}
