//! Remote model service abstraction.
//!
//! The hosted generative-model API is an opaque collaborator with four
//! operations: create a content cache, retrieve one by name, generate
//! against a cache, and count tokens. [`ModelApi`] puts those behind a
//! trait object so the cache lifecycle and conversation layers never touch
//! the wire format directly, and tests can run against [`mock::MockModel`].

pub mod gemini;
pub mod mock;

pub use gemini::GeminiClient;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Opaque reference to a server-side content cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHandle {
    /// Server-assigned resource name (e.g. `cachedContents/abc123`).
    pub name: String,
    /// Model the cache was created for.
    pub model: String,
}

/// Role of a prompt turn. The remote API distinguishes user turns from the
/// model's own prior answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptRole {
    User,
    Model,
}

/// A single turn of the combined prompt sent to `generate_content`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTurn {
    pub role: PromptRole,
    pub text: String,
}

impl PromptTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: PromptRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: PromptRole::Model,
            text: text.into(),
        }
    }
}

/// The remote model service.
///
/// All calls are blocking from the caller's perspective (awaited to
/// completion, no cancellation beyond transport timeouts) and may be slow or
/// fail. Which failures propagate and which fall back is decided by the
/// caller, not here.
#[async_trait]
pub trait ModelApi: Send + Sync {
    /// Create a server-side cache from a PDF and a text preamble.
    ///
    /// `preamble` precedes the document bytes in the cached content and
    /// carries any minimum-token padding. `ttl` is how long the service
    /// should retain the cache.
    async fn create_cache(
        &self,
        pdf_bytes: &[u8],
        preamble: &str,
        system_instruction: &str,
        ttl: Duration,
    ) -> Result<CacheHandle>;

    /// Look up an existing cache by its server-assigned name.
    ///
    /// Fails when the cache has been evicted server-side; the lifecycle
    /// layer treats that as a signal to recreate, not as an error.
    async fn get_cache(&self, name: &str) -> Result<CacheHandle>;

    /// Generate a response against a cache from an ordered turn sequence.
    async fn generate_content(&self, cache: &CacheHandle, turns: &[PromptTurn]) -> Result<String>;

    /// Exact token count for a piece of text.
    async fn count_tokens(&self, text: &str) -> Result<u64>;
}
