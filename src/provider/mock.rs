//! Deterministic mock [`ModelApi`] for tests.
//!
//! Queue-based canned answers plus per-operation failure flags, so lifecycle
//! and conversation tests can exercise every fallback path without a network.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{ChatError, Result};

use super::{CacheHandle, ModelApi, PromptTurn};

/// Mock model service.
///
/// Caches are named `cachedContents/mock-N` with a monotonically increasing
/// `N`, so tests can assert whether a call created a new cache or reused an
/// existing one. `get_cache` succeeds only for names this mock created.
#[derive(Debug, Default)]
pub struct MockModel {
    /// Canned `generate_content` answers, consumed front to back. When the
    /// queue is empty a fixed placeholder answer is returned.
    responses: Mutex<Vec<String>>,
    /// Names of caches created through this mock.
    known_caches: Mutex<HashSet<String>>,
    /// Prompt turns captured from the most recent `generate_content` call.
    last_turns: Mutex<Vec<PromptTurn>>,
    created_count: AtomicUsize,
    fail_get_cache: AtomicBool,
    fail_generate: AtomicBool,
    fail_count_tokens: AtomicBool,
}

impl MockModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a canned answer for the next `generate_content` call.
    pub fn push_response(&self, response: impl Into<String>) {
        self.responses.lock().unwrap().push(response.into());
    }

    /// Make `get_cache` fail (simulates server-side eviction).
    pub fn fail_get_cache(&self, fail: bool) {
        self.fail_get_cache.store(fail, Ordering::SeqCst);
    }

    /// Make `generate_content` fail.
    pub fn fail_generate(&self, fail: bool) {
        self.fail_generate.store(fail, Ordering::SeqCst);
    }

    /// Make `count_tokens` fail (forces the byte-length heuristic).
    pub fn fail_count_tokens(&self, fail: bool) {
        self.fail_count_tokens.store(fail, Ordering::SeqCst);
    }

    /// Number of caches created so far.
    pub fn caches_created(&self) -> usize {
        self.created_count.load(Ordering::SeqCst)
    }

    /// The turn sequence of the most recent `generate_content` call.
    pub fn last_turns(&self) -> Vec<PromptTurn> {
        self.last_turns.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelApi for MockModel {
    async fn create_cache(
        &self,
        _pdf_bytes: &[u8],
        _preamble: &str,
        _system_instruction: &str,
        _ttl: Duration,
    ) -> Result<CacheHandle> {
        let n = self.created_count.fetch_add(1, Ordering::SeqCst) + 1;
        let name = format!("cachedContents/mock-{}", n);
        self.known_caches.lock().unwrap().insert(name.clone());
        Ok(CacheHandle {
            name,
            model: "mock-model".into(),
        })
    }

    async fn get_cache(&self, name: &str) -> Result<CacheHandle> {
        if self.fail_get_cache.load(Ordering::SeqCst) {
            return Err(ChatError::Provider("mock: cache evicted".into()));
        }
        if self.known_caches.lock().unwrap().contains(name) {
            Ok(CacheHandle {
                name: name.to_string(),
                model: "mock-model".into(),
            })
        } else {
            Err(ChatError::Provider(format!("mock: unknown cache {}", name)))
        }
    }

    async fn generate_content(&self, _cache: &CacheHandle, turns: &[PromptTurn]) -> Result<String> {
        if self.fail_generate.load(Ordering::SeqCst) {
            return Err(ChatError::Provider("mock: generation failed".into()));
        }
        *self.last_turns.lock().unwrap() = turns.to_vec();
        let mut queue = self.responses.lock().unwrap();
        if queue.is_empty() {
            Ok("mock answer".into())
        } else {
            Ok(queue.remove(0))
        }
    }

    async fn count_tokens(&self, text: &str) -> Result<u64> {
        if self.fail_count_tokens.load(Ordering::SeqCst) {
            return Err(ChatError::Provider("mock: countTokens unavailable".into()));
        }
        // Deterministic but distinct from the byte/4 heuristic, so tests can
        // tell which path produced a number.
        Ok(text.len() as u64)
    }
}
