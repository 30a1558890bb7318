//! Cache lifecycle: decide validity, retrieve or recreate, account cost.
//!
//! The manager walks a small state machine on every call:
//! `NoCache → Valid → (Expired | DocumentChanged) → NoCache`. A valid record
//! whose remote cache is still retrievable is reused; everything else falls
//! through to recreation. The only fatal error is an unreadable source
//! document.
//!
//! The record slot sits behind a `tokio::sync::Mutex` held for the whole of
//! [`CacheManager::ensure_cache`], so two callers observing an expired cache
//! at the same moment produce one recreation, not two.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::cost::{estimate_tokens, CostEvent, CostModel};
use crate::error::{ChatError, Degradation, Result};
use crate::provider::{CacheHandle, ModelApi};
use crate::session::SessionState;

use super::status::{CacheRecord, CacheStatusStore};

/// The remote service rejects caches below this token floor; small documents
/// get synthetic filler appended to clear it.
pub const MIN_CACHE_TOKENS: u64 = 4096;

/// Filler sentence repeated to pad small documents up to the token floor.
const PADDING_SENTENCE: &str = "Please analyze this PDF document thoroughly. ";

/// Text part that precedes the inline PDF in the cached content.
const PREAMBLE: &str = "Here is the PDF document to analyze:";

/// System instruction stored with the cache.
pub const SYSTEM_INSTRUCTION: &str = "You are an expert document analyzer with proficiency in \
     both English and Telugu. Answer user questions based on the PDF document you have access \
     to. Always provide responses in both formal English and formal Telugu when requested.";

/// Cache scope: how long a cache lives and where its record is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheScope {
    /// One cache per interactive session; record held in memory only.
    PerSession,
    /// One cache shared across sessions for a fixed document; record
    /// persisted through a [`CacheStatusStore`].
    Global,
}

impl CacheScope {
    pub fn ttl(&self) -> Duration {
        match self {
            Self::PerSession => Duration::from_secs(10 * 60),
            Self::Global => Duration::from_secs(24 * 60 * 60),
        }
    }

    pub fn ttl_hours(&self) -> f64 {
        self.ttl().as_secs_f64() / 3600.0
    }
}

/// Where the source document comes from.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// Fixed local path (global variant).
    File(PathBuf),
    /// Bytes supplied interactively (per-session variant).
    Bytes(Vec<u8>),
}

impl DocumentSource {
    /// Read the document bytes. An unreadable file is the one fatal error in
    /// the lifecycle: it is surfaced, never retried.
    pub fn read(&self) -> Result<Cow<'_, [u8]>> {
        match self {
            Self::File(path) => std::fs::read(path).map(Cow::Owned).map_err(|e| {
                ChatError::Document(format!("cannot read {}: {}", path.display(), e))
            }),
            Self::Bytes(bytes) => Ok(Cow::Borrowed(bytes)),
        }
    }
}

/// Owns the cache record slot and drives retrieval/recreation.
pub struct CacheManager {
    api: Arc<dyn ModelApi>,
    scope: CacheScope,
    /// Durable record store; present for [`CacheScope::Global`] only.
    store: Option<CacheStatusStore>,
    cost: CostModel,
    /// Single-flight guard: held across the whole ensure operation.
    record: Mutex<Option<CacheRecord>>,
}

impl CacheManager {
    pub fn new(
        api: Arc<dyn ModelApi>,
        scope: CacheScope,
        store: Option<CacheStatusStore>,
        cost: CostModel,
    ) -> Self {
        Self {
            api,
            scope,
            store,
            cost,
            record: Mutex::new(None),
        }
    }

    /// Return a handle to a valid remote cache for `document`, creating one
    /// if the current record is absent, expired, stale, or evicted.
    ///
    /// Retrieval failures fall through to recreation and are never surfaced.
    /// Creation cost is recorded against the session ledger with
    /// `pdf_count = 1` and `cache_hours` equal to the scope TTL in hours.
    pub async fn ensure_cache(
        &self,
        document: &DocumentSource,
        session: &mut SessionState,
    ) -> Result<CacheHandle> {
        let bytes = document.read()?;
        let hash = document_hash(&bytes);

        let mut slot = self.record.lock().await;

        let candidate = match slot.clone() {
            Some(record) => Some(record),
            None => self.store.as_ref().and_then(|s| s.load()),
        };

        if let Some(record) = candidate {
            if record.is_valid(&hash, Utc::now()) {
                match self.api.get_cache(&record.cache_name).await {
                    Ok(handle) => {
                        debug!(cache = %handle.name, "reusing valid remote cache");
                        *slot = Some(record);
                        session.cache = Some(handle.clone());
                        session.document_loaded = true;
                        return Ok(handle);
                    }
                    Err(e) => Degradation::CacheRetrieval.handle(e),
                }
            } else {
                debug!(
                    cache = %record.cache_name,
                    "cache record invalid (expired or document changed), recreating"
                );
            }
        }

        let preamble = build_preamble(bytes.len());
        let handle = self
            .api
            .create_cache(&bytes, &preamble, SYSTEM_INSTRUCTION, self.scope.ttl())
            .await?;

        let record = CacheRecord {
            cache_name: handle.name.clone(),
            created_at: Utc::now(),
            pdf_hash: hash,
            ttl_hours: self.scope.ttl_hours(),
        };
        if let Some(store) = &self.store {
            store.save(&record);
        }
        *slot = Some(record);

        // Creation cost: the cached payload is billed once as input and once
        // as cache tokens, plus the flat PDF fee and storage for the TTL.
        let cached_tokens = estimate_tokens(base64_len(bytes.len())) + estimate_tokens(preamble.len());
        self.cost.record(
            &mut session.ledger,
            &CostEvent {
                operation: "cache_creation".into(),
                input_tokens: cached_tokens,
                output_tokens: 0,
                pdf_count: 1,
                cache_tokens: cached_tokens,
                cache_hours: self.scope.ttl_hours(),
            },
        );
        info!(cache = %handle.name, scope = ?self.scope, "created remote content cache");

        session.cache = Some(handle.clone());
        session.document_loaded = true;
        Ok(handle)
    }

    /// Human-readable cache status for the CLI: absent, expired, or valid
    /// with the remaining time as `M:SS`.
    pub async fn status_line(&self) -> String {
        let slot = self.record.lock().await;
        let record = match slot.clone() {
            Some(record) => Some(record),
            None => self.store.as_ref().and_then(|s| s.load()),
        };
        let Some(record) = record else {
            return "no cache".into();
        };
        let ttl_secs = record.ttl_hours * 3600.0;
        let elapsed = (Utc::now() - record.created_at).num_milliseconds() as f64 / 1000.0;
        if elapsed >= ttl_secs {
            return "cache expired".into();
        }
        let remaining = (ttl_secs - elapsed) as u64;
        format!("cache valid ({}:{:02} remaining)", remaining / 60, remaining % 60)
    }
}

/// SHA-256 hex digest of the document bytes.
fn document_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Length of the base64 encoding of `n` raw bytes.
fn base64_len(n: usize) -> usize {
    n.div_ceil(3) * 4
}

/// Build the text part that precedes the PDF in the cached content,
/// appending filler sentences when the document alone would fall under
/// [`MIN_CACHE_TOKENS`].
fn build_preamble(document_bytes: usize) -> String {
    let doc_tokens = estimate_tokens(base64_len(document_bytes));
    if doc_tokens >= MIN_CACHE_TOKENS {
        return PREAMBLE.to_string();
    }
    let deficit_bytes = (MIN_CACHE_TOKENS - doc_tokens) as usize * 4;
    let repeats = deficit_bytes.div_ceil(PADDING_SENTENCE.len());
    format!("{} {}", PREAMBLE, PADDING_SENTENCE.repeat(repeats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::{Pricing, TierMode, UsageLedger};
    use crate::provider::mock::MockModel;

    fn manager(api: Arc<MockModel>, scope: CacheScope, store: Option<CacheStatusStore>) -> CacheManager {
        CacheManager::new(
            api,
            scope,
            store,
            CostModel::new(Pricing::default(), TierMode::Standard, None),
        )
    }

    fn doc(bytes: &[u8]) -> DocumentSource {
        DocumentSource::Bytes(bytes.to_vec())
    }

    /// Backdate the in-memory record by `secs` to simulate elapsed time.
    async fn backdate(m: &CacheManager, secs: i64) {
        let mut slot = m.record.lock().await;
        let record = slot.as_mut().expect("no record to backdate");
        record.created_at -= chrono::Duration::seconds(secs);
    }

    #[tokio::test]
    async fn test_first_call_creates_cache_and_records_cost() {
        let api = Arc::new(MockModel::new());
        let m = manager(api.clone(), CacheScope::PerSession, None);
        let mut session = SessionState::new();

        let handle = m.ensure_cache(&doc(b"%PDF- tiny"), &mut session).await.unwrap();

        assert_eq!(handle.name, "cachedContents/mock-1");
        assert_eq!(api.caches_created(), 1);
        assert!(session.document_loaded);
        assert_eq!(session.cache.as_ref().unwrap().name, handle.name);
        // Creation is a billable event: flat PDF fee + TTL storage at least.
        assert!(session.ledger.total_cost > 0.10);
        assert!(session.ledger.total_input_tokens >= MIN_CACHE_TOKENS);
    }

    #[tokio::test]
    async fn test_ensure_cache_is_idempotent_while_valid() {
        let api = Arc::new(MockModel::new());
        let m = manager(api.clone(), CacheScope::PerSession, None);
        let mut session = SessionState::new();

        let h1 = m.ensure_cache(&doc(b"doc"), &mut session).await.unwrap();
        let ledger_after_create = session.ledger.clone();
        let h2 = m.ensure_cache(&doc(b"doc"), &mut session).await.unwrap();

        assert_eq!(h1.name, h2.name);
        assert_eq!(api.caches_created(), 1, "no spurious recreation");
        assert_eq!(session.ledger, ledger_after_create, "reuse is free");
    }

    #[tokio::test]
    async fn test_ttl_scenario_t0_t300_t601() {
        // TTL = 600 s (per-session). Valid at t=300, recreated at t=601.
        let api = Arc::new(MockModel::new());
        let m = manager(api.clone(), CacheScope::PerSession, None);
        let mut session = SessionState::new();

        let r1 = m.ensure_cache(&doc(b"doc"), &mut session).await.unwrap();

        backdate(&m, 300).await;
        let still_r1 = m.ensure_cache(&doc(b"doc"), &mut session).await.unwrap();
        assert_eq!(still_r1.name, r1.name);

        backdate(&m, 301).await; // total elapsed 601 s
        let r2 = m.ensure_cache(&doc(b"doc"), &mut session).await.unwrap();
        assert_ne!(r2.name, r1.name);
        assert_eq!(api.caches_created(), 2);
    }

    #[tokio::test]
    async fn test_exact_ttl_boundary_is_expired() {
        let api = Arc::new(MockModel::new());
        let m = manager(api.clone(), CacheScope::PerSession, None);
        let mut session = SessionState::new();

        m.ensure_cache(&doc(b"doc"), &mut session).await.unwrap();
        backdate(&m, 600).await;
        m.ensure_cache(&doc(b"doc"), &mut session).await.unwrap();

        assert_eq!(api.caches_created(), 2, "boundary counts as expired");
    }

    #[tokio::test]
    async fn test_single_byte_document_change_forces_recreation() {
        let api = Arc::new(MockModel::new());
        let m = manager(api.clone(), CacheScope::PerSession, None);
        let mut session = SessionState::new();

        let h1 = m.ensure_cache(&doc(b"document v1"), &mut session).await.unwrap();
        let h2 = m.ensure_cache(&doc(b"document v2"), &mut session).await.unwrap();

        assert_ne!(h1.name, h2.name);
        assert_eq!(api.caches_created(), 2);
        // The old identifier is fully superseded.
        let slot = m.record.lock().await;
        assert_eq!(slot.as_ref().unwrap().cache_name, h2.name);
    }

    #[tokio::test]
    async fn test_retrieval_failure_falls_through_to_recreation() {
        let api = Arc::new(MockModel::new());
        let m = manager(api.clone(), CacheScope::PerSession, None);
        let mut session = SessionState::new();

        m.ensure_cache(&doc(b"doc"), &mut session).await.unwrap();
        api.fail_get_cache(true);
        // Record is still valid; only the remote retrieval fails. Must not
        // propagate — recreate instead.
        let handle = m.ensure_cache(&doc(b"doc"), &mut session).await.unwrap();

        assert_eq!(handle.name, "cachedContents/mock-2");
        assert_eq!(api.caches_created(), 2);
    }

    #[tokio::test]
    async fn test_global_scope_persists_and_reuses_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStatusStore::new(dir.path().join("status.json"));
        let api = Arc::new(MockModel::new());
        let mut session = SessionState::new();

        let m1 = manager(api.clone(), CacheScope::Global, Some(store.clone()));
        let h1 = m1.ensure_cache(&doc(b"shared doc"), &mut session).await.unwrap();

        let saved = store.load().expect("record persisted");
        assert_eq!(saved.cache_name, h1.name);
        assert_eq!(saved.ttl_hours, 24.0);

        // A fresh manager (new process) picks the record up from disk.
        let m2 = manager(api.clone(), CacheScope::Global, Some(store));
        let h2 = m2.ensure_cache(&doc(b"shared doc"), &mut session).await.unwrap();
        assert_eq!(h2.name, h1.name);
        assert_eq!(api.caches_created(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_file_is_fatal() {
        let api = Arc::new(MockModel::new());
        let m = manager(api.clone(), CacheScope::PerSession, None);
        let mut session = SessionState::new();

        let missing = DocumentSource::File(PathBuf::from("/definitely/not/here.pdf"));
        let err = m.ensure_cache(&missing, &mut session).await.unwrap_err();

        assert!(matches!(err, ChatError::Document(_)));
        assert_eq!(api.caches_created(), 0);
    }

    #[tokio::test]
    async fn test_status_line_transitions() {
        let api = Arc::new(MockModel::new());
        let m = manager(api.clone(), CacheScope::PerSession, None);
        let mut session = SessionState::new();

        assert_eq!(m.status_line().await, "no cache");
        m.ensure_cache(&doc(b"doc"), &mut session).await.unwrap();
        assert!(m.status_line().await.starts_with("cache valid ("));
        backdate(&m, 601).await;
        assert_eq!(m.status_line().await, "cache expired");
    }

    #[test]
    fn test_small_document_preamble_is_padded_past_floor() {
        let preamble = build_preamble(100);
        assert!(preamble.contains(PADDING_SENTENCE.trim_end()));
        assert!(estimate_tokens(preamble.len()) + estimate_tokens(base64_len(100)) >= MIN_CACHE_TOKENS);
    }

    #[test]
    fn test_large_document_preamble_is_unpadded() {
        // 20 kB document → ~6667 estimated tokens, over the floor.
        let preamble = build_preamble(20_000);
        assert_eq!(preamble, PREAMBLE);
    }

    #[test]
    fn test_document_hash_is_content_sensitive() {
        let h1 = document_hash(b"document v1");
        let h2 = document_hash(b"document v2");
        assert_ne!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn test_scope_ttls() {
        assert_eq!(CacheScope::PerSession.ttl(), Duration::from_secs(600));
        assert_eq!(CacheScope::Global.ttl(), Duration::from_secs(86_400));
        assert!((CacheScope::PerSession.ttl_hours() - 1.0 / 6.0).abs() < 1e-12);
        assert_eq!(CacheScope::Global.ttl_hours(), 24.0);
    }

    #[tokio::test]
    async fn test_creation_cost_matches_cost_model() {
        let api = Arc::new(MockModel::new());
        let m = manager(api.clone(), CacheScope::PerSession, None);
        let mut session = SessionState::new();

        let bytes = b"%PDF- small document";
        m.ensure_cache(&doc(bytes), &mut session).await.unwrap();

        let preamble = build_preamble(bytes.len());
        let expected_tokens =
            estimate_tokens(base64_len(bytes.len())) + estimate_tokens(preamble.len());
        assert_eq!(session.ledger.total_input_tokens, expected_tokens);
        assert_eq!(session.ledger.total_output_tokens, 0);

        let cost = CostModel::new(Pricing::default(), TierMode::Standard, None);
        let mut expected_ledger = UsageLedger::default();
        cost.record(
            &mut expected_ledger,
            &CostEvent {
                operation: "cache_creation".into(),
                input_tokens: expected_tokens,
                output_tokens: 0,
                pdf_count: 1,
                cache_tokens: expected_tokens,
                cache_hours: CacheScope::PerSession.ttl_hours(),
            },
        );
        assert!((session.ledger.total_cost - expected_ledger.total_cost).abs() < 1e-12);
    }
}
