//! Persisted cache-status record for the global-cache variant.
//!
//! One JSON file, one record, overwritten wholesale on every save. The
//! record is the durable half of the cache lifecycle: it remembers which
//! remote cache belongs to which document revision and when it was created.
//!
//! Both operations fail soft. A record that cannot be read or parsed is
//! treated as absent (forcing recreation); a record that cannot be written
//! is logged and forgotten — the in-memory handle keeps the current process
//! working, and durability is best-effort only.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::Degradation;

/// The persisted cache-status record.
///
/// Superseded, never mutated: when revalidation fails, a freshly built
/// record replaces this one wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Server-assigned cache resource name.
    pub cache_name: String,
    /// Creation time, serialized as an RFC-3339 string.
    pub created_at: DateTime<Utc>,
    /// SHA-256 hex digest of the source document at creation time.
    pub pdf_hash: String,
    /// Time-to-live in hours.
    pub ttl_hours: f64,
}

impl CacheRecord {
    /// The validity predicate: digest must match the current document AND
    /// elapsed time must be strictly less than the TTL. A record observed
    /// exactly at the TTL boundary counts as expired.
    pub fn is_valid(&self, current_hash: &str, now: DateTime<Utc>) -> bool {
        if self.pdf_hash != current_hash {
            return false;
        }
        let ttl_ms = (self.ttl_hours * 3_600_000.0) as i64;
        now - self.created_at < Duration::milliseconds(ttl_ms)
    }
}

/// Single-slot store for a [`CacheRecord`].
#[derive(Debug, Clone)]
pub struct CacheStatusStore {
    path: PathBuf,
}

impl CacheStatusStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location: `~/.pdfchat/cache_status.json`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".pdfchat")
            .join("cache_status.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record. Any read or parse failure is logged and treated as
    /// "no record"; a missing file is a silent `None`.
    pub fn load(&self) -> Option<CacheRecord> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                Degradation::StatusRead.handle(format_args!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                ));
                return None;
            }
        };
        match serde_json::from_str(&data) {
            Ok(record) => Some(record),
            Err(e) => {
                Degradation::StatusRead.handle(format_args!(
                    "{} is corrupt: {}",
                    self.path.display(),
                    e
                ));
                None
            }
        }
    }

    /// Overwrite the record. Failures are logged and swallowed.
    pub fn save(&self, record: &CacheRecord) {
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(record) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.path, json) {
                    Degradation::StatusWrite.handle(format_args!(
                        "failed to write {}: {}",
                        self.path.display(),
                        e
                    ));
                } else {
                    debug!(cache = %record.cache_name, "cache status saved");
                }
            }
            Err(e) => warn!("failed to serialize cache status: {}", e),
        }
    }
}
