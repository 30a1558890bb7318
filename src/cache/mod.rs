//! Remote content-cache lifecycle and its persisted status record.

pub mod lifecycle;
pub mod status;

pub use lifecycle::{CacheManager, CacheScope, DocumentSource};
pub use status::{CacheRecord, CacheStatusStore};
