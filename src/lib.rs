//! Bilingual (English/Telugu) PDF question-answering over a remote context
//! cache, with per-call cost accounting.
//!
//! The crate is a thin orchestration layer over the Gemini context-caching
//! API. A PDF is uploaded once into a server-side cache; repeated questions
//! are answered against that cache, and every billable call is priced across
//! four dimensions (input tokens, output tokens, cache tokens, storage
//! hours) plus a flat per-PDF fee.
//!
//! The interesting parts:
//! - [`cache::CacheManager`] — when is a remote cache still valid, when must
//!   it be recreated, and how is a changed document detected.
//! - [`cost::CostModel`] — the pricing table and the running ledger.
//! - [`chat::ConversationService`] — full-transcript replay and the
//!   bilingual prompt.
//! - [`provider::ModelApi`] — the remote service behind a trait, with a
//!   Gemini REST implementation and a test mock.

pub mod cache;
pub mod chat;
pub mod config;
pub mod cost;
pub mod error;
pub mod provider;
pub mod session;

pub use cache::{CacheManager, CacheScope, CacheStatusStore, DocumentSource};
pub use chat::ConversationService;
pub use config::Config;
pub use cost::{CostModel, Pricing, TierMode, UsageLedger};
pub use error::{ChatError, Result};
pub use provider::{CacheHandle, GeminiClient, ModelApi};
pub use session::{ChatTurn, SessionState};
