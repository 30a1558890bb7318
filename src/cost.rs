//! Cost model: pricing table, tier selection, usage ledger, cost log.
//!
//! Every billable API call maps to a [`CostEvent`] with five quantities
//! (input tokens, output tokens, PDF count, cache tokens, storage hours).
//! [`CostModel::breakdown`] turns an event into a five-term [`CostBreakdown`],
//! each term linear in its quantity; [`CostModel::record`] additionally bumps
//! the session [`UsageLedger`] and appends a human-readable line to the cost
//! log file (best-effort — a failed write never fails the call).
//!
//! Two rate tiers exist for input/output tokens: standard and large-context.
//! [`select_tier`] is the single place that decides which applies. Cache-token
//! cost always uses the flat cache rate regardless of tier.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};

/// Prompt-token count above which `TierMode::Auto` switches to the
/// large-context input/output rates.
pub const LARGE_CONTEXT_THRESHOLD: u64 = 128_000;

/// Byte-length heuristic: roughly four bytes of text per token.
///
/// Used wherever an exact remote `count_tokens` call is unavailable or fails.
pub fn estimate_tokens(byte_len: usize) -> u64 {
    (byte_len / 4) as u64
}

// ============================================================================
// Pricing
// ============================================================================

/// Dollar rates for the five billing dimensions.
///
/// All rates are configuration, never inline constants, so deployments can
/// track vendor pricing changes without code changes. Token rates are USD per
/// one million tokens; storage is USD per cache-hour; the PDF fee is flat per
/// file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pricing {
    /// Input tokens, standard tier (USD / 1M tokens).
    pub input_per_1m: f64,
    /// Output tokens, standard tier (USD / 1M tokens).
    pub output_per_1m: f64,
    /// Input tokens, large-context tier (USD / 1M tokens).
    pub input_per_1m_large: f64,
    /// Output tokens, large-context tier (USD / 1M tokens).
    pub output_per_1m_large: f64,
    /// Cached content tokens (USD / 1M tokens). Not tiered.
    pub cache_per_1m: f64,
    /// Cache storage (USD / hour).
    pub storage_per_hour: f64,
    /// Flat fee per PDF file processed (USD).
    pub pdf_flat_fee: f64,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            input_per_1m: 0.35,
            output_per_1m: 1.50,
            input_per_1m_large: 0.70,
            output_per_1m_large: 3.00,
            cache_per_1m: 0.025,
            storage_per_hour: 1.00,
            pdf_flat_fee: 0.10,
        }
    }
}

/// Which input/output rate pair applies to a cost event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PricingTier {
    Standard,
    LargeContext,
}

/// Configured tier policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TierMode {
    /// Always bill at the standard rates.
    Standard,
    /// Always bill at the large-context rates.
    LargeContext,
    /// Bill large-context rates when the prompt exceeds
    /// [`LARGE_CONTEXT_THRESHOLD`] tokens (default).
    #[default]
    Auto,
}

/// The single tier-selection rule: a function of the configured mode and the
/// prompt-token count, and nothing else.
///
/// Exactly `LARGE_CONTEXT_THRESHOLD` tokens is still standard tier — the
/// large-context rates apply strictly above the threshold.
pub fn select_tier(mode: TierMode, prompt_tokens: u64) -> PricingTier {
    match mode {
        TierMode::Standard => PricingTier::Standard,
        TierMode::LargeContext => PricingTier::LargeContext,
        TierMode::Auto => {
            if prompt_tokens > LARGE_CONTEXT_THRESHOLD {
                PricingTier::LargeContext
            } else {
                PricingTier::Standard
            }
        }
    }
}

// ============================================================================
// Events and breakdowns
// ============================================================================

/// The billable quantities of a single API call.
#[derive(Debug, Clone, Default)]
pub struct CostEvent {
    /// Operation tag for the log ("cache_creation", "query", ...).
    pub operation: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub pdf_count: u32,
    pub cache_tokens: u64,
    /// Storage hours. Negative or non-finite values are clamped to zero.
    pub cache_hours: f64,
}

/// Per-term dollar cost of one event. Ephemeral — computed, never stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostBreakdown {
    pub input_cost: f64,
    pub output_cost: f64,
    pub pdf_cost: f64,
    pub cache_cost: f64,
    pub storage_cost: f64,
}

impl CostBreakdown {
    /// Total dollar cost of the event.
    pub fn total(&self) -> f64 {
        self.input_cost + self.output_cost + self.pdf_cost + self.cache_cost + self.storage_cost
    }
}

fn clamp_hours(hours: f64) -> f64 {
    if hours.is_finite() && hours > 0.0 {
        hours
    } else {
        0.0
    }
}

// ============================================================================
// CostModel
// ============================================================================

/// Pure cost computation plus ledger/log side channels.
///
/// `breakdown()` is deterministic and side-effect free; `record()` is the
/// only mutating entry point and is what callers use after a completed call.
#[derive(Debug, Clone)]
pub struct CostModel {
    pricing: Pricing,
    tier_mode: TierMode,
    /// Append-only human-readable cost log. `None` disables file logging.
    log_path: Option<PathBuf>,
}

impl CostModel {
    pub fn new(pricing: Pricing, tier_mode: TierMode, log_path: Option<PathBuf>) -> Self {
        Self {
            pricing,
            tier_mode,
            log_path,
        }
    }

    /// Compute the five-term breakdown for an event.
    ///
    /// The tier (selected from the event's input-token count) applies to the
    /// input and output terms only; cache tokens are always billed at the
    /// flat cache rate.
    pub fn breakdown(&self, event: &CostEvent) -> CostBreakdown {
        let tier = select_tier(self.tier_mode, event.input_tokens);
        let (rate_in, rate_out) = match tier {
            PricingTier::Standard => (self.pricing.input_per_1m, self.pricing.output_per_1m),
            PricingTier::LargeContext => (
                self.pricing.input_per_1m_large,
                self.pricing.output_per_1m_large,
            ),
        };
        CostBreakdown {
            input_cost: (event.input_tokens as f64 / 1_000_000.0) * rate_in,
            output_cost: (event.output_tokens as f64 / 1_000_000.0) * rate_out,
            pdf_cost: f64::from(event.pdf_count) * self.pricing.pdf_flat_fee,
            cache_cost: (event.cache_tokens as f64 / 1_000_000.0) * self.pricing.cache_per_1m,
            storage_cost: clamp_hours(event.cache_hours) * self.pricing.storage_per_hour,
        }
    }

    /// Total dollar cost for raw quantities. Convenience over
    /// [`CostModel::breakdown`].
    pub fn calculate_cost(
        &self,
        input_tokens: u64,
        output_tokens: u64,
        pdf_count: u32,
        cache_tokens: u64,
        cache_hours: f64,
    ) -> f64 {
        self.breakdown(&CostEvent {
            operation: String::new(),
            input_tokens,
            output_tokens,
            pdf_count,
            cache_tokens,
            cache_hours,
        })
        .total()
    }

    /// Record a completed event: bump the ledger, append a log line, and
    /// return the event's dollar cost.
    ///
    /// The file append is best-effort; a write failure is logged and
    /// swallowed.
    pub fn record(&self, ledger: &mut UsageLedger, event: &CostEvent) -> f64 {
        let cost = self.breakdown(event).total();
        ledger.total_input_tokens += event.input_tokens;
        ledger.total_output_tokens += event.output_tokens;
        ledger.total_cost += cost;

        info!(
            operation = %event.operation,
            input_tokens = event.input_tokens,
            output_tokens = event.output_tokens,
            cost = %format!("${:.4}", cost),
            running_total = %format!("${:.4}", ledger.total_cost),
            "API call cost recorded",
        );

        self.append_log_line(event, cost, ledger.total_cost);
        cost
    }

    fn append_log_line(&self, event: &CostEvent, cost: f64, running_total: f64) {
        let Some(path) = &self.log_path else {
            return;
        };
        let line = format!(
            "{} | {} | input={} output={} pdfs={} cache_tokens={} cache_hours={:.2} | cost=${:.4} total=${:.4}\n",
            chrono::Utc::now().to_rfc3339(),
            event.operation,
            event.input_tokens,
            event.output_tokens,
            event.pdf_count,
            event.cache_tokens,
            clamp_hours(event.cache_hours),
            cost,
            running_total,
        );
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut f| f.write_all(line.as_bytes()));
        if let Err(e) = result {
            warn!("failed to append cost log at {}: {}", path.display(), e);
        }
    }
}

// ============================================================================
// UsageLedger
// ============================================================================

/// Session-scoped running totals. Increment-only; cleared only by a full
/// session reset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageLedger {
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cost: f64,
}

impl UsageLedger {
    /// One-line summary for the CLI (`/cost` command).
    pub fn summary(&self) -> String {
        format!(
            "tokens: {} in, {} out | total cost: ${:.4}",
            self.total_input_tokens, self.total_output_tokens, self.total_cost
        )
    }
}
