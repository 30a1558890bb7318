//! Configuration: TOML file with environment overrides.
//!
//! Everything a deployment may need to change without a rebuild lives here —
//! most importantly the five pricing rates, which must never be inline
//! constants. The API key is resolved at client construction time (config
//! value first, then `GEMINI_API_KEY` / `GOOGLE_API_KEY`); `.env` files are
//! loaded by the binary at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cache::CacheStatusStore;
use crate::cost::{Pricing, TierMode};
use crate::error::{ChatError, Result};
use crate::provider::gemini::DEFAULT_GEMINI_MODEL;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Gemini model identifier.
    pub model: String,
    /// Explicit API key. Usually left unset in favor of the environment.
    pub api_key: Option<String>,
    /// Dollar rates for the five billing dimensions.
    pub pricing: Pricing,
    /// Input/output rate tier policy.
    pub tier_mode: TierMode,
    /// Cache-status record location (global-cache variant).
    pub status_file: Option<PathBuf>,
    /// Append-only cost log location.
    pub cost_log: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: DEFAULT_GEMINI_MODEL.to_string(),
            api_key: None,
            pricing: Pricing::default(),
            tier_mode: TierMode::default(),
            status_file: None,
            cost_log: None,
        }
    }
}

impl Config {
    /// Default config location: `~/.pdfchat/config.toml`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".pdfchat")
            .join("config.toml")
    }

    /// Load configuration.
    ///
    /// An explicitly passed path must exist and parse; the default path is
    /// optional and silently falls back to defaults when absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::from_file(&default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| ChatError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        toml::from_str(&data)
            .map_err(|e| ChatError::Config(format!("invalid config {}: {}", path.display(), e)))
    }

    /// Resolved cache-status path for the global variant.
    pub fn status_path(&self) -> PathBuf {
        self.status_file
            .clone()
            .unwrap_or_else(CacheStatusStore::default_path)
    }

    /// Resolved cost-log path.
    pub fn cost_log_path(&self) -> PathBuf {
        self.cost_log.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".pdfchat")
                .join("api_calls.log")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.model, DEFAULT_GEMINI_MODEL);
        assert!(cfg.api_key.is_none());
        assert_eq!(cfg.pricing.input_per_1m, 0.35);
        assert_eq!(cfg.tier_mode, TierMode::Auto);
    }

    #[test]
    fn test_partial_toml_overrides_merge_with_defaults() {
        let toml = r#"
            model = "gemini-2.5-pro"

            [pricing]
            input_per_1m = 0.50
        "#;
        let cfg: Config = toml::from_str(toml).unwrap();
        assert_eq!(cfg.model, "gemini-2.5-pro");
        assert_eq!(cfg.pricing.input_per_1m, 0.50);
        // Untouched rates keep their defaults.
        assert_eq!(cfg.pricing.output_per_1m, 1.50);
        assert_eq!(cfg.pricing.storage_per_hour, 1.00);
    }

    #[test]
    fn test_load_explicit_missing_path_is_an_error() {
        let err = Config::load(Some(Path::new("/no/such/config.toml"))).unwrap_err();
        assert!(matches!(err, ChatError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "tier_mode = \"large_context\"\n").unwrap();
        let cfg = Config::load(Some(&path)).unwrap();
        assert_eq!(cfg.tier_mode, TierMode::LargeContext);
    }
}
