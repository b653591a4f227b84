//! # Configuration
//!
//! Aggregator settings loaded from TOML or JSON, with an env-path override:
//! 1. `$LOCALPULSE_CONFIG_PATH`
//! 2. `config/aggregator.toml`
//! 3. `config/aggregator.json`
//! 4. built-in defaults
//!
//! All fields have defaults, so a partial config file is fine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::policy::RetryPolicy;
use crate::types::BoundingBox;

const ENV_PATH: &str = "LOCALPULSE_CONFIG_PATH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Cache namespace directory.
    pub cache_dir: PathBuf,
    /// Cache freshness window in seconds.
    pub freshness_secs: u64,
    /// Extra retry attempts per source.
    pub retry_attempts: u32,
    /// Linear backoff base in milliseconds.
    pub retry_backoff_ms: u64,
    /// Cap on summed backoff in milliseconds.
    pub max_total_backoff_ms: u64,
    /// HTTP timeout per query-style request (feature service, catalog
    /// search) in seconds.
    pub request_timeout_secs: u64,
    /// HTTP timeout for whole-file bulk downloads in seconds.
    pub bulk_timeout_secs: u64,
    /// Per-source task timeout in seconds (covers retries + backoff).
    pub source_timeout_secs: u64,
    /// Whole-aggregate deadline in seconds.
    pub aggregate_timeout_secs: u64,
    /// Default area of interest when a query carries no bbox of its own.
    pub default_bbox: BoundingBox,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("data/cache"),
            freshness_secs: 3600,
            retry_attempts: 1,
            retry_backoff_ms: 500,
            max_total_backoff_ms: 3000,
            request_timeout_secs: 30,
            bulk_timeout_secs: 60,
            source_timeout_secs: 75,
            aggregate_timeout_secs: 90,
            default_bbox: BoundingBox::coral_gables(),
        }
    }
}

impl AggregatorConfig {
    /// Load using the env override and the `config/` fallbacks; defaults
    /// when nothing is present. `.env` is honored for the env override.
    pub fn load_default() -> Result<Self> {
        dotenvy::dotenv().ok();
        if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_PATH} points to non-existent path"));
        }
        let toml_p = PathBuf::from("config/aggregator.toml");
        if toml_p.exists() {
            return Self::load_from(&toml_p);
        }
        let json_p = PathBuf::from("config/aggregator.json");
        if json_p.exists() {
            return Self::load_from(&json_p);
        }
        Ok(Self::default())
    }

    /// Load from an explicit path; format inferred from the extension,
    /// with a content-based fallback.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        parse_config(&content, &ext)
    }

    pub fn freshness(&self) -> Duration {
        Duration::from_secs(self.freshness_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn bulk_timeout(&self) -> Duration {
        Duration::from_secs(self.bulk_timeout_secs)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }

    pub fn aggregate_timeout(&self) -> Duration {
        Duration::from_secs(self.aggregate_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts,
            backoff: Duration::from_millis(self.retry_backoff_ms),
            max_total_backoff: Duration::from_millis(self.max_total_backoff_ms),
        }
    }
}

fn parse_config(s: &str, hint_ext: &str) -> Result<AggregatorConfig> {
    if hint_ext == "json" || s.trim_start().starts_with('{') {
        if let Ok(cfg) = serde_json::from_str(s) {
            return Ok(cfg);
        }
    }
    toml::from_str(s).map_err(|e| anyhow!("unsupported config format: {e}"))
}
