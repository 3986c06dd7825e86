use std::env;

use crate::types::CollectionMode;

/// Application configuration loaded from environment variables.
///
/// Controller tuning (thresholds, step sizes) lives on `ControllerConfig`
/// in the collector crate; this covers process-level settings only.
#[derive(Debug, Clone)]
pub struct Config {
    /// `tracing` env-filter directive, e.g. `feedrank=info`.
    pub log_filter: String,

    /// Mode used when a session does not specify one.
    pub default_mode: CollectionMode,

    /// Base settle delay in milliseconds between advance and re-scan.
    pub settle_ms: u64,
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults — nothing here is required.
    pub fn from_env() -> Self {
        Self {
            log_filter: env::var("FEEDRANK_LOG").unwrap_or_else(|_| "feedrank=info".to_string()),
            default_mode: env::var("FEEDRANK_MODE")
                .ok()
                .and_then(|m| m.parse().ok())
                .unwrap_or(CollectionMode::Precision),
            settle_ms: env::var("FEEDRANK_SETTLE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(600),
        }
    }
}
