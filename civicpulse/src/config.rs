//! Environment-driven service configuration
//!
//! All knobs come from the environment with workable defaults, so the
//! binary runs in a dev shell with no setup. Channel credentials are
//! optional by design: without them the dispatcher degrades to audit-only
//! failure records instead of refusing to start.

use std::path::PathBuf;

/// Outbound messaging channel credentials
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Provider send endpoint
    pub api_url: String,
    pub api_key: String,
    /// Service's own sender address, canonical international form
    pub from_address: String,
}

/// Top-level service configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite database path
    pub store_path: PathBuf,
    /// Outbound channel; `None` when credentials are absent
    pub channel: Option<ChannelConfig>,
    /// Prefix assumed for bare domestic phone numbers
    pub default_country_code: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_path: std::env::var("CIVICPULSE_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("civicpulse.db")),
            channel: Self::channel_from_env(),
            default_country_code: std::env::var("CIVICPULSE_COUNTRY_CODE")
                .unwrap_or_else(|_| "+91".into()),
        }
    }
}

impl AppConfig {
    /// All three channel variables must be present, or the channel stays off
    fn channel_from_env() -> Option<ChannelConfig> {
        let api_url = std::env::var("CIVICPULSE_CHANNEL_URL").ok()?;
        let api_key = std::env::var("CIVICPULSE_CHANNEL_KEY").ok()?;
        let from_address = std::env::var("CIVICPULSE_CHANNEL_FROM").ok()?;
        Some(ChannelConfig {
            api_url,
            api_key,
            from_address,
        })
    }
}
