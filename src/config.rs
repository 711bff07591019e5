use std::env;
use std::time::Duration;

use crate::models::{VerifyConfig, VerifyStrategy};
use crate::services::resolver::ScoreWeights;

/// Library configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Source fetching
    pub user_agent: String,
    pub fetch_timeout_ms: u64,
    pub max_retries: u32,
    pub max_playlist_size_mb: usize,

    // Program guide
    pub epg_url: Option<String>,
    pub epg_cache_dir: String,
    pub epg_cache_max_age_hours: u64,
    pub tag_identities: bool,

    // Verification
    pub verify_strategy: VerifyStrategy,
    pub verify_timeout_ms: u64,
    pub verify_retries: u32,
    pub verify_backoff_ms: u64,
    pub verify_workers: usize,
    pub verify_sniff_bytes: usize,
    pub verify_max_redirects: usize,

    // Scoring
    pub https_priority: bool,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

impl Config {
    /// Load `.env` (if present) and then read the environment
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            // Misc - Use VLC user agent to avoid IPTV server blocks
            user_agent: env::var("USER_AGENT")
                .unwrap_or_else(|_| "VLC/3.0.20 LibVLC/3.0.20".to_string()),
            fetch_timeout_ms: env_or("FETCH_TIMEOUT_MS", 60_000), // 1 minute
            max_retries: env_or("MAX_RETRIES", 2),
            max_playlist_size_mb: env_or("MAX_PLAYLIST_SIZE_MB", 200),

            epg_url: env::var("EPG_URL").ok().filter(|v| !v.trim().is_empty()),
            epg_cache_dir: env::var("EPG_CACHE_DIR").unwrap_or_else(|_| ".epg-cache".to_string()),
            epg_cache_max_age_hours: env_or("EPG_CACHE_MAX_AGE_HOURS", 168), // 7 days
            tag_identities: env_flag("TAG_IDENTITIES", true),

            verify_strategy: env::var("VERIFY_STRATEGY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
            verify_timeout_ms: env_or("VERIFY_TIMEOUT_MS", 8_000),
            verify_retries: env_or("VERIFY_RETRIES", 2),
            verify_backoff_ms: env_or("VERIFY_BACKOFF_MS", 500),
            verify_workers: env_or("VERIFY_WORKERS", 10),
            verify_sniff_bytes: env_or("VERIFY_SNIFF_BYTES", 4096),
            verify_max_redirects: env_or("VERIFY_MAX_REDIRECTS", 10),

            https_priority: env_flag("HTTPS_PRIORITY", true),
        }
    }

    /// Freshness window for the guide cache artifact
    pub fn epg_cache_max_age(&self) -> chrono::Duration {
        chrono::Duration::hours(self.epg_cache_max_age_hours as i64)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Verification settings derived from this configuration
    pub fn verify_config(&self) -> VerifyConfig {
        VerifyConfig {
            strategy: self.verify_strategy,
            timeout: Duration::from_millis(self.verify_timeout_ms),
            retries: self.verify_retries,
            backoff: Duration::from_millis(self.verify_backoff_ms),
            workers: self.verify_workers.max(1),
            sniff_bytes: self.verify_sniff_bytes,
            max_redirects: self.verify_max_redirects,
            user_agent: self.user_agent.clone(),
        }
    }

    /// Scoring weights derived from this configuration
    pub fn score_weights(&self) -> ScoreWeights {
        ScoreWeights {
            https_priority: self.https_priority,
            ..ScoreWeights::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
