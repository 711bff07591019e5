use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::playlist::LinkStatus;

/// How the verifier probes a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VerifyStrategy {
    /// Single HEAD request; 403 falls back to GET within the same attempt
    HeadOnly,
    /// GET; sub-playlists must start with a playlist marker
    GetAndSniff,
    /// URL syntax only, no network I/O
    FormatOnly,
}

impl Default for VerifyStrategy {
    fn default() -> Self {
        Self::GetAndSniff
    }
}

impl std::str::FromStr for VerifyStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "head" | "headonly" | "head_only" => Ok(Self::HeadOnly),
            "get" | "getandsniff" | "get_and_sniff" | "sniff" => Ok(Self::GetAndSniff),
            "format" | "formatonly" | "format_only" => Ok(Self::FormatOnly),
            other => Err(format!("unknown verify strategy: {}", other)),
        }
    }
}

/// Verification settings
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    pub strategy: VerifyStrategy,
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Extra attempts after a transient failure
    pub retries: u32,
    /// Fixed pause between attempts
    pub backoff: Duration,
    /// Worker pool width for batches
    pub workers: usize,
    /// Bytes of a sub-playlist read before giving up on the marker
    pub sniff_bytes: usize,
    pub max_redirects: usize,
    /// Client identity used when the entry carries none
    pub user_agent: String,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            strategy: VerifyStrategy::default(),
            timeout: Duration::from_secs(8),
            retries: 2,
            backoff: Duration::from_millis(500),
            workers: 10,
            sniff_bytes: 4096,
            max_redirects: 10,
            user_agent: "VLC/3.0.20 LibVLC/3.0.20".to_string(),
        }
    }
}

/// Result of checking one link
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutcome {
    pub status: LinkStatus,
    /// Attempt trace, one segment per attempt joined with `TRACE_SEPARATOR`
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_secs: Option<f64>,
    pub checked_at: DateTime<Utc>,
}

/// Separator between attempt segments in `CheckOutcome::details`
pub const TRACE_SEPARATOR: &str = " | ";

impl CheckOutcome {
    pub fn attempts(&self) -> impl Iterator<Item = &str> {
        self.details.split(TRACE_SEPARATOR).filter(|s| !s.is_empty())
    }
}

/// Incremental report for one completed unit of a verification batch
#[derive(Debug, Clone)]
pub struct BatchProgress {
    /// Position of the entry in the submitted batch
    pub index: usize,
    pub outcome: CheckOutcome,
    /// Units finished so far, this one included
    pub completed: usize,
    pub total: usize,
}

/// Static trustworthiness assessment of a URL
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkQuality {
    /// 0..=100
    pub score: u8,
    pub is_https: bool,
    pub is_stable: bool,
    pub is_safe: bool,
    pub domain: String,
    pub issues: Vec<String>,
    pub positives: Vec<String>,
}
