use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::check::{CheckOutcome, LinkQuality};

/// Group assigned when a descriptor carries no group information
pub const DEFAULT_GROUP: &str = "Uncategorized";

/// Link health of a channel entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Pending,
    Checking,
    Working,
    Broken,
    /// Replaced by a resolved candidate; set by the host, never by the verifier
    Fixed,
    NoLink,
}

impl Default for LinkStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkStatus::Pending => write!(f, "pending"),
            LinkStatus::Checking => write!(f, "checking"),
            LinkStatus::Working => write!(f, "working"),
            LinkStatus::Broken => write!(f, "broken"),
            LinkStatus::Fixed => write!(f, "fixed"),
            LinkStatus::NoLink => write!(f, "nolink"),
        }
    }
}

/// Per-link playback options (`#EXTVLCOPT:key=value`), insertion ordered.
///
/// Inserting an existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkOptions(Vec<(String, String)>);

impl LinkOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for LinkOptions {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut options = LinkOptions::new();
        for (k, v) in iter {
            options.insert(k, v);
        }
        options
    }
}

/// One playlist record: descriptor line, optional link, metadata and check state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelEntry {
    /// Original `#EXTINF:` line, kept verbatim for round-trip fidelity
    pub raw_header: String,
    pub name: String,
    pub url: Option<String>,
    /// URL before a fix was applied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,
    pub group: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    /// External program-guide id (`tvg-id`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_id: Option<String>,
    #[serde(default)]
    pub link_options: LinkOptions,
    /// Comment lines between descriptor and URL that are not link options
    #[serde(default)]
    pub extra_lines: Vec<String>,
    pub status: LinkStatus,
    /// Origin of the entry; empty for the user's own playlist
    pub source: String,
    /// Source of the replacement once fixed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<LinkQuality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub check_details: String,
}

impl Default for ChannelEntry {
    /// An entry without a link is `NoLink`
    fn default() -> Self {
        Self {
            raw_header: String::new(),
            name: String::new(),
            url: None,
            original_url: None,
            group: DEFAULT_GROUP.to_string(),
            logo: None,
            identity_id: None,
            link_options: LinkOptions::default(),
            extra_lines: Vec::new(),
            status: LinkStatus::NoLink,
            source: String::new(),
            fixed_from: None,
            quality: None,
            response_time_secs: None,
            last_checked_at: None,
            check_details: String::new(),
        }
    }
}

impl ChannelEntry {
    /// Create an entry; status starts as `Pending`, or `NoLink` without a usable URL
    pub fn new(name: impl Into<String>, url: Option<String>) -> Self {
        let mut entry = Self {
            name: name.into(),
            ..Self::default()
        };
        entry.set_url(url);
        entry
    }

    /// Replace the link, keeping `status == NoLink` in sync with link presence
    pub fn set_url(&mut self, url: Option<String>) {
        self.url = url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty());
        if self.url.is_none() {
            self.status = LinkStatus::NoLink;
        } else if self.status == LinkStatus::NoLink {
            self.status = LinkStatus::Pending;
        }
    }

    pub fn has_link(&self) -> bool {
        self.url.is_some()
    }

    pub fn url_str(&self) -> &str {
        self.url.as_deref().unwrap_or("")
    }

    /// True when the entry should be handed to the resolver
    pub fn needs_resolution(&self) -> bool {
        matches!(self.status, LinkStatus::Broken | LinkStatus::NoLink)
    }

    /// Record a verification outcome
    pub fn apply_check(&mut self, outcome: &CheckOutcome) {
        self.status = if self.has_link() {
            outcome.status
        } else {
            LinkStatus::NoLink
        };
        self.check_details = outcome.details.clone();
        self.response_time_secs = outcome.response_time_secs;
        self.last_checked_at = Some(outcome.checked_at);
    }

    /// Take over the link of a resolved candidate.
    ///
    /// Returns false (and leaves the entry untouched) when the candidate has no
    /// link or carries the current or the original URL.
    pub fn apply_fix(&mut self, candidate: &ChannelEntry) -> bool {
        let Some(new_url) = candidate.url.clone() else {
            return false;
        };
        if self.url.as_deref() == Some(new_url.as_str())
            || self.original_url.as_deref() == Some(new_url.as_str())
        {
            return false;
        }

        if self.original_url.is_none() {
            self.original_url = self.url.clone();
        }
        self.url = Some(new_url);
        self.link_options = candidate.link_options.clone();
        if self.identity_id.is_none() {
            self.identity_id = candidate.identity_id.clone();
        }
        self.fixed_from = Some(candidate.source.clone());
        self.quality = candidate.quality.clone();
        self.response_time_secs = candidate.response_time_secs;
        self.last_checked_at = candidate.last_checked_at;
        self.status = LinkStatus::Fixed;
        true
    }
}

/// A scannable origin of channel entries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistSource {
    pub name: String,
    /// `http(s)` URL or local file path
    pub location: String,
}

impl PlaylistSource {
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
        }
    }

    pub fn is_remote(&self) -> bool {
        let lower = self.location.to_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }
}

/// Result of scanning one source
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub source: String,
    pub indexed: usize,
    pub skipped: usize,
    pub tagged: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScanReport {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Aggregate of a multi-source scan
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub reports: Vec<ScanReport>,
    pub total_indexed: usize,
    pub total_skipped: usize,
    pub failed_sources: usize,
}

impl ScanSummary {
    pub fn push(&mut self, report: ScanReport) {
        self.total_indexed += report.indexed;
        self.total_skipped += report.skipped;
        if report.failed() {
            self.failed_sources += 1;
        }
        self.reports.push(report);
    }
}

/// Outcome of resolving one channel of a target playlist
#[derive(Debug, Clone)]
pub struct ResolveOutcome {
    /// Position of the channel in the target playlist
    pub index: usize,
    pub name: String,
    pub replacement: Option<Arc<ChannelEntry>>,
    pub score: Option<i32>,
    pub via_identity: bool,
}
