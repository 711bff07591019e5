use anyhow::{anyhow, bail, Context, Result};
use futures::StreamExt;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::{Client, Response};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;

use crate::models::{ChannelEntry, CheckOutcome, LinkStatus, DEFAULT_GROUP};
use crate::services::link_options::LinkOptionExtractor;

// Defensive limit: overlong lines are skipped, not fatal
const MAX_LINE_BYTES: usize = 32 * 1024;

const EXTINF_PREFIX: &str = "#EXTINF:";
const EXTGRP_PREFIX: &str = "#EXTGRP:";
const HEADER_MARKER: &str = "#EXTM3U";

lazy_static! {
    /// Regex to normalize multiple whitespaces into single space
    static ref MULTI_SPACE_REGEX: Regex = Regex::new(r"\s{2,}").unwrap();
    /// Regex to parse EXTINF attributes (tvg-id="...", group-title="...", etc)
    static ref ATTR_REGEX: Regex = Regex::new(r#"(\w+(?:-\w+)*)="([^"]*)""#).unwrap();
    /// Duration token right after `#EXTINF:`
    static ref DURATION_REGEX: Regex = Regex::new(r"^-?\d+(?:\.\d+)?").unwrap();
}

/// Parsed EXTINF line data
#[derive(Debug, Default)]
struct ExtinfData {
    _duration: f64,
    attributes: HashMap<String, String>,
    title: String,
}

/// Parse an EXTINF line
/// Format: #EXTINF:duration tvg-id="..." tvg-name="..." tvg-logo="..." group-title="...",Title
fn parse_extinf(line: &str) -> Option<ExtinfData> {
    let content = line.strip_prefix(EXTINF_PREFIX)?;

    // The display name follows the first comma outside a quoted attribute value
    let comma = find_title_comma(content)?;

    let header = &content[..comma];
    let title = content[comma + 1..].trim().to_string();

    let duration = DURATION_REGEX
        .find(header.trim_start())
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(-1.0);

    let attributes = parse_attributes(header);

    Some(ExtinfData {
        _duration: duration,
        attributes,
        title,
    })
}

fn find_title_comma(content: &str) -> Option<usize> {
    let mut in_quotes = false;
    for (i, c) in content.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => return Some(i),
            _ => {}
        }
    }
    None
}

fn parse_attributes(text: &str) -> HashMap<String, String> {
    let mut attributes = HashMap::new();
    for caps in ATTR_REGEX.captures_iter(text) {
        let key = caps.get(1).map(|m| m.as_str().to_lowercase()).unwrap_or_default();
        let value = caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();
        attributes.entry(key).or_insert(value);
    }
    attributes
}

/// True if the descriptor already declares a `tvg-id` attribute (empty or not)
fn has_identity_attribute(descriptor: &str) -> bool {
    let header = descriptor
        .strip_prefix(EXTINF_PREFIX)
        .and_then(|content| find_title_comma(content).map(|c| &content[..c]))
        .unwrap_or(descriptor);
    parse_attributes(header).contains_key("tvg-id")
}

/// Insert `tvg-id="…"` after the duration token, once, only if absent.
/// Everything else in the descriptor is kept byte-for-byte.
pub fn inject_identity(descriptor: &str, identity_id: &str) -> String {
    let body = descriptor.trim_start();
    let indent = &descriptor[..descriptor.len() - body.len()];
    let Some(content) = body.strip_prefix(EXTINF_PREFIX) else {
        return descriptor.to_string();
    };
    if has_identity_attribute(body) {
        return descriptor.to_string();
    }

    let duration_len = DURATION_REGEX.find(content).map(|m| m.end()).unwrap_or(0);
    let (duration, rest) = content.split_at(duration_len);
    let separator = if rest.starts_with(' ') || rest.starts_with(',') { "" } else { " " };
    format!(
        "{}{}{} tvg-id=\"{}\"{}{}",
        indent, EXTINF_PREFIX, duration, identity_id, separator, rest
    )
}

/// Generate SHA1 hash of URL for cache key
pub fn hash_url(url: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(url.as_bytes());
    let result = hasher.finalize();
    format!("{:x}", result)
}

/// Delay before retry number `attempt + 1`: 500ms doubling, capped at 10s
fn backoff_ms(attempt: u32) -> u64 {
    1u64.checked_shl(attempt)
        .unwrap_or(u64::MAX)
        .saturating_mul(500)
        .min(10_000)
}

/// Normalize text: trim and collapse multiple spaces into single space
fn normalize_text(text: &str) -> String {
    let trimmed = text.trim();
    MULTI_SPACE_REGEX.replace_all(trimmed, " ").to_string()
}

/// Link schemes accepted on a URL line
pub fn is_link_line(line: &str) -> bool {
    let lower = line.trim_start().to_lowercase();
    ["http://", "https://", "rtp://", "udp://"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}

/// An EXTM3U playlist with entries in file order
#[derive(Debug, Clone, Default)]
pub struct Playlist {
    /// Original `#EXTM3U` line (with attributes) if the file had one, verbatim
    pub header: Option<String>,
    pub entries: Vec<ChannelEntry>,
    /// Malformed descriptors and overlong lines
    pub skipped: usize,
}

impl Playlist {
    /// Parse playlist text. Never fails: malformed pieces are counted in `skipped`.
    pub fn parse(text: &str) -> Self {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let lines: Vec<&str> = text.lines().collect();
        let mut playlist = Playlist::default();
        let mut i = 0usize;

        while i < lines.len() {
            let line = lines[i].strip_suffix('\r').unwrap_or(lines[i]);
            let trimmed = line.trim();

            if line.len() > MAX_LINE_BYTES {
                playlist.skipped += 1;
                i += 1;
                continue;
            }

            if trimmed.starts_with(HEADER_MARKER) && playlist.header.is_none() && playlist.entries.is_empty() {
                playlist.header = Some(line.to_string());
                i += 1;
                continue;
            }

            if !trimmed.starts_with(EXTINF_PREFIX) {
                // Stray URL or comment outside of any entry
                i += 1;
                continue;
            }

            // Body runs until a link line, the next descriptor or EOF
            let mut end = i + 1;
            while end < lines.len() {
                let candidate = lines[end].trim();
                if candidate.starts_with(EXTINF_PREFIX) || is_link_line(candidate) {
                    break;
                }
                end += 1;
            }
            let url = lines
                .get(end)
                .map(|l| l.trim())
                .filter(|l| is_link_line(l))
                .map(str::to_string);

            let option_start = LinkOptionExtractor::block_start(&lines[..end], end).max(i + 1);
            let link_options = LinkOptionExtractor::extract(&lines[..end], end);
            let mut extra_lines = Vec::new();
            for body_line in &lines[i + 1..option_start] {
                let body_line = body_line.trim();
                if body_line.len() > MAX_LINE_BYTES {
                    playlist.skipped += 1;
                } else if !body_line.is_empty() {
                    extra_lines.push(body_line.to_string());
                }
            }

            match parse_extinf(trimmed) {
                Some(extinf) => {
                    let mut entry = build_entry(line, extinf, url.clone(), &extra_lines);
                    entry.link_options = link_options;
                    entry.extra_lines = extra_lines;
                    playlist.entries.push(entry);
                }
                None => {
                    tracing::debug!("Skipping malformed descriptor at line {}", i + 1);
                    playlist.skipped += 1;
                }
            }

            i = if url.is_some() { end + 1 } else { end };
        }

        playlist
    }

    /// Guide catalog URL announced by the header (`url-tvg` / `x-tvg-url`)
    pub fn guide_url(&self) -> Option<String> {
        let header = self.header.as_deref()?;
        let attributes = parse_attributes(header);
        attributes
            .get("url-tvg")
            .or_else(|| attributes.get("x-tvg-url"))
            .and_then(|v| v.split(',').map(str::trim).find(|u| !u.is_empty()))
            .map(str::to_string)
    }

    /// Serialize back to EXTM3U text
    pub fn to_m3u(&self) -> String {
        let mut out = String::new();
        out.push_str(self.header.as_deref().unwrap_or(HEADER_MARKER));
        out.push('\n');

        for entry in &self.entries {
            out.push_str(&render_descriptor(entry));
            out.push('\n');
            for line in &entry.extra_lines {
                out.push_str(line);
                out.push('\n');
            }
            for line in LinkOptionExtractor::format(&entry.link_options) {
                out.push_str(&line);
                out.push('\n');
            }
            if let Some(url) = &entry.url {
                out.push_str(url);
                out.push('\n');
            }
        }

        out
    }

    /// Indexes of channels lacking a healthy link
    pub fn needs_resolution(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.needs_resolution())
            .map(|(i, _)| i)
            .collect()
    }

    /// Apply a verifier result to one entry (single writer: the playlist owner)
    pub fn apply_check(&mut self, index: usize, outcome: &CheckOutcome) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.apply_check(outcome);
        }
    }

    /// Mark every linked entry `Checking`; returns the statuses held before
    pub fn begin_check(&mut self) -> Vec<LinkStatus> {
        self.entries
            .iter_mut()
            .map(|entry| {
                let previous = entry.status;
                if entry.has_link() {
                    entry.status = LinkStatus::Checking;
                }
                previous
            })
            .collect()
    }

    /// Record batch results by position. Entries without a result (cancelled
    /// before they were checked) get their previous status back.
    pub fn finish_check(&mut self, results: Vec<Option<CheckOutcome>>, previous: &[LinkStatus]) -> usize {
        let mut checked = 0;
        for (entry, (result, previous)) in self.entries.iter_mut().zip(results.into_iter().zip(previous)) {
            match result {
                Some(outcome) => {
                    entry.apply_check(&outcome);
                    checked += 1;
                }
                None => entry.status = *previous,
            }
        }
        checked
    }

    /// Replace the link of one entry with a resolved candidate
    pub fn apply_fix(&mut self, index: usize, candidate: &ChannelEntry) -> bool {
        self.entries
            .get_mut(index)
            .map(|entry| entry.apply_fix(candidate))
            .unwrap_or(false)
    }
}

fn build_entry(
    descriptor: &str,
    extinf: ExtinfData,
    url: Option<String>,
    extra_lines: &[String],
) -> ChannelEntry {
    let attr = |key: &str| {
        extinf
            .attributes
            .get(key)
            .map(|v| normalize_text(v))
            .filter(|v| !v.is_empty())
    };

    let mut name = normalize_text(&extinf.title);
    if name.is_empty() {
        name = attr("tvg-name").unwrap_or_default();
    }

    let group = attr("group-title")
        .or_else(|| {
            extra_lines
                .iter()
                .find_map(|l| l.strip_prefix(EXTGRP_PREFIX))
                .map(normalize_text)
                .filter(|g| !g.is_empty())
        })
        .unwrap_or_else(|| DEFAULT_GROUP.to_string());

    let mut entry = ChannelEntry::new(name, url);
    entry.raw_header = descriptor.to_string();
    entry.group = group;
    entry.identity_id = attr("tvg-id");
    entry.logo = attr("tvg-logo");
    entry
}

fn render_descriptor(entry: &ChannelEntry) -> String {
    if entry.raw_header.is_empty() {
        let mut descriptor = String::from("#EXTINF:-1");
        if let Some(id) = &entry.identity_id {
            descriptor.push_str(&format!(" tvg-id=\"{}\"", id));
        }
        if let Some(logo) = &entry.logo {
            descriptor.push_str(&format!(" tvg-logo=\"{}\"", logo));
        }
        descriptor.push_str(&format!(" group-title=\"{}\",{}", entry.group, entry.name));
        return descriptor;
    }

    match &entry.identity_id {
        Some(id) => inject_identity(&entry.raw_header, id),
        None => entry.raw_header.clone(),
    }
}

/// Loads playlist text from URLs (with retry) or local files
pub struct M3UParser {
    client: Client,
    max_retries: u32,
    max_size_mb: usize,
}

impl M3UParser {
    /// Create a new M3U loader
    pub fn new(
        user_agent: &str,
        timeout: Duration,
        max_retries: u32,
        max_size_mb: usize,
    ) -> std::result::Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            max_retries,
            max_size_mb,
        })
    }

    fn max_bytes(&self) -> u64 {
        (self.max_size_mb as u64) * 1024 * 1024
    }

    async fn fetch_with_retry(&self, url: &str) -> Result<Response> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            match self.client.get(url).send().await {
                Ok(resp) => {
                    if resp.status().is_success() {
                        if let Some(len) = resp.content_length() {
                            if len > self.max_bytes() {
                                bail!(
                                    "Playlist too large: {:.1}MB (limit {}MB)",
                                    len as f64 / 1024f64 / 1024f64,
                                    self.max_size_mb
                                );
                            }
                        }

                        return Ok(resp);
                    }

                    let status = resp.status();
                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS && attempt < self.max_retries {
                        let delay_ms = backoff_ms(attempt);
                        tracing::warn!("fetch_retry" = attempt + 1, "reason" = "429", "backoff_ms" = delay_ms);
                        sleep(Duration::from_millis(delay_ms)).await;
                        continue;
                    }

                    let reason = status
                        .canonical_reason()
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "Error".to_string());
                    bail!("HTTP {}: {}", status.as_u16(), reason);
                }
                Err(err) => {
                    if attempt < self.max_retries {
                        let delay_ms = backoff_ms(attempt);
                        tracing::warn!("fetch_retry" = attempt + 1, "reason" = "network", "backoff_ms" = delay_ms);
                        last_err = Some(err);
                        sleep(Duration::from_millis(delay_ms)).await;
                        continue;
                    }
                    return Err(err.into());
                }
            }
        }

        match last_err {
            Some(e) => Err(e.into()),
            None => Err(anyhow!("Unknown fetch error")),
        }
    }

    /// Download a remote text document, enforcing the size cap while streaming
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self
            .fetch_with_retry(url)
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;

        if let Some(len) = response.content_length() {
            tracing::info!("Fetching {} ({:.2} MB)", url, len as f64 / 1024.0 / 1024.0);
        }

        let body = self.read_capped(response).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Download raw bytes (guide catalogs may be gzip files)
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .fetch_with_retry(url)
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;
        self.read_capped(response).await
    }

    async fn read_capped(&self, response: Response) -> Result<Vec<u8>> {
        let max_bytes = self.max_bytes();
        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Failed while reading response body")?;
            body.extend_from_slice(&chunk);
            if body.len() as u64 > max_bytes {
                bail!("Response exceeds {}MB limit", self.max_size_mb);
            }
        }
        Ok(body)
    }

    /// Read a local playlist file
    pub async fn read_file(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
