use url::Url;

use crate::models::LinkQuality;

/// Tunnels and throwaway hosts: links die with the tunnel
const TEMPORARY_HOSTS: &[&str] = &[
    "ngrok.io",
    "ngrok-free.app",
    "ngrok.app",
    "trycloudflare.com",
    "loca.lt",
    "localtunnel.me",
    "serveo.net",
    "pastebin.com",
    "duckdns.org",
    "no-ip.org",
    "ddns.net",
    "herokuapp.com",
    "glitch.me",
    "repl.co",
];

const LINK_SHORTENERS: &[&str] = &[
    "bit.ly",
    "tinyurl.com",
    "goo.gl",
    "t.co",
    "is.gd",
    "ow.ly",
    "cutt.ly",
    "shorturl.at",
    "rebrand.ly",
    "tiny.cc",
];

const STABLE_HOSTS: &[&str] = &[
    "cloudfront.net",
    "akamaized.net",
    "akamaihd.net",
    "akamai.net",
    "fastly.net",
    "fastly.com",
    "cloudflare.com",
    "edgecastcdn.net",
    "llnwd.net",
    "azureedge.net",
    "cdn77.org",
    "b-cdn.net",
    "bunnycdn.com",
    "googlevideo.com",
];

const MAX_REASONABLE_LENGTH: usize = 500;

/// Score at or above which a link counts as stable
pub const STABLE_THRESHOLD: i32 = 70;
/// Score at or above which a link counts as safe
pub const SAFE_THRESHOLD: i32 = 50;

fn host_matches(host: &str, domains: &'static [&'static str]) -> Option<&'static str> {
    domains
        .iter()
        .copied()
        .find(|d| host == *d || host.ends_with(&format!(".{}", d)))
}

/// Static, no-I/O scoring of a URL's structural trustworthiness
pub struct LinkQualityAnalyzer;

impl LinkQualityAnalyzer {
    pub fn analyze(url: &str) -> LinkQuality {
        let mut score: i32 = 100;
        let mut issues = Vec::new();
        let mut positives = Vec::new();

        let trimmed = url.trim();
        let lower = trimmed.to_lowercase();
        let domain = Url::parse(trimmed)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_lowercase()))
            .unwrap_or_default();

        if domain.is_empty() {
            issues.push("no recognizable host".to_string());
        } else {
            if let Some(d) = host_matches(&domain, TEMPORARY_HOSTS) {
                score -= 40;
                issues.push(format!("temporary host ({})", d));
            }
            if let Some(d) = host_matches(&domain, LINK_SHORTENERS) {
                score -= 35;
                issues.push(format!("link shortener ({})", d));
            }
            if let Some(d) = host_matches(&domain, STABLE_HOSTS) {
                score += 20;
                positives.push(format!("CDN host ({})", d));
            }
        }

        let is_https = lower.starts_with("https://");
        if is_https {
            score += 15;
            positives.push("https".to_string());
        } else if lower.starts_with("http://") {
            score -= 10;
            issues.push("plain http".to_string());
        }

        if trimmed.len() > MAX_REASONABLE_LENGTH {
            score -= 20;
            issues.push(format!("very long URL ({} chars)", trimmed.len()));
        }

        if trimmed
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '"' | '\'' | '<' | '>' | '`'))
        {
            score -= 25;
            issues.push("whitespace, quotes or control characters".to_string());
        }

        let score = score.clamp(0, 100);

        LinkQuality {
            score: score as u8,
            is_https,
            is_stable: score >= STABLE_THRESHOLD,
            is_safe: score >= SAFE_THRESHOLD,
            domain,
            issues,
            positives,
        }
    }
}
