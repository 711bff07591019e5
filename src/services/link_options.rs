use crate::models::LinkOptions;

/// Reserved comment prefix carrying one `key=value` playback option
pub const OPTION_PREFIX: &str = "#EXTVLCOPT:";

/// Parses and re-emits VLC-style per-link options
pub struct LinkOptionExtractor;

impl LinkOptionExtractor {
    pub fn is_option_line(line: &str) -> bool {
        line.trim_start().starts_with(OPTION_PREFIX)
    }

    /// Parse the payload of a single option line
    pub fn parse_line(line: &str) -> Option<(String, String)> {
        let payload = line.trim().strip_prefix(OPTION_PREFIX)?;
        let (key, value) = payload.split_once('=')?;
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        Some((key.to_string(), value.trim().to_string()))
    }

    /// Collect the option block directly above `url_line_index`.
    ///
    /// Scans backward from `url_line_index - 1` and stops at the first line that
    /// is not an option. Keys keep their first physical position; on duplicates
    /// the line closest to the URL wins.
    pub fn extract<S: AsRef<str>>(lines: &[S], url_line_index: usize) -> LinkOptions {
        let end = url_line_index.min(lines.len());
        let start = Self::block_start(lines, end);

        lines[start..end]
            .iter()
            .filter_map(|line| Self::parse_line(line.as_ref()))
            .collect()
    }

    /// Index of the first line of the option block ending right before `end`
    pub fn block_start<S: AsRef<str>>(lines: &[S], end: usize) -> usize {
        let mut start = end.min(lines.len());
        while start > 0 && Self::is_option_line(lines[start - 1].as_ref()) {
            start -= 1;
        }
        start
    }

    /// Serialize options, one line per key, in insertion order
    pub fn format(options: &LinkOptions) -> Vec<String> {
        options
            .iter()
            .map(|(key, value)| format!("{}{}={}", OPTION_PREFIX, key, value))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_block_above_url() {
        let lines = vec![
            "#EXTINF:-1,Channel",
            "#EXTVLCOPT:http-user-agent=Mozilla/5.0",
            "#EXTVLCOPT:http-referrer=https://example.com/",
            "http://stream.example.com/live.m3u8",
        ];
        let options = LinkOptionExtractor::extract(&lines, 3);
        assert_eq!(options.len(), 2);
        assert_eq!(options.get("http-user-agent"), Some("Mozilla/5.0"));
        assert_eq!(options.get("http-referrer"), Some("https://example.com/"));
    }

    #[test]
    fn test_extract_stops_at_non_option_line() {
        let lines = vec![
            "#EXTVLCOPT:http-origin=https://far.example",
            "#EXTGRP:News",
            "#EXTVLCOPT:http-user-agent=UA",
            "http://x/1",
        ];
        let options = LinkOptionExtractor::extract(&lines, 3);
        assert_eq!(options.len(), 1);
        assert!(options.get("http-origin").is_none());
    }

    #[test]
    fn test_duplicate_key_closest_to_url_wins() {
        let lines = vec![
            "#EXTVLCOPT:http-user-agent=first",
            "#EXTVLCOPT:http-referrer=r",
            "#EXTVLCOPT:http-user-agent=second",
            "http://x/1",
        ];
        let options = LinkOptionExtractor::extract(&lines, 3);
        let pairs: Vec<_> = options.iter().collect();
        assert_eq!(pairs, vec![("http-user-agent", "second"), ("http-referrer", "r")]);
    }

    #[test]
    fn test_format_inverts_extract() {
        let lines = vec![
            "#EXTVLCOPT:http-user-agent=VLC/3.0",
            "#EXTVLCOPT:network-caching=1000",
            "udp://239.0.0.1:1234",
        ];
        let options = LinkOptionExtractor::extract(&lines, 2);
        assert_eq!(LinkOptionExtractor::format(&options), &lines[..2]);
    }

    #[test]
    fn test_value_may_contain_equals() {
        let parsed = LinkOptionExtractor::parse_line("#EXTVLCOPT:http-cookie=a=b; c=d");
        assert_eq!(parsed, Some(("http-cookie".to_string(), "a=b; c=d".to_string())));
        assert_eq!(LinkOptionExtractor::parse_line("#EXTVLCOPT:novalue"), None);
    }
}
