use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

lazy_static! {
    /// Anything that is not a letter, digit or whitespace
    static ref NON_WORD: Regex = Regex::new(r"[^\p{L}\p{M}\p{N}\s]+").unwrap();
    static ref MULTI_SPACE: Regex = Regex::new(r"\s+").unwrap();

    /// Quality and markup tokens that do not identify a channel
    static ref GENERAL_STOP_WORDS: HashSet<&'static str> = [
        "hd", "fhd", "4k", "uhd", "live", "stream", "tv", "channel",
    ]
    .into_iter()
    .collect();

    /// General list plus country codes and brand filler seen in guide display names
    static ref GUIDE_STOP_WORDS: HashSet<&'static str> = GENERAL_STOP_WORDS
        .iter()
        .copied()
        .chain([
            "sd", "hq", "hevc", "h265", "1080p", "720p", "576p", "480p", "50fps",
            "uk", "us", "usa", "ca", "au", "de", "fr", "es", "it", "nl", "pl", "pt", "br",
            "ru", "ua", "tr", "in", "ar", "int", "intl", "international",
            "network", "official",
        ])
        .collect();
}

/// Stop-word profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Channel index keys
    General,
    /// Program-guide lookups (richer stop-word list)
    Guide,
}

/// Canonicalizes free-text channel names for comparison
pub struct NameNormalizer;

impl NameNormalizer {
    /// Normalize with the general profile (channel index keys)
    pub fn normalize(name: &str) -> String {
        Self::normalize_with(name, Profile::General)
    }

    /// Normalize with the program-guide profile
    pub fn normalize_guide(name: &str) -> String {
        Self::normalize_with(name, Profile::Guide)
    }

    /// Lower-case, replace punctuation with spaces, collapse whitespace and drop
    /// stop words. When every token is a stop word the collapsed text is kept,
    /// so "HD TV" does not collapse to an empty key.
    pub fn normalize_with(name: &str, profile: Profile) -> String {
        let lower = name.to_lowercase();
        let cleaned = NON_WORD.replace_all(&lower, " ");
        let collapsed = MULTI_SPACE.replace_all(cleaned.trim(), " ");

        let stop_words: &HashSet<&'static str> = match profile {
            Profile::General => &*GENERAL_STOP_WORDS,
            Profile::Guide => &*GUIDE_STOP_WORDS,
        };

        let kept: Vec<&str> = collapsed
            .split(' ')
            .filter(|w| !w.is_empty() && !stop_words.contains(w))
            .collect();

        if kept.is_empty() {
            collapsed.to_string()
        } else {
            kept.join(" ")
        }
    }

    /// Words of an already normalized name
    pub fn words(normalized: &str) -> HashSet<&str> {
        normalized.split(' ').filter(|w| !w.is_empty()).collect()
    }
}

/// Edit similarity in [0, 1]
pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}
